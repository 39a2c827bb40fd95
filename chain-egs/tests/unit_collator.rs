//! Unit tests for batch collation
//!
//! Tests shapes, frame-shift jitter bounds, i-vector broadcast, and the
//! schema and shape checks.

mod common;

use std::fs;
use std::sync::Arc;

use chain_egs::kaldi::{ChainOutput, NnetIo};
use chain_egs::metrics::LoaderMetrics;
use chain_egs::{
    ChainCollator, EgsError, ExampleIndex, ExampleRef, KaldiExampleStore, MemoryExampleStore,
};
use common::{example, numbered_features, supervision, temp_dir, write_example, write_manifest};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn store_with(location: &str, eg: &chain_egs::ChainExample) -> MemoryExampleStore {
    let store = MemoryExampleStore::new();
    store.insert_example(location, eg).unwrap();
    store
}

#[test]
fn test_end_to_end_from_manifest() {
    let dir = temp_dir("collate-e2e");
    let collator = ChainCollator::new(29, 29, 3).unwrap();
    let store = KaldiExampleStore::new();

    // 100 * 3 + 29 + 29 = 358 rows are required
    let short = write_example(&dir, "short.bin", &example(300, 125, supervision(1, 100)));
    let manifest = dir.join("short.scp");
    write_manifest(&manifest, &[("utt1", short.to_str().unwrap())]);
    let index = ExampleIndex::open(&manifest).unwrap();
    let refs: Vec<ExampleRef> = index.iter().cloned().collect();
    assert!(matches!(
        collator.collate(&store, &refs),
        Err(EgsError::ShapeMismatch { .. })
    ));

    let exact = write_example(&dir, "example.bin", &example(358, 125, supervision(1, 100)));
    let manifest = dir.join("cegs.1.scp");
    write_manifest(&manifest, &[("utt1", exact.to_str().unwrap())]);
    let index = ExampleIndex::open(&dir).unwrap();
    let refs: Vec<ExampleRef> = index.iter().cloned().collect();
    let batch = collator.collate(&store, &refs).unwrap();

    assert_eq!(batch.keys, vec!["utt1".to_string()]);
    assert_eq!(batch.features[0].dim(), (1, 354, 125));
    assert_eq!(batch.supervisions[0].frames_per_sequence, 100);
    assert_eq!(batch.supervisions[0].weight, 1.0);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_shape_formula_for_several_sequences() {
    let (n, f, l, r) = (4, 7, 5, 3);
    let fps = 3 * f + l + r;
    let eg = example(n * fps, 13, supervision(n, f));
    let collator = ChainCollator::new(l, r, 3).unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let (tensor, sup) = collator.collate_example(eg, &mut rng).unwrap();
    assert_eq!(tensor.dim(), (n, fps - 4, 13));
    assert_eq!(sup.num_sequences, n);
}

#[test]
fn test_no_jitter_is_idempotent() {
    let eg = example(3 * 30, 6, supervision(3, 20));
    let store = store_with("eg", &eg);
    let collator = ChainCollator::new(5, 5, 1).unwrap();
    let refs = vec![ExampleRef::new("utt", "eg")];

    let first = collator.collate(&store, &refs).unwrap();
    let second = collator.collate(&store, &refs).unwrap();
    assert_eq!(first.features, second.features);
    // window starts right after the two trimmed frames
    assert_eq!(first.features[0][[1, 0, 0]], (30 + 2) as f32 * 1000.0);
}

#[test]
fn test_jitter_stays_inside_padded_range() {
    let (n, f, l, r) = (3, 4, 2, 2);
    let fps = 3 * f + l + r;
    let eg = example(n * fps, 2, supervision(n, f));
    let collator = ChainCollator::new(l, r, 3).unwrap();
    let mut shifts_seen = std::collections::HashSet::new();

    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (tensor, _) = collator.collate_example(eg.clone(), &mut rng).unwrap();
        for i in 0..n {
            let first_row = tensor[[i, 0, 0]] as usize / 1000;
            let shift = first_row as isize - (i * fps + 2) as isize;
            assert!((-1..=1).contains(&shift), "shift {} out of range", shift);
            shifts_seen.insert(shift);
            // rows are contiguous
            for k in 0..fps - 4 {
                assert_eq!(tensor[[i, k, 0]] as usize / 1000, first_row + k);
            }
        }
    }
    assert_eq!(shifts_seen.len(), 3);
}

#[test]
fn test_ivector_broadcast() {
    let n = 2;
    let fps = 3 * 5 + 4 + 4;
    let mut eg = example(n * fps, 10, supervision(n, 5));
    let ivectors = Array2::from_shape_fn((n, 3), |(r, c)| -((r * 10 + c) as f32));
    eg.inputs.push(NnetIo::new("ivector", ivectors.clone()));

    let collator = ChainCollator::new(4, 4, 3).unwrap();
    let (tensor, _) = collator
        .collate_example(eg, &mut StdRng::seed_from_u64(3))
        .unwrap();
    assert_eq!(tensor.dim(), (n, fps - 4, 13));
    for i in 0..n {
        for k in 0..fps - 4 {
            for c in 0..3 {
                assert_eq!(tensor[[i, k, 10 + c]], ivectors[[i, c]]);
            }
        }
    }
}

#[test]
fn test_compressed_and_full_features_agree() {
    let sup = supervision(1, 2);
    let fps = 2 + 2 + 2;
    let bytes: Vec<u8> = (0..fps * 4).map(|b| (b * 7 % 256) as u8).collect();
    let compressed =
        chain_egs::kaldi::CompressedMatrix::one_byte(-1.0, 2.0, fps, 4, bytes).unwrap();
    let dense = compressed.to_dense();

    let mut eg = example(fps, 4, sup.clone());
    eg.inputs[0].features = chain_egs::kaldi::GeneralMatrix::Compressed(compressed);
    let collator = ChainCollator::new(2, 2, 1).unwrap();
    let (from_compressed, _) = collator
        .collate_example(eg, &mut StdRng::seed_from_u64(0))
        .unwrap();

    let mut full = example(fps, 4, sup);
    full.inputs[0].features = chain_egs::kaldi::GeneralMatrix::Full(dense);
    let (from_full, _) = collator
        .collate_example(full, &mut StdRng::seed_from_u64(0))
        .unwrap();
    assert_eq!(from_compressed, from_full);
}

#[test]
fn test_missing_or_extra_outputs_are_schema_errors() {
    let collator = ChainCollator::new(2, 2, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let mut renamed = example(8, 2, supervision(1, 4));
    renamed.outputs[0].name = "output-xent".into();
    assert!(matches!(
        collator.collate_example(renamed, &mut rng),
        Err(EgsError::Schema { .. })
    ));

    let mut doubled = example(8, 2, supervision(1, 4));
    doubled
        .outputs
        .push(ChainOutput::new("output", supervision(1, 4)));
    assert!(matches!(
        collator.collate_example(doubled, &mut rng),
        Err(EgsError::Schema { .. })
    ));

    let mut none = example(8, 2, supervision(1, 4));
    none.outputs.clear();
    assert!(matches!(
        collator.collate_example(none, &mut rng),
        Err(EgsError::Schema { .. })
    ));

    let mut crowded = example(8, 2, supervision(1, 4));
    crowded.inputs.push(NnetIo::new("ivector", numbered_features(1, 2)));
    crowded.inputs.push(NnetIo::new("extra", numbered_features(1, 2)));
    assert!(matches!(
        collator.collate_example(crowded, &mut rng),
        Err(EgsError::Schema { .. })
    ));
}

#[test]
fn test_row_count_mismatch_is_shape_error() {
    let collator = ChainCollator::new(2, 2, 1).unwrap();
    let eg = example(9, 2, supervision(1, 4));
    assert!(matches!(
        collator.collate_example(eg, &mut StdRng::seed_from_u64(0)),
        Err(EgsError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_failed_member_aborts_group_and_counts() {
    let metrics = Arc::new(LoaderMetrics::new());
    let collator = ChainCollator::new(2, 2, 1)
        .unwrap()
        .with_metrics(Arc::clone(&metrics));
    let store = store_with("good", &example(8, 2, supervision(1, 4)));
    store.insert_example("bad", &example(7, 2, supervision(1, 4))).unwrap();

    let ok = collator
        .collate(&store, &[ExampleRef::new("a", "good")])
        .unwrap();
    assert_eq!(ok.len(), 1);

    let refs = vec![ExampleRef::new("a", "good"), ExampleRef::new("b", "bad")];
    assert!(collator.collate(&store, &refs).is_err());

    assert_eq!(metrics.batches_collated.get(), 1);
    assert_eq!(metrics.fetch_errors.get(), 1);
    assert_eq!(metrics.examples_read.get(), 3);
    assert_eq!(metrics.frames_emitted.get(), 8);
}
