//! Unit tests for the loader factory and prefetching
//!
//! Tests epoch iteration, rank sharding, configuration, and the async
//! prefetch path.

mod common;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use chain_egs::data::{RandomBatchSampler, Sampling};
use chain_egs::{
    get_egs_dataloader, ChainCollator, EgsDataLoader, EgsError, ExampleIndex, ExampleRef,
    LoaderConfig, MemoryExampleStore,
};
use common::{example, supervision, temp_dir, write_example, write_manifest};

/// Six single-sequence examples over two manifests. Each needs
/// 3 * 4 + 2 + 2 = 16 rows with context 2/2.
fn example_dir(tag: &str) -> PathBuf {
    let dir = temp_dir(tag);
    let mut entries: Vec<(String, String)> = Vec::new();
    for i in 0..6 {
        let path = write_example(&dir, &format!("eg{}.bin", i), &example(16, 3, supervision(1, 4)));
        entries.push((format!("utt{}", i), path.display().to_string()));
    }
    let lines: Vec<(&str, &str)> = entries.iter().map(|(k, l)| (k.as_str(), l.as_str())).collect();
    write_manifest(&dir.join("cegs.1.scp"), &lines[..4]);
    write_manifest(&dir.join("cegs.2.scp"), &lines[4..]);
    dir
}

fn collect_keys(loader: &EgsDataLoader<chain_egs::KaldiExampleStore>) -> Vec<String> {
    loader
        .iter()
        .map(|batch| {
            let batch = batch.unwrap();
            assert_eq!(batch.len(), 1);
            assert_eq!(batch.features[0].dim(), (1, 12, 3));
            batch.keys[0].clone()
        })
        .collect()
}

#[test]
fn test_single_process_epoch_covers_index() {
    let dir = example_dir("loader-single");
    let loader = get_egs_dataloader(&dir, 2, 2, None, None).unwrap();
    assert_eq!(loader.index().len(), 6);
    assert_eq!(loader.num_batches(), 6);
    assert!(!loader.sampling().is_distributed());

    let keys: HashSet<String> = collect_keys(&loader).into_iter().collect();
    assert_eq!(keys.len(), 6);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_world_size_without_rank_is_not_distributed() {
    let dir = example_dir("loader-world");
    let loader = get_egs_dataloader(&dir, 2, 2, Some(4), None).unwrap();
    assert!(!loader.sampling().is_distributed());
    assert_eq!(loader.num_batches(), 6);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_ranks_get_disjoint_shards() {
    let dir = example_dir("loader-ranks");
    let mut seen = HashSet::new();
    for rank in 0..2 {
        let mut loader = get_egs_dataloader(&dir, 2, 2, Some(2), Some(rank)).unwrap();
        loader.set_epoch(3);
        assert_eq!(loader.num_batches(), 3);
        for key in collect_keys(&loader) {
            assert!(seen.insert(key), "example served to two ranks");
        }
    }
    assert_eq!(seen.len(), 6);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_invalid_rank_configuration() {
    let dir = example_dir("loader-bad-rank");
    for (world, rank) in [(None, Some(0)), (Some(0), Some(0)), (Some(2), Some(2))] {
        assert!(matches!(
            get_egs_dataloader(&dir, 2, 2, world, rank),
            Err(EgsError::Configuration { .. })
        ));
    }

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_from_json_config() {
    let dir = example_dir("loader-json");
    let config_path = dir.join("loader.json");
    let mut config = LoaderConfig::new(&dir, 2, 2);
    config.batch_size = 4;
    config.seed = Some(9);
    fs::write(&config_path, config.to_json().unwrap()).unwrap();

    let loaded = LoaderConfig::from_json_file(&config_path).unwrap();
    assert_eq!(loaded, config);

    let loader = EgsDataLoader::from_config(&loaded).unwrap();
    assert_eq!(loader.num_batches(), 2);
    let sizes: Vec<usize> = loader.iter().map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![4, 2]);

    fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn test_prefetch_delivers_epoch_then_exhausts() {
    let dir = example_dir("loader-prefetch");
    let loader = get_egs_dataloader(&dir, 2, 2, None, None).unwrap();

    let mut prefetch = loader.prefetch(&tokio::runtime::Handle::current(), 2);
    assert_eq!(prefetch.total_batches(), 6);
    let mut keys = HashSet::new();
    loop {
        match prefetch.next_batch().await {
            Ok(batch) => {
                keys.insert(batch.keys[0].clone());
            }
            Err(EgsError::DataExhausted) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(keys.len(), 6);
    assert_eq!(prefetch.batches_delivered(), 6);
    prefetch.shutdown().await;

    fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn test_prefetch_stops_after_failed_group() {
    let store = MemoryExampleStore::new();
    store
        .insert_example("good", &example(16, 3, supervision(1, 4)))
        .unwrap();
    let index = ExampleIndex::from_refs(vec![
        ExampleRef::new("a", "missing"),
        ExampleRef::new("b", "good"),
    ]);
    // unshuffled order so the failing reference comes first
    let sampling = Sampling::Distributed({
        let mut sampler = chain_egs::data::DistributedSampler::new(1, 0);
        sampler.shuffle = false;
        sampler
    });
    let loader = EgsDataLoader::new(index, store, ChainCollator::new(2, 2, 3).unwrap(), sampling);

    let mut prefetch = loader.prefetch(&tokio::runtime::Handle::current(), 1);
    assert!(matches!(prefetch.next_batch().await, Err(EgsError::Io { .. })));
    assert!(matches!(
        prefetch.next_batch().await,
        Err(EgsError::DataExhausted)
    ));
    prefetch.shutdown().await;
}

#[tokio::test]
async fn test_prefetch_shutdown_with_pending_batches() {
    let store = MemoryExampleStore::new();
    let mut refs = Vec::new();
    for i in 0..20 {
        let location = format!("eg{}", i);
        store
            .insert_example(location.as_str(), &example(16, 3, supervision(1, 4)))
            .unwrap();
        refs.push(ExampleRef::new(format!("utt{}", i), location));
    }
    let loader = EgsDataLoader::new(
        ExampleIndex::from_refs(refs),
        store,
        ChainCollator::new(2, 2, 3).unwrap(),
        RandomBatchSampler::new(1),
    );

    let mut prefetch = loader.prefetch(&tokio::runtime::Handle::current(), 1);
    assert!(prefetch.next_batch().await.is_ok());
    // producer is blocked on the full channel and must still exit
    prefetch.shutdown().await;
}
