//! Batch collation
//!
//! Turns a group of example references into padded-and-trimmed feature
//! tensors plus their supervisions.

use std::sync::Arc;

use ndarray::{s, Array2, Array3};
use rand::Rng;
use tracing::debug;

use super::index::ExampleRef;
use crate::error::{EgsError, Result};
use crate::kaldi::{ChainExample, Supervision};
use crate::metrics::{LoaderMetrics, LOADER_METRICS};
use crate::storage::ExampleStore;
use crate::FRAME_SHIFT_PADDING;

const PRIMARY_INPUT: &str = "input";
const CHAIN_OUTPUT: &str = "output";

/// One collated batch group. All three vectors have the same length.
#[derive(Debug, Clone)]
pub struct ChainBatch {
    /// Utterance keys, in sampling order
    pub keys: Vec<String>,
    /// `[num_sequences, frames_per_sequence - 4, feat_dim (+ aux_dim)]`
    pub features: Vec<Array3<f32>>,
    /// Supervision of each example, unchanged
    pub supervisions: Vec<Supervision>,
}

impl ChainBatch {
    /// Number of examples in the group
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True if the group holds no examples
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Slices chain examples into per-sequence feature windows
#[derive(Clone)]
pub struct ChainCollator {
    left_context: usize,
    right_context: usize,
    subsampling_factor: usize,
    metrics: Arc<LoaderMetrics>,
}

impl std::fmt::Debug for ChainCollator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainCollator")
            .field("left_context", &self.left_context)
            .field("right_context", &self.right_context)
            .field("subsampling_factor", &self.subsampling_factor)
            .finish()
    }
}

impl ChainCollator {
    /// Only subsampling factors 1 and 3 are supported
    pub fn new(left_context: usize, right_context: usize, subsampling_factor: usize) -> Result<Self> {
        if subsampling_factor != 1 && subsampling_factor != 3 {
            return Err(EgsError::configuration(format!(
                "subsampling factor must be 1 or 3, got {}",
                subsampling_factor
            )));
        }
        Ok(Self {
            left_context,
            right_context,
            subsampling_factor,
            metrics: LOADER_METRICS.clone(),
        })
    }

    /// Record into `metrics` instead of the process-wide counters
    pub fn with_metrics(mut self, metrics: Arc<LoaderMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Left context frames added to every sub-sequence
    pub fn left_context(&self) -> usize {
        self.left_context
    }

    /// Right context frames added to every sub-sequence
    pub fn right_context(&self) -> usize {
        self.right_context
    }

    /// Frame subsampling factor of the chain output
    pub fn subsampling_factor(&self) -> usize {
        self.subsampling_factor
    }

    /// Counters this collator records into
    pub fn metrics(&self) -> &Arc<LoaderMetrics> {
        &self.metrics
    }

    /// Input frames per sub-sequence, context included
    pub fn frames_per_sequence(&self, supervision: &Supervision) -> usize {
        supervision.frames_per_sequence * self.subsampling_factor
            + self.left_context
            + self.right_context
    }

    /// Collate with jitter drawn from the thread-local generator
    pub fn collate<S>(&self, store: &S, refs: &[ExampleRef]) -> Result<ChainBatch>
    where
        S: ExampleStore + ?Sized,
    {
        self.collate_with_rng(store, refs, &mut rand::thread_rng())
    }

    /// Fetch and slice every reference. Any failure aborts the whole group.
    pub fn collate_with_rng<S, R>(&self, store: &S, refs: &[ExampleRef], rng: &mut R) -> Result<ChainBatch>
    where
        S: ExampleStore + ?Sized,
        R: Rng + ?Sized,
    {
        let result = self.collate_inner(store, refs, rng);
        match &result {
            Ok(batch) => {
                self.metrics.batches_collated.inc();
                debug!(
                    "Collated batch of {} example(s): {:?}",
                    batch.len(),
                    batch.features.iter().map(|f| f.dim()).collect::<Vec<_>>()
                );
            }
            Err(e) => {
                self.metrics.fetch_errors.inc();
                debug!("Batch group failed: {}", e);
            }
        }
        result
    }

    fn collate_inner<S, R>(&self, store: &S, refs: &[ExampleRef], rng: &mut R) -> Result<ChainBatch>
    where
        S: ExampleStore + ?Sized,
        R: Rng + ?Sized,
    {
        let mut batch = ChainBatch {
            keys: Vec::with_capacity(refs.len()),
            features: Vec::with_capacity(refs.len()),
            supervisions: Vec::with_capacity(refs.len()),
        };

        for example_ref in refs {
            let example = self
                .metrics
                .fetch_duration
                .time(|| store.fetch(&example_ref.location))?;
            self.metrics.examples_read.inc();
            debug!("Read example {} from {}", example_ref.key, example_ref.location);

            let (features, supervision) = self.collate_example(example, rng)?;
            batch.keys.push(example_ref.key.clone());
            batch.features.push(features);
            batch.supervisions.push(supervision);
        }
        Ok(batch)
    }

    /// Slice one example into its `[num_sequences, frames, width]` tensor
    /// and hand back its supervision untouched
    pub fn collate_example<R>(&self, example: ChainExample, rng: &mut R) -> Result<(Array3<f32>, Supervision)>
    where
        R: Rng + ?Sized,
    {
        let ChainExample { inputs, outputs } = example;

        let mut outputs = outputs.into_iter();
        let output = match (outputs.next(), outputs.next()) {
            (Some(output), None) if output.name == CHAIN_OUTPUT => output,
            (Some(output), None) => {
                return Err(EgsError::schema(format!(
                    "expected output named {:?}, found {:?}",
                    CHAIN_OUTPUT, output.name
                )))
            }
            (None, _) => return Err(EgsError::schema("example has no output stream")),
            (Some(_), Some(_)) => {
                return Err(EgsError::schema(format!(
                    "expected exactly 1 output stream, found {}",
                    2 + outputs.count()
                )))
            }
        };

        let (primary, aux) = match inputs.as_slice() {
            [primary] => (primary, None),
            [primary, aux] => (primary, Some(aux)),
            [] => return Err(EgsError::schema("example has no input stream")),
            more => {
                return Err(EgsError::schema(format!(
                    "expected at most 2 input streams, found {}",
                    more.len()
                )))
            }
        };
        if primary.name != PRIMARY_INPUT {
            return Err(EgsError::schema(format!(
                "first input must be named {:?}, found {:?}",
                PRIMARY_INPUT, primary.name
            )));
        }

        let supervision = output.supervision;
        let features = primary.features.to_dense();
        let aux = aux.map(|a| a.features.to_dense());
        let tensor = self.slice_sequences(&supervision, &features, aux.as_ref(), rng)?;
        Ok((tensor, supervision))
    }

    fn slice_sequences<R>(
        &self,
        supervision: &Supervision,
        features: &Array2<f32>,
        aux: Option<&Array2<f32>>,
        rng: &mut R,
    ) -> Result<Array3<f32>>
    where
        R: Rng + ?Sized,
    {
        let num_sequences = supervision.num_sequences;
        let fps = self.frames_per_sequence(supervision);
        let trim = 2 * FRAME_SHIFT_PADDING;

        let expected_rows = num_sequences.checked_mul(fps);
        if expected_rows != Some(features.nrows()) {
            return Err(EgsError::shape(format!(
                "expected {} sequences x {} frames of features, found {} rows",
                num_sequences,
                fps,
                features.nrows()
            )));
        }
        if fps < trim {
            return Err(EgsError::shape(format!(
                "{} frames per sequence cannot be trimmed by {}",
                fps, trim
            )));
        }
        if let Some(aux) = aux {
            if aux.nrows() < num_sequences {
                return Err(EgsError::shape(format!(
                    "auxiliary input has {} rows for {} sequences",
                    aux.nrows(),
                    num_sequences
                )));
            }
        }

        let frames = fps - trim;
        let feat_dim = features.ncols();
        let aux_dim = aux.map_or(0, |a| a.ncols());
        let mut out = Array3::<f32>::zeros((num_sequences, frames, feat_dim + aux_dim));

        for i in 0..num_sequences {
            let shift: isize = if self.subsampling_factor == 3 {
                rng.gen_range(-1..=1)
            } else {
                0
            };
            let start = (i * fps) as isize + shift + FRAME_SHIFT_PADDING as isize;
            let end = start + frames as isize;
            if start < 0 || end > features.nrows() as isize {
                return Err(EgsError::shape(format!(
                    "sequence {} window [{}, {}) outside {} feature rows",
                    i,
                    start,
                    end,
                    features.nrows()
                )));
            }
            let (start, end) = (start as usize, end as usize);

            out.slice_mut(s![i, .., ..feat_dim])
                .assign(&features.slice(s![start..end, ..]));
            if let Some(aux) = aux {
                let row = aux.row(i);
                for mut frame in out.slice_mut(s![i, .., feat_dim..]).rows_mut() {
                    frame.assign(&row);
                }
            }
        }

        self.metrics
            .frames_emitted
            .inc_by((num_sequences * frames) as u64);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kaldi::{ChainOutput, NnetIo};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn supervision(num_sequences: usize, frames_per_sequence: usize) -> Supervision {
        Supervision {
            weight: 1.0,
            num_sequences,
            frames_per_sequence,
            label_dim: 4,
            fst: None,
            e2e_fsts: Vec::new(),
            alignment_pdfs: Vec::new(),
        }
    }

    fn example(rows: usize, cols: usize, sup: Supervision) -> ChainExample {
        let features = Array2::from_shape_fn((rows, cols), |(r, c)| (r * 10 + c) as f32);
        ChainExample {
            inputs: vec![NnetIo::new("input", features)],
            outputs: vec![ChainOutput::new("output", sup)],
        }
    }

    fn metrics() -> Arc<LoaderMetrics> {
        Arc::new(LoaderMetrics::new())
    }

    #[test]
    fn test_rejects_unsupported_subsampling() {
        assert!(ChainCollator::new(0, 0, 2).is_err());
        assert!(ChainCollator::new(0, 0, 1).is_ok());
    }

    #[test]
    fn test_no_jitter_window_is_exact() {
        let collator = ChainCollator::new(2, 2, 1).unwrap().with_metrics(metrics());
        let mut rng = StdRng::seed_from_u64(0);
        // fps = 3 + 2 + 2 = 7, two sequences
        let (out, sup) = collator
            .collate_example(example(14, 2, supervision(2, 3)), &mut rng)
            .unwrap();
        assert_eq!(out.dim(), (2, 3, 2));
        assert_eq!(sup.num_sequences, 2);
        // sequence 1 starts at row 7, trimmed by 2
        assert_eq!(out[[1, 0, 0]], 90.0);
        assert_eq!(out[[1, 2, 1]], 111.0);
        assert_eq!(collator.metrics().frames_emitted.get(), 6);
    }

    #[test]
    fn test_fps_below_trim_is_shape_error() {
        let collator = ChainCollator::new(0, 0, 1).unwrap().with_metrics(metrics());
        let mut rng = StdRng::seed_from_u64(0);
        let err = collator
            .collate_example(example(3, 2, supervision(1, 3)), &mut rng)
            .unwrap_err();
        assert!(matches!(err, EgsError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_short_aux_is_shape_error() {
        let collator = ChainCollator::new(2, 2, 1).unwrap().with_metrics(metrics());
        let mut eg = example(14, 2, supervision(2, 3));
        eg.inputs.push(NnetIo::new("ivector", Array2::zeros((1, 3))));
        let err = collator
            .collate_example(eg, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, EgsError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_misnamed_input_is_schema_error() {
        let collator = ChainCollator::new(2, 2, 1).unwrap().with_metrics(metrics());
        let mut eg = example(14, 2, supervision(2, 3));
        eg.inputs[0].name = "mfcc".into();
        let err = collator
            .collate_example(eg, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, EgsError::Schema { .. }));
    }
}
