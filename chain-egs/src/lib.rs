//! chain-egs - Kaldi nnet3 chain example loading
//!
//! This crate turns chain training examples into training batches:
//! - Manifest (scp) indexing
//! - Kaldi binary/text example decoding
//! - Context trimming, frame-shift jitter and i-vector broadcast
//! - Random and distributed sampling, with optional prefetch

pub mod config;
pub mod data;
pub mod error;
pub mod kaldi;
pub mod metrics;
pub mod storage;

pub use config::LoaderConfig;
pub use data::{
    get_egs_dataloader, ChainBatch, ChainCollator, EgsDataLoader, ExampleIndex, ExampleRef,
};
pub use error::{EgsError, Result};
pub use kaldi::{ChainExample, Supervision};
pub use storage::{ExampleStore, KaldiExampleStore, MemoryExampleStore};

/// Subsampling factor used by the standard chain loader
pub const DEFAULT_SUBSAMPLING_FACTOR: usize = 3;

/// Frames trimmed from each end of a sub-sequence window
pub const FRAME_SHIFT_PADDING: usize = 2;

/// Manifest files picked up when the source is a directory
pub const MANIFEST_PATTERN: &str = "cegs.*.scp";

/// Default number of batches prefetched ahead of the consumer
pub const DEFAULT_PREFETCH_CAPACITY: usize = 4;
