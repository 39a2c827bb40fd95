//! Data loading pipeline
//!
//! Manifests in, collated chain batches out.

pub mod collate;
pub mod index;
pub mod loader;
pub mod prefetcher;
pub mod sampler;

pub use collate::{ChainBatch, ChainCollator};
pub use index::{ExampleIndex, ExampleRef};
pub use loader::{get_egs_dataloader, EgsDataLoader, EpochIter};
pub use prefetcher::PrefetchingLoader;
pub use sampler::{DistributedSampler, RandomBatchSampler, Sampling};
