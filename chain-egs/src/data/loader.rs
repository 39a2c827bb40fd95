//! Epoch-oriented data loader
//!
//! Ties an index, a store, a collator and a sampler together and hands out
//! one [`ChainBatch`] per batch group.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::collate::{ChainBatch, ChainCollator};
use super::index::{ExampleIndex, ExampleRef};
use super::prefetcher::PrefetchingLoader;
use super::sampler::{DistributedSampler, RandomBatchSampler, Sampling};
use crate::config::{validate_rank, LoaderConfig};
use crate::error::Result;
use crate::storage::{ExampleStore, KaldiExampleStore};
use crate::DEFAULT_SUBSAMPLING_FACTOR;

/// Data loader over chain examples
pub struct EgsDataLoader<S> {
    index: Arc<ExampleIndex>,
    store: Arc<S>,
    collator: ChainCollator,
    sampling: Sampling,
    epoch: u64,
}

impl<S: ExampleStore> EgsDataLoader<S> {
    /// Build a loader from its parts
    pub fn new(
        index: ExampleIndex,
        store: S,
        collator: ChainCollator,
        sampling: impl Into<Sampling>,
    ) -> Self {
        Self {
            index: Arc::new(index),
            store: Arc::new(store),
            collator,
            sampling: sampling.into(),
            epoch: 0,
        }
    }

    /// The example index being sampled
    pub fn index(&self) -> &ExampleIndex {
        &self.index
    }

    /// Store examples are fetched from
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Collator applied to each group
    pub fn collator(&self) -> &ChainCollator {
        &self.collator
    }

    /// Sampling strategy
    pub fn sampling(&self) -> &Sampling {
        &self.sampling
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Select the epoch whose shuffle the next `iter` uses
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Batch groups per epoch for this rank
    pub fn num_batches(&self) -> usize {
        self.sampling.num_batches(self.index.len())
    }

    /// Iterate one epoch. Groups are fetched lazily, one per `next`.
    pub fn iter(&self) -> EpochIter<'_, S> {
        let groups = self.sampling.batches(self.epoch, self.index.len());
        debug!("Epoch {}: {} batch group(s)", self.epoch, groups.len());
        EpochIter {
            loader: self,
            groups: groups.into_iter(),
        }
    }

    fn refs_for(index: &ExampleIndex, group: &[usize]) -> Vec<ExampleRef> {
        group
            .iter()
            .filter_map(|&i| index.get(i).cloned())
            .collect()
    }
}

impl<S: ExampleStore + 'static> EgsDataLoader<S> {
    /// Fetch and collate the current epoch on a blocking task, keeping up
    /// to `capacity` batches ready ahead of the consumer
    pub fn prefetch(&self, handle: &tokio::runtime::Handle, capacity: usize) -> PrefetchingLoader {
        let groups = self.sampling.batches(self.epoch, self.index.len());
        let index = Arc::clone(&self.index);
        let store = Arc::clone(&self.store);
        let collator = self.collator.clone();

        PrefetchingLoader::spawn(handle, capacity, groups, move |group: &[usize]| {
            let refs = Self::refs_for(&index, group);
            collator.collate(&*store, &refs)
        })
    }
}

impl<'a, S: ExampleStore> IntoIterator for &'a EgsDataLoader<S> {
    type Item = Result<ChainBatch>;
    type IntoIter = EpochIter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl EgsDataLoader<KaldiExampleStore> {
    /// Build a loader reading Kaldi rxfilenames from `config.source`
    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        config.validate()?;
        let index = ExampleIndex::open(&config.source)?;
        let collator = ChainCollator::new(
            config.left_context,
            config.right_context,
            config.subsampling_factor,
        )?;

        let sampling: Sampling = match (config.world_size, config.local_rank) {
            (Some(world_size), Some(rank)) => DistributedSampler::new(world_size, rank)
                .with_seed(config.seed.unwrap_or(0))
                .with_batch_size(config.batch_size)
                .into(),
            _ => RandomBatchSampler {
                batch_size: config.batch_size,
                drop_last: false,
                seed: config.seed,
            }
            .into(),
        };

        info!(
            "Chain egs loader: {} (context {}+{}, subsampling {}, {})",
            index,
            config.left_context,
            config.right_context,
            config.subsampling_factor,
            match &sampling {
                Sampling::Distributed(s) => format!("rank {} of {}", s.rank, s.num_replicas),
                Sampling::Random(_) => "single process".to_string(),
            }
        );

        Ok(Self::new(index, KaldiExampleStore::new(), collator, sampling))
    }
}

/// Build the standard chain loader: subsampling factor 3, one example per
/// batch, distributed sampling whenever `local_rank` is given
pub fn get_egs_dataloader(
    source: impl AsRef<Path>,
    left_context: usize,
    right_context: usize,
    world_size: Option<usize>,
    local_rank: Option<usize>,
) -> Result<EgsDataLoader<KaldiExampleStore>> {
    validate_rank(world_size, local_rank)?;
    let config = LoaderConfig {
        source: source.as_ref().to_path_buf(),
        left_context,
        right_context,
        subsampling_factor: DEFAULT_SUBSAMPLING_FACTOR,
        batch_size: 1,
        // world_size alone does not shard
        world_size: local_rank.and(world_size),
        local_rank,
        ..LoaderConfig::default()
    };
    EgsDataLoader::from_config(&config)
}

/// One epoch of batch groups
pub struct EpochIter<'a, S> {
    loader: &'a EgsDataLoader<S>,
    groups: std::vec::IntoIter<Vec<usize>>,
}

impl<S: ExampleStore> EpochIter<'_, S> {
    /// Groups not yet fetched
    pub fn remaining(&self) -> usize {
        self.groups.len()
    }
}

impl<S: ExampleStore> Iterator for EpochIter<'_, S> {
    type Item = Result<ChainBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let group = self.groups.next()?;
        let refs = EgsDataLoader::<S>::refs_for(&self.loader.index, &group);
        Some(self.loader.collator.collate(&*self.loader.store, &refs))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.groups.size_hint()
    }
}

impl<S: ExampleStore> ExactSizeIterator for EpochIter<'_, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EgsError;
    use crate::storage::MemoryExampleStore;

    #[test]
    fn test_rank_without_world_size() {
        let err = get_egs_dataloader("/nonexistent", 0, 0, None, Some(0)).err().unwrap();
        assert!(matches!(err, EgsError::Configuration { .. }));
    }

    #[test]
    fn test_missing_store_entry_fails_group() {
        let index = ExampleIndex::from_refs(vec![ExampleRef::new("utt1", "nowhere")]);
        let loader = EgsDataLoader::new(
            index,
            MemoryExampleStore::new(),
            ChainCollator::new(0, 0, 1).unwrap(),
            RandomBatchSampler::new(1).with_seed(1),
        );
        assert_eq!(loader.num_batches(), 1);
        let results: Vec<_> = loader.iter().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(EgsError::Io { .. })));
    }
}
