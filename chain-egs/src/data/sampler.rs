//! Batch samplers
//!
//! Decide which example indices form each batch group for an epoch.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Shuffled batches over the whole index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomBatchSampler {
    /// References per batch group
    pub batch_size: usize,
    /// Drop the trailing short batch
    pub drop_last: bool,
    /// Fixed base seed; `None` draws fresh entropy every epoch
    pub seed: Option<u64>,
}

impl Default for RandomBatchSampler {
    fn default() -> Self {
        Self {
            batch_size: 1,
            drop_last: false,
            seed: None,
        }
    }
}

impl RandomBatchSampler {
    /// Unseeded sampler with groups of `batch_size` (at least 1)
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..Self::default()
        }
    }

    /// Fix the base seed so epochs are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Shuffled index groups for `epoch`
    pub fn batches(&self, epoch: u64, len: usize) -> Vec<Vec<usize>> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(epoch)),
            None => StdRng::from_entropy(),
        };
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut rng);

        let batch_size = self.batch_size.max(1);
        order
            .chunks(batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Groups per epoch over `len` examples
    pub fn num_batches(&self, len: usize) -> usize {
        let batch_size = self.batch_size.max(1);
        if self.drop_last {
            len / batch_size
        } else {
            len.div_ceil(batch_size)
        }
    }
}

/// Rank-local shard of a shared epoch permutation
///
/// Every rank derives the same permutation from `seed + epoch`, so the
/// shards are disjoint apart from wrap-around padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedSampler {
    /// Number of ranks
    pub num_replicas: usize,
    /// This process's rank
    pub rank: usize,
    /// Shuffle before sharding
    pub shuffle: bool,
    /// Base seed shared by all ranks
    pub seed: u64,
    /// Truncate to a multiple of `num_replicas` instead of padding
    pub drop_last: bool,
    /// References per batch group
    pub batch_size: usize,
}

impl DistributedSampler {
    /// Callers validate `rank < num_replicas` and `num_replicas > 0`
    pub fn new(num_replicas: usize, rank: usize) -> Self {
        Self {
            num_replicas,
            rank,
            shuffle: true,
            seed: 0,
            drop_last: false,
            batch_size: 1,
        }
    }

    /// Set the base seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the group size (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Indices assigned to this rank for `epoch`
    pub fn indices(&self, epoch: u64, len: usize) -> Vec<usize> {
        let replicas = self.num_replicas.max(1);
        let mut order: Vec<usize> = (0..len).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch));
            order.shuffle(&mut rng);
        }

        let total = self.num_samples(len) * replicas;
        if total <= order.len() {
            order.truncate(total);
        } else if !order.is_empty() {
            let mut padded = Vec::with_capacity(total);
            while padded.len() < total {
                let need = total - padded.len();
                padded.extend_from_slice(&order[..need.min(order.len())]);
            }
            order = padded;
        }

        order
            .into_iter()
            .skip(self.rank)
            .step_by(replicas)
            .collect()
    }

    /// Per-rank sample count
    pub fn num_samples(&self, len: usize) -> usize {
        let replicas = self.num_replicas.max(1);
        if self.drop_last {
            len / replicas
        } else {
            len.div_ceil(replicas)
        }
    }

    /// Rank-local indices in groups of `batch_size`, remainder kept
    pub fn batches(&self, epoch: u64, len: usize) -> Vec<Vec<usize>> {
        self.indices(epoch, len)
            .chunks(self.batch_size.max(1))
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Groups per epoch for this rank
    pub fn num_batches(&self, len: usize) -> usize {
        self.num_samples(len).div_ceil(self.batch_size.max(1))
    }
}

/// Sampling strategy used by a loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sampling {
    /// Single process
    Random(RandomBatchSampler),
    /// One rank of a multi-process job
    Distributed(DistributedSampler),
}

impl Sampling {
    /// Index groups for `epoch`
    pub fn batches(&self, epoch: u64, len: usize) -> Vec<Vec<usize>> {
        match self {
            Sampling::Random(sampler) => sampler.batches(epoch, len),
            Sampling::Distributed(sampler) => sampler.batches(epoch, len),
        }
    }

    /// Groups per epoch
    pub fn num_batches(&self, len: usize) -> usize {
        match self {
            Sampling::Random(sampler) => sampler.num_batches(len),
            Sampling::Distributed(sampler) => sampler.num_batches(len),
        }
    }

    /// True for rank-sharded sampling
    pub fn is_distributed(&self) -> bool {
        matches!(self, Sampling::Distributed(_))
    }
}

impl From<RandomBatchSampler> for Sampling {
    fn from(sampler: RandomBatchSampler) -> Self {
        Sampling::Random(sampler)
    }
}

impl From<DistributedSampler> for Sampling {
    fn from(sampler: DistributedSampler) -> Self {
        Sampling::Distributed(sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_keeps_remainder() {
        let sampler = RandomBatchSampler::new(3).with_seed(7);
        let batches = sampler.batches(0, 10);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches.last().unwrap().len(), 1);
        assert_eq!(sampler.num_batches(10), 4);
    }

    #[test]
    fn test_distributed_pads_by_wrapping() {
        let sampler = DistributedSampler::new(4, 3);
        // 5 examples over 4 ranks -> 2 each, 3 padded from the front
        assert_eq!(sampler.indices(0, 5).len(), 2);
        assert_eq!(sampler.num_samples(5), 2);
    }

    #[test]
    fn test_distributed_empty_index() {
        let sampler = DistributedSampler::new(2, 0);
        assert!(sampler.indices(0, 0).is_empty());
    }
}
