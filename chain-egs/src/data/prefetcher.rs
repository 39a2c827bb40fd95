//! Background prefetching
//!
//! Runs the fetch-and-collate loop on a blocking task and hands finished
//! batches to the consumer over a bounded channel. A full channel blocks
//! the producer, which is the only backpressure needed.

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::collate::ChainBatch;
use crate::error::{EgsError, Result};

/// Async view of one prefetched epoch
pub struct PrefetchingLoader {
    receiver: mpsc::Receiver<Result<ChainBatch>>,
    task: Option<JoinHandle<()>>,
    total: usize,
    delivered: usize,
}

impl PrefetchingLoader {
    pub(crate) fn spawn<F>(handle: &Handle, capacity: usize, groups: Vec<Vec<usize>>, fetch: F) -> Self
    where
        F: Fn(&[usize]) -> Result<ChainBatch> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let total = groups.len();

        let task = handle.spawn_blocking(move || {
            debug!("Prefetcher starting with {} batch group(s)", groups.len());
            for group in groups {
                let result = fetch(&group);
                let failed = result.is_err();
                if sender.blocking_send(result).is_err() {
                    debug!("Prefetcher: consumer dropped, stopping");
                    return;
                }
                if failed {
                    warn!("Prefetcher stopping after a failed batch group");
                    return;
                }
            }
            debug!("Prefetcher completed");
        });

        Self {
            receiver,
            task: Some(task),
            total,
            delivered: 0,
        }
    }

    /// Next batch, or `DataExhausted` once the epoch (or a failed group)
    /// has been fully delivered
    pub async fn next_batch(&mut self) -> Result<ChainBatch> {
        match self.receiver.recv().await {
            Some(result) => {
                self.delivered += 1;
                result
            }
            None => Err(EgsError::DataExhausted),
        }
    }

    /// Take a ready batch without waiting
    pub fn try_next_batch(&mut self) -> Option<Result<ChainBatch>> {
        let result = self.receiver.try_recv().ok()?;
        self.delivered += 1;
        Some(result)
    }

    /// Batch groups scheduled for this epoch
    pub fn total_batches(&self) -> usize {
        self.total
    }

    pub fn batches_delivered(&self) -> usize {
        self.delivered
    }

    /// Stop the producer and wait for it to exit
    pub async fn shutdown(mut self) {
        // a producer blocked on a full channel wakes up with a send error
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Prefetch task ended abnormally: {}", e);
            }
        }
        debug!(
            "PrefetchingLoader shutdown complete, delivered {} of {} batches",
            self.delivered, self.total
        );
    }
}
