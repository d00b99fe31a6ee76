//! Delivery queue with bounded in-flight work
//!
//! Deliveries are queued on a bounded channel and processed by spawned
//! tasks; at most `prefetch` of them run at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::notification::Delivery;
use crate::processor::BalanceProcessor;

pub const DEFAULT_PREFETCH: usize = 2;

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsumerStats {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Cheap to clone; enqueues deliveries for the [`Consumer`].
#[derive(Debug, Clone)]
pub struct DeliverySender {
    tx: mpsc::Sender<Delivery>,
    counters: Arc<Counters>,
}

impl DeliverySender {
    pub async fn send(&self, delivery: Delivery) -> Result<()> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        self.tx.send(delivery).await.map_err(|_| {
            self.counters.received.fetch_sub(1, Ordering::Relaxed);
            anyhow!("Consumer has stopped")
        })
    }

    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct Consumer {
    handle: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl Consumer {
    /// Spawn the consumer loop. It stops once every [`DeliverySender`] is
    /// dropped and the in-flight deliveries are done.
    pub fn spawn(
        processor: Arc<BalanceProcessor>,
        buffer_size: usize,
        prefetch: usize,
    ) -> (DeliverySender, Self) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(Self::run(rx, processor, Arc::clone(&counters), prefetch.max(1)));
        let sender = DeliverySender {
            tx,
            counters: Arc::clone(&counters),
        };
        (sender, Self { handle, counters })
    }

    async fn run(
        mut rx: mpsc::Receiver<Delivery>,
        processor: Arc<BalanceProcessor>,
        counters: Arc<Counters>,
        prefetch: usize,
    ) {
        let semaphore = Arc::new(Semaphore::new(prefetch));

        while let Some(delivery) = rx.recv().await {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let processor = Arc::clone(&processor);
            let counters = Arc::clone(&counters);

            tokio::spawn(async move {
                let counter = if processor.process(&delivery).await {
                    &counters.succeeded
                } else {
                    &counters.failed
                };
                counter.fetch_add(1, Ordering::Relaxed);
                drop(permit);
            });
        }

        // drain: wait for in-flight deliveries
        let _ = semaphore.acquire_many(prefetch as u32).await;
        tracing::info!(target: "reconciler_processor::consumer", "Consumer stopped");
    }

    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }

    /// Wait for the loop to finish; returns the final counts.
    pub async fn join(self) -> Result<ConsumerStats> {
        self.handle
            .await
            .map_err(|e| anyhow!("Consumer task failed: {e}"))?;
        Ok(self.counters.snapshot())
    }
}
