//! Hot-swappable reference to the live execution pool.
//!
//! # Design Decisions
//! - `ArcSwap` makes the current pool visible to submitters without locking
//! - Reconfiguration publishes the new pool first and only then drains the
//!   old one, so no submitter ever sees a pool that is shutting down for good
//! - A submission that races the swap and hits the old pool retries once on
//!   the new pool

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::execution::pool::{ExecutionPool, Job, PoolError, PoolSizes, PoolState};

#[derive(Clone)]
pub struct PoolHandle {
    current: Arc<ArcSwap<ExecutionPool>>,
    generation: Arc<AtomicU64>,
}

impl PoolHandle {
    pub fn new(sizes: PoolSizes) -> Result<Self, PoolError> {
        let pool = ExecutionPool::new(sizes)?;
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(pool)),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Submit to whichever pool is current.
    pub fn submit<F>(&self, fut: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut job: Job = Box::pin(fut);
        for _ in 0..2 {
            let pool = self.current.load_full();
            match pool.submit_job(job) {
                Ok(()) => return Ok(()),
                Err(refused) if refused.error == PoolError::ShutDown => job = refused.into_job(),
                Err(refused) => return Err(refused.error),
            }
        }
        Err(PoolError::ShutDown)
    }

    pub fn state(&self) -> PoolState {
        self.current.load().state()
    }

    pub fn sizes(&self) -> PoolSizes {
        self.current.load().sizes()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Build a pool with `sizes`, publish it, then drain the previous one.
    pub async fn reconfigure(&self, sizes: PoolSizes) -> Result<(), PoolError> {
        if sizes == self.sizes() {
            return Ok(());
        }
        let next = Arc::new(ExecutionPool::new(sizes)?);
        let previous = self.current.swap(next);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            generation,
            core = sizes.core,
            max = sizes.max,
            queue = sizes.queue_capacity,
            "Execution pool replaced, draining previous pool"
        );
        previous.shutdown().await;
        Ok(())
    }

    /// Drain the current pool. Later submissions fail with `ShutDown`.
    pub async fn shutdown(&self) {
        self.current.load_full().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reconfigure_swaps_then_drains() {
        let handle = PoolHandle::new(PoolSizes::new(1, 1, 4).unwrap()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            handle
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        handle.reconfigure(PoolSizes::new(2, 4, 8).unwrap()).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(handle.generation(), 1);
        assert_eq!(handle.state().max_size, 4);

        let done2 = done.clone();
        handle.submit(async move { done2.fetch_add(1, Ordering::SeqCst); }).unwrap();
        handle.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_same_sizes_keep_pool() {
        let sizes = PoolSizes::new(1, 2, 2).unwrap();
        let handle = PoolHandle::new(sizes).unwrap();
        handle.reconfigure(sizes).await.unwrap();
        assert_eq!(handle.generation(), 0);
    }
}
