//! Bounded worker pool.
//!
//! # Responsibilities
//! - Run handler jobs off the network tasks
//! - Queue up to `queue_capacity` jobs, grow from core to max workers when
//!   the queue is full, reject once both are exhausted
//! - Report occupancy for rejection logs and the admin surface
//!
//! # Design Decisions
//! - Submission never waits: `try_send` or reject
//! - Core workers are started eagerly and never time out; workers above core
//!   exit after `keep_alive` without work
//! - Shutdown stops intake, lets every accepted job finish, then returns

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{ExecutionConfig, ThreadingMode};

/// A unit of work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Pool dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizes {
    pub core: usize,
    pub max: usize,
    pub queue_capacity: usize,
    pub keep_alive: Duration,
}

impl PoolSizes {
    pub fn new(core: usize, max: usize, queue_capacity: usize) -> Result<Self, PoolError> {
        let sizes = Self {
            core,
            max,
            queue_capacity,
            keep_alive: Duration::from_secs(60),
        };
        sizes.check()?;
        Ok(sizes)
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sizes for the configured mode on this machine.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self, PoolError> {
        let parallelism = std::thread::available_parallelism().map(usize::from).unwrap_or(1);
        Self::for_parallelism(config, parallelism)
    }

    pub fn for_parallelism(config: &ExecutionConfig, parallelism: usize) -> Result<Self, PoolError> {
        let (core, max) = match config.mode {
            ThreadingMode::Cpu => (parallelism + 1, parallelism + 1),
            ThreadingMode::Io => (parallelism * 2 + 1, parallelism * 2 + 1),
            ThreadingMode::Mixed => (config.core_size, config.max_size),
        };
        Ok(Self::new(core, max, config.queue_capacity)?.keep_alive(config.keep_alive()))
    }

    fn check(&self) -> Result<(), PoolError> {
        if self.core == 0 {
            return Err(PoolError::InvalidSizes("core size must be at least 1".into()));
        }
        if self.max < self.core {
            return Err(PoolError::InvalidSizes(format!(
                "max size {} is below core size {}",
                self.max, self.core
            )));
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidSizes("queue capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Occupancy snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolState {
    pub core_size: usize,
    pub max_size: usize,
    pub queue_capacity: usize,
    pub active_count: usize,
    pub queued_count: usize,
    pub worker_count: usize,
    /// Most workers ever alive at once.
    pub largest_size: usize,
    pub submitted: u64,
    pub completed: u64,
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "active={} queued={}/{} core={} max={} largest={} submitted={} completed={}",
            self.active_count,
            self.queued_count,
            self.queue_capacity,
            self.core_size,
            self.max_size,
            self.largest_size,
            self.submitted,
            self.completed
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("execution pool saturated ({0})")]
    Rejected(PoolState),

    #[error("execution pool is shut down")]
    ShutDown,

    #[error("invalid pool sizes: {0}")]
    InvalidSizes(String),
}

/// A refused submission. Carries the job back so the caller can retry it
/// elsewhere.
pub struct SubmitError {
    pub error: PoolError,
    job: Job,
}

impl SubmitError {
    pub fn into_job(self) -> Job {
        self.job
    }
}

impl fmt::Debug for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitError").field("error", &self.error).finish_non_exhaustive()
    }
}

struct Shared {
    sizes: PoolSizes,
    rx: tokio::sync::Mutex<mpsc::Receiver<Job>>,
    workers: AtomicUsize,
    active: AtomicUsize,
    largest: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl Shared {
    async fn run(&self, job: Job) {
        self.active.fetch_add(1, Ordering::SeqCst);
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            tracing::error!("Job panicked inside the execution pool");
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

enum Next {
    Job(Job),
    Idle,
    Closed,
}

/// Fixed-capacity executor for handler invocations.
pub struct ExecutionPool {
    tx: mpsc::Sender<Job>,
    shared: Arc<Shared>,
    close_tx: watch::Sender<bool>,
    closed: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutionPool {
    /// Create the pool and start its core workers. Needs a Tokio runtime.
    pub fn new(sizes: PoolSizes) -> Result<Self, PoolError> {
        sizes.check()?;
        let (tx, rx) = mpsc::channel(sizes.queue_capacity);
        let (close_tx, _) = watch::channel(false);
        let pool = Self {
            tx,
            shared: Arc::new(Shared {
                sizes,
                rx: tokio::sync::Mutex::new(rx),
                workers: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                largest: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
            close_tx,
            closed: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        };
        {
            let mut handles = pool.lock_handles();
            for _ in 0..sizes.core {
                if pool.reserve_worker() {
                    pool.spawn_worker(&mut handles, None, true);
                }
            }
        }
        tracing::debug!(core = sizes.core, max = sizes.max, queue = sizes.queue_capacity, "Execution pool started");
        Ok(pool)
    }

    pub fn sizes(&self) -> PoolSizes {
        self.shared.sizes
    }

    /// Submit a future without waiting.
    pub fn submit<F>(&self, fut: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submit_job(Box::pin(fut))
    }

    pub fn submit_job(&self, job: Job) -> Result<(), SubmitError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SubmitError { error: PoolError::ShutDown, job });
        }
        match self.tx.try_send(job) {
            Ok(()) => {
                self.shared.submitted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) => self.grow(job),
            Err(mpsc::error::TrySendError::Closed(job)) => Err(SubmitError { error: PoolError::ShutDown, job }),
        }
    }

    pub fn state(&self) -> PoolState {
        let sizes = self.shared.sizes;
        PoolState {
            core_size: sizes.core,
            max_size: sizes.max,
            queue_capacity: sizes.queue_capacity,
            active_count: self.shared.active.load(Ordering::SeqCst),
            queued_count: self.tx.max_capacity() - self.tx.capacity(),
            worker_count: self.shared.workers.load(Ordering::SeqCst),
            largest_size: self.shared.largest.load(Ordering::SeqCst),
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting work, finish everything already accepted, then return.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.close_tx.send(true);

        let handles: Vec<JoinHandle<()>> = self.lock_handles().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Execution pool worker failed");
            }
        }

        // Anything that slipped in between the flag and the workers' exit.
        let mut rx = self.shared.rx.lock().await;
        rx.close();
        while let Some(job) = rx.recv().await {
            self.shared.run(job).await;
        }
        tracing::info!(state = %self.state(), "Execution pool drained");
    }

    fn reserve_worker(&self) -> bool {
        let max = self.shared.sizes.max;
        match self
            .shared
            .workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
        {
            Ok(previous) => {
                self.shared.largest.fetch_max(previous + 1, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    /// Start a worker above core size to run `job`. The closed flag is
    /// checked under the handles lock so `shutdown` joins every worker it
    /// lets through.
    fn grow(&self, job: Job) -> Result<(), SubmitError> {
        if !self.reserve_worker() {
            return Err(SubmitError {
                error: PoolError::Rejected(self.state()),
                job,
            });
        }
        let mut handles = self.lock_handles();
        if self.closed.load(Ordering::SeqCst) {
            self.shared.workers.fetch_sub(1, Ordering::SeqCst);
            return Err(SubmitError {
                error: PoolError::ShutDown,
                job,
            });
        }
        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        self.spawn_worker(&mut handles, Some(job), false);
        Ok(())
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_worker(&self, handles: &mut Vec<JoinHandle<()>>, first: Option<Job>, core: bool) {
        let shared = Arc::clone(&self.shared);
        let closed = self.close_tx.subscribe();
        handles.retain(|h| !h.is_finished());
        handles.push(tokio::spawn(worker_loop(shared, first, core, closed)));
    }
}

impl Drop for ExecutionPool {
    fn drop(&mut self) {
        let _ = self.close_tx.send(true);
    }
}

async fn worker_loop(shared: Arc<Shared>, first: Option<Job>, core: bool, mut closed: watch::Receiver<bool>) {
    if let Some(job) = first {
        shared.run(job).await;
    }

    loop {
        if *closed.borrow() {
            break;
        }
        // The keep-alive covers the wait for the receiver lock too: an idle
        // core worker parks on `recv` while holding it.
        let next = tokio::select! {
            biased;
            _ = closed.changed() => Next::Closed,
            job = async { shared.rx.lock().await.recv().await } => job.map(Next::Job).unwrap_or(Next::Closed),
            _ = tokio::time::sleep(shared.sizes.keep_alive), if !core => Next::Idle,
        };
        match next {
            Next::Job(job) => shared.run(job).await,
            Next::Idle => {
                tracing::debug!("Idle worker above core size exiting");
                shared.workers.fetch_sub(1, Ordering::SeqCst);
                return;
            }
            Next::Closed => break,
        }
    }

    // Drain what is already queued before exiting.
    loop {
        let job = {
            let mut rx = shared.rx.lock().await;
            rx.try_recv().ok()
        };
        match job {
            Some(job) => shared.run(job).await,
            None => break,
        }
    }
    shared.workers.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    fn blocked(gate: &Arc<Semaphore>) -> impl Future<Output = ()> + Send + 'static {
        let gate = gate.clone();
        async move {
            let _permit = gate.acquire().await;
        }
    }

    async fn wait_until(pool: &ExecutionPool, pred: impl Fn(&PoolState) -> bool) {
        for _ in 0..200 {
            if pred(&pool.state()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("pool never reached expected state: {}", pool.state());
    }

    #[test]
    fn test_sizes_from_mode() {
        let mut config = ExecutionConfig::default();
        config.mode = ThreadingMode::Cpu;
        assert_eq!(PoolSizes::for_parallelism(&config, 4).unwrap().core, 5);
        config.mode = ThreadingMode::Io;
        let io = PoolSizes::for_parallelism(&config, 4).unwrap();
        assert_eq!((io.core, io.max), (9, 9));
        config.mode = ThreadingMode::Mixed;
        config.core_size = 4;
        config.max_size = 2;
        assert!(matches!(PoolSizes::for_parallelism(&config, 4), Err(PoolError::InvalidSizes(_))));
    }

    #[tokio::test]
    async fn test_third_submission_rejected() {
        let pool = ExecutionPool::new(PoolSizes::new(1, 1, 1).unwrap()).unwrap();
        let gate = Arc::new(Semaphore::new(0));

        assert!(pool.submit(blocked(&gate)).is_ok());
        wait_until(&pool, |s| s.active_count == 1).await;
        assert!(pool.submit(blocked(&gate)).is_ok());

        let err = pool.submit(async {}).unwrap_err();
        match &err.error {
            PoolError::Rejected(state) => {
                assert_eq!(state.active_count, 1);
                assert_eq!(state.queued_count, 1);
                assert_eq!(state.submitted, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        gate.add_permits(1);
        wait_until(&pool, |s| s.completed == 2).await;
    }

    #[tokio::test]
    async fn test_grows_to_max_when_queue_full() {
        let pool = ExecutionPool::new(PoolSizes::new(1, 2, 1).unwrap()).unwrap();
        let gate = Arc::new(Semaphore::new(0));
        assert!(pool.submit(blocked(&gate)).is_ok());
        wait_until(&pool, |s| s.active_count == 1).await;
        assert!(pool.submit(blocked(&gate)).is_ok());
        assert!(pool.submit(blocked(&gate)).is_ok());
        wait_until(&pool, |s| s.active_count == 2).await;

        let state = pool.state();
        assert_eq!(state.worker_count, 2);
        assert_eq!(state.largest_size, 2);
        assert_eq!(state.queued_count, 1);
        assert!(pool.submit(async {}).is_err());
        gate.add_permits(1);
        wait_until(&pool, |s| s.completed == 3).await;
    }

    #[tokio::test]
    async fn test_extra_worker_retires_after_keep_alive() {
        let sizes = PoolSizes::new(1, 2, 1).unwrap().keep_alive(Duration::from_millis(50));
        let pool = ExecutionPool::new(sizes).unwrap();
        let gate = Arc::new(Semaphore::new(0));
        assert!(pool.submit(blocked(&gate)).is_ok());
        wait_until(&pool, |s| s.active_count == 1).await;
        assert!(pool.submit(blocked(&gate)).is_ok());
        assert!(pool.submit(blocked(&gate)).is_ok());
        wait_until(&pool, |s| s.worker_count == 2).await;

        gate.add_permits(3);
        wait_until(&pool, |s| s.completed == 3).await;
        wait_until(&pool, |s| s.worker_count == 1).await;

        let state = pool.state();
        assert_eq!(state.largest_size, 2);
        assert!(pool.submit(async {}).is_ok());
        wait_until(&pool, |s| s.completed == 4).await;
    }

    #[tokio::test]
    async fn test_growth_refused_once_closed() {
        let pool = ExecutionPool::new(PoolSizes::new(1, 2, 1).unwrap()).unwrap();
        let gate = Arc::new(Semaphore::new(0));
        assert!(pool.submit(blocked(&gate)).is_ok());
        wait_until(&pool, |s| s.active_count == 1).await;
        assert!(pool.submit(blocked(&gate)).is_ok());

        // Shutdown has flipped the flag but a submitter already passed its check.
        pool.closed.store(true, Ordering::SeqCst);
        let err = pool.grow(Box::pin(async {})).unwrap_err();
        assert!(matches!(err.error, PoolError::ShutDown));
        assert_eq!(pool.state().worker_count, 1);
        assert_eq!(pool.state().submitted, 2);
        gate.add_permits(2);
    }

    #[tokio::test]
    async fn test_shutdown_finishes_accepted_work() {
        let pool = ExecutionPool::new(PoolSizes::new(1, 1, 8).unwrap()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = done.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert!(matches!(pool.submit(async {}).unwrap_err().error, PoolError::ShutDown));
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let pool = ExecutionPool::new(PoolSizes::new(1, 1, 2).unwrap()).unwrap();
        pool.submit(async { panic!("boom") }).unwrap();
        wait_until(&pool, |s| s.completed == 1).await;
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        pool.submit(async move { flag.store(true, Ordering::SeqCst) }).unwrap();
        wait_until(&pool, |s| s.completed == 2).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
