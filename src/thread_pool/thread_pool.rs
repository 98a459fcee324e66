//! Worker pool for chunk generation and finalization
//!
//! A single rayon pool runs both task kinds. Counters are lock-free so the
//! tick thread can ask whether work is still in flight without contending
//! with the workers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{EngineErrorContext, EngineResult};

/// Kinds of work submitted by the chunk loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Terrain generation for a newly requested chunk
    Generation,
    /// Neighbour merge and mesh build
    Finalization,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::Generation, TaskKind::Finalization];

    fn index(self) -> usize {
        self as usize
    }
}

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub num_threads: usize,
    /// Stack size for worker threads (in bytes)
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get().max(1),
            stack_size: Some(2 * 1024 * 1024), // 2MB stack per thread
            thread_name_prefix: "voxels-worker".to_string(),
        }
    }
}

/// Lock-free statistics counters for one task kind
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub tasks_submitted: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub total_execution_time_ns: AtomicU64,
    pub active_tasks: AtomicUsize,
    /// Tasks that unwound instead of returning
    pub tasks_panicked: AtomicU64,
}

/// Settles a task's counters when it finishes, including by unwinding
struct TaskCompletion {
    counters: Arc<PoolCounters>,
    start: Instant,
}

impl Drop for TaskCompletion {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.counters.tasks_panicked.fetch_add(1, Ordering::Relaxed);
        }
        let elapsed_ns = self.start.elapsed().as_nanos() as u64;
        self.counters.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_execution_time_ns
            .fetch_add(elapsed_ns, Ordering::Relaxed);
        self.counters.active_tasks.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Snapshot of [`PoolCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub submitted: u64,
    pub completed: u64,
    pub active: usize,
    pub panicked: u64,
    pub total_execution_time_ns: u64,
}

pub struct WorkerPool {
    pool: ThreadPool,
    counters: [Arc<PoolCounters>; 2],
    num_threads: usize,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> EngineResult<Self> {
        let num_threads = config.num_threads.max(1);
        let prefix = config.thread_name_prefix.clone();
        let mut builder = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(move |idx| format!("{}-{}", prefix, idx))
            .panic_handler(|_| {
                log::error!("[WorkerPool] A worker task panicked");
            });

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder
            .build()
            .thread_pool_context("failed to create worker pool")?;

        log::info!("[WorkerPool::new] Started {} worker threads", num_threads);
        Ok(Self {
            pool,
            counters: [Arc::default(), Arc::default()],
            num_threads,
        })
    }

    /// Run `task` in the background
    pub fn spawn<F>(&self, kind: TaskKind, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let counters = Arc::clone(&self.counters[kind.index()]);
        counters.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        counters.active_tasks.fetch_add(1, Ordering::AcqRel);

        self.pool.spawn(move || {
            let _completion = TaskCompletion {
                counters,
                start: Instant::now(),
            };
            task();
        });
    }

    /// Tasks submitted and not yet finished, across all kinds
    pub fn active_tasks(&self) -> usize {
        self.counters
            .iter()
            .map(|c| c.active_tasks.load(Ordering::Acquire))
            .sum()
    }

    pub fn stats(&self, kind: TaskKind) -> TaskStats {
        let counters = &self.counters[kind.index()];
        TaskStats {
            submitted: counters.tasks_submitted.load(Ordering::Relaxed),
            completed: counters.tasks_completed.load(Ordering::Relaxed),
            active: counters.active_tasks.load(Ordering::Acquire),
            panicked: counters.tasks_panicked.load(Ordering::Relaxed),
            total_execution_time_ns: counters.total_execution_time_ns.load(Ordering::Relaxed),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}
