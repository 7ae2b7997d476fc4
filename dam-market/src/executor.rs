//! The worker pool that runs each phase's independent tasks.
//!
//! An [`Executor`] is created explicitly at the start of a simulation and
//! shut down at the end. It hands out [`PhaseRunner`]s, which run a batch of
//! keyed tasks to completion and return their outputs in submission order.

use std::panic::resume_unwind;
use thiserror::Error;
use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::JoinSet,
};

/// Failures of the worker pool itself
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The runtime could not be built
    #[error("unable to start worker pool: {0}")]
    Start(#[from] std::io::Error),
    /// A task was cancelled before it completed, e.g. by a shutdown
    #[error("task cancelled")]
    Cancelled,
}

/// Owns the tokio runtime backing a simulation.
#[derive(Debug)]
pub struct Executor {
    runtime: Runtime,
    cores: usize,
}

impl Executor {
    /// A pool with `cores` worker threads. A single core yields a
    /// current-thread runtime on which every phase runs sequentially.
    pub fn new(cores: usize) -> Result<Self, ExecutorError> {
        let cores = cores.max(1);
        let runtime = if cores == 1 {
            Builder::new_current_thread().build()?
        } else {
            Builder::new_multi_thread()
                .worker_threads(cores)
                .thread_name("dam-worker")
                .build()?
        };
        Ok(Self { runtime, cores })
    }

    /// The configured number of cores
    pub fn cores(&self) -> usize {
        self.cores
    }

    /// A runner dispatching onto this pool
    pub fn runner(&self) -> PhaseRunner {
        PhaseRunner {
            handle: self.runtime.handle().clone(),
            sequential: self.cores == 1,
        }
    }

    /// Drive a future to completion on the pool
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stop the pool without waiting for idle workers
    pub fn shutdown(self) {
        self.runtime.shutdown_background();
    }
}

/// Runs collections of independent tasks, one phase at a time.
#[derive(Clone, Debug)]
pub struct PhaseRunner {
    handle: Handle,
    sequential: bool,
}

impl PhaseRunner {
    /// A runner on the ambient runtime. Must be called from within a tokio
    /// runtime.
    pub fn current(sequential: bool) -> Self {
        Self {
            handle: Handle::current(),
            sequential,
        }
    }

    /// Whether tasks are run one after another in submission order
    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    /// Run every task to completion and return the outputs paired with their
    /// keys, in submission order. Panics inside a task are propagated.
    pub async fn run<K, F>(&self, tasks: Vec<(K, F)>) -> Result<Vec<(K, F::Output)>, ExecutorError>
    where
        K: Send + 'static,
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.sequential {
            let mut outputs = Vec::with_capacity(tasks.len());
            for (key, task) in tasks {
                outputs.push((key, task.await));
            }
            return Ok(outputs);
        }

        let mut slots = (0..tasks.len()).map(|_| None).collect::<Vec<_>>();
        let mut set = JoinSet::new();
        for (idx, (key, task)) in tasks.into_iter().enumerate() {
            set.spawn_on(async move { (idx, key, task.await) }, &self.handle);
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, key, output)) => slots[idx] = Some((key, output)),
                Err(err) if err.is_panic() => resume_unwind(err.into_panic()),
                Err(_) => return Err(ExecutorError::Cancelled),
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
