//! Two-target task scheduler
//!
//! CPU-bound work runs on a tokio blocking pool. Work that touches GPU
//! resources is queued for the main thread, which drains the queue with
//! [`Scheduler::run_main_tasks`] and lends each task its context `C`.

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;

/// A task bound to the main thread
pub type MainTask<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Main-thread task queue
pub struct MainQueue<C> {
    rx: mpsc::UnboundedReceiver<MainTask<C>>,
}

impl<C> MainQueue<C> {
    /// Run every queued task, including tasks queued while draining.
    /// Returns the number of tasks run.
    pub fn drain(&mut self, context: &mut C) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(context);
            count += 1;
        }
        count
    }
}

/// Cloneable handle for scheduling tasks from any thread
pub struct SchedulerHandle<C> {
    runtime: Handle,
    main_tx: mpsc::UnboundedSender<MainTask<C>>,
}

impl<C> Clone for SchedulerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            main_tx: self.main_tx.clone(),
        }
    }
}

impl<C: 'static> SchedulerHandle<C> {
    /// Run `task` on the worker pool
    pub fn spawn_worker<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Detached; completion is reported through the task's own channel
        drop(self.runtime.spawn_blocking(task));
    }

    /// Queue `task` for the main thread
    pub fn spawn_main<F>(&self, task: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if self.main_tx.send(Box::new(task)).is_err() {
            tracing::warn!("Main queue closed, dropping task");
        }
    }
}

/// Owns the worker runtime and the main queue
pub struct Scheduler<C> {
    runtime: Option<Runtime>,
    handle: SchedulerHandle<C>,
    main: MainQueue<C>,
}

impl<C: 'static> Scheduler<C> {
    /// Create a scheduler with `worker_threads` workers, 0 for one per core
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.thread_name("tessera-worker").enable_all();
        if worker_threads > 0 {
            builder
                .worker_threads(worker_threads)
                .max_blocking_threads(worker_threads);
        }
        let runtime = builder.build()?;

        let (main_tx, rx) = mpsc::unbounded_channel();
        let handle = SchedulerHandle {
            runtime: runtime.handle().clone(),
            main_tx,
        };

        tracing::debug!(
            "Scheduler started with {} worker thread(s)",
            if worker_threads == 0 {
                "default".to_string()
            } else {
                worker_threads.to_string()
            }
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            main: MainQueue { rx },
        })
    }

    pub fn handle(&self) -> SchedulerHandle<C> {
        self.handle.clone()
    }

    pub fn spawn_worker<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.spawn_worker(task);
    }

    pub fn spawn_main<F>(&self, task: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.handle.spawn_main(task);
    }

    /// Run queued main-thread tasks against `context`
    pub fn run_main_tasks(&mut self, context: &mut C) -> usize {
        self.main.drain(context)
    }
}

impl<C> Drop for Scheduler<C> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
