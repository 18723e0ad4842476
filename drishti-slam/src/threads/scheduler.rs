//! Persistent fork-join worker pool.
//!
//! [`ParallelScheduler::for_each`] runs a body over an index range on a
//! pool of long-lived worker threads and blocks until every worker is idle
//! again. Workers claim indices from a shared atomic cursor, so each index
//! is visited exactly once regardless of pool size.
//!
//! ```text
//!   caller              workers
//!   ──────              ───────
//!   publish task ──────► wake (generation changed)
//!   wait idle_cv        claim i = cursor++ until i >= stop
//!        ◄──────────── busy -= 1, last one notifies
//!   return
//! ```
//!
//! Workers are created on first use and live until the scheduler is
//! dropped or resized with [`set_threads`](ParallelScheduler::set_threads).
//! A panic in the body is caught per index; the remaining indices still
//! run and the call reports [`SchedulerError::BodyPanicked`].

use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors from [`ParallelScheduler`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("loop body panicked")]
    BodyPanicked,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker thread could not be joined")]
    JoinFailed,

    #[error("scheduler is poisoned after a failed teardown")]
    Poisoned,
}

type Body = dyn Fn(usize) + Sync;

/// One published `for_each` call.
struct Task {
    /// Borrowed from the caller's stack; see `for_each`.
    body: &'static Body,
    cursor: AtomicUsize,
    stop: usize,
    panicked: AtomicBool,
}

struct PoolState {
    generation: u64,
    task: Option<Arc<Task>>,
    busy: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    work_cv: Condvar,
    idle_cv: Condvar,
}

impl Shared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState {
                generation: 0,
                task: None,
                busy: 0,
                shutdown: false,
            }),
            work_cv: Condvar::new(),
            idle_cv: Condvar::new(),
        })
    }
}

/// Fork-join scheduler over a persistent worker pool.
pub struct ParallelScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    threads: usize,
    poisoned: bool,
}

impl std::fmt::Debug for ParallelScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelScheduler")
            .field("threads", &self.threads)
            .field("running", &self.workers.len())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl Default for ParallelScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelScheduler {
    /// Scheduler sized to the available parallelism.
    pub fn new() -> Self {
        let threads = thread::available_parallelism().map_or(1, |n| n.get());
        Self::with_threads(threads)
    }

    /// Scheduler with `threads` workers (at least one).
    pub fn with_threads(threads: usize) -> Self {
        Self {
            shared: Shared::new(),
            workers: Vec::new(),
            threads: threads.max(1),
            poisoned: false,
        }
    }

    /// Configured worker count.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Whether a failed teardown has disabled this scheduler.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Resize the pool. Existing workers are stopped and joined; new ones
    /// start on the next `for_each`.
    pub fn set_threads(&mut self, threads: usize) -> Result<(), SchedulerError> {
        self.teardown()?;
        self.threads = threads.max(1);
        Ok(())
    }

    /// Run `body(i)` for every `i` in `start..stop`, each exactly once,
    /// and return once all of them have finished.
    pub fn for_each(
        &mut self,
        start: usize,
        stop: usize,
        body: &(dyn Fn(usize) + Sync),
    ) -> Result<(), SchedulerError> {
        if self.poisoned {
            return Err(SchedulerError::Poisoned);
        }
        if start >= stop {
            return Ok(());
        }
        self.ensure_workers()?;

        // SAFETY: the erased reference is only reachable through `task`.
        // Workers drop their clone of `task` before reporting idle, and this
        // function does not return until every worker has reported idle and
        // the pool's copy is cleared, so `body` outlives every use.
        let body: &'static Body =
            unsafe { std::mem::transmute::<&(dyn Fn(usize) + Sync), &'static Body>(body) };
        let task = Arc::new(Task {
            body,
            cursor: AtomicUsize::new(start),
            stop,
            panicked: AtomicBool::new(false),
        });

        {
            let mut state = self.shared.state.lock();
            state.task = Some(Arc::clone(&task));
            state.generation = state.generation.wrapping_add(1);
            state.busy = self.workers.len();
            self.shared.work_cv.notify_all();

            while state.busy > 0 {
                self.shared.idle_cv.wait(&mut state);
            }
            state.task = None;
        }

        if task.panicked.load(Ordering::Acquire) {
            log::warn!("Parallel loop body panicked over range {}..{}", start, stop);
            return Err(SchedulerError::BodyPanicked);
        }
        Ok(())
    }

    fn ensure_workers(&mut self) -> Result<(), SchedulerError> {
        if !self.workers.is_empty() {
            return Ok(());
        }

        for i in 0..self.threads {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("scheduler-{i}"))
                .spawn(move || worker_loop(shared));
            match handle {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    // Don't leave a partial pool behind
                    self.teardown()?;
                    return Err(e.into());
                }
            }
        }

        log::debug!("Scheduler started {} workers", self.threads);
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), SchedulerError> {
        if self.workers.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work_cv.notify_all();
        }

        let mut failed = false;
        for handle in self.workers.drain(..) {
            failed |= handle.join().is_err();
        }
        self.shared = Shared::new();

        if failed {
            log::error!("Scheduler worker join failed, pool disabled");
            self.poisoned = true;
            return Err(SchedulerError::JoinFailed);
        }
        Ok(())
    }
}

impl Drop for ParallelScheduler {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let mut seen = 0u64;
    loop {
        let task = {
            let mut state = shared.state.lock();
            while !state.shutdown && state.generation == seen {
                shared.work_cv.wait(&mut state);
            }
            if state.shutdown {
                return;
            }
            seen = state.generation;
            state.task.clone()
        };

        if let Some(task) = task {
            loop {
                let i = task.cursor.fetch_add(1, Ordering::Relaxed);
                if i >= task.stop {
                    break;
                }
                let body = task.body;
                if panic::catch_unwind(AssertUnwindSafe(|| body(i))).is_err() {
                    task.panicked.store(true, Ordering::Release);
                }
            }
        }

        let mut state = shared.state.lock();
        state.busy -= 1;
        if state.busy == 0 {
            shared.idle_cv.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn visit_counts(scheduler: &mut ParallelScheduler, n: usize) -> Vec<u32> {
        let counts: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
        scheduler
            .for_each(0, n, &|i| {
                counts[i].fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        counts.into_iter().map(AtomicU32::into_inner).collect()
    }

    #[test]
    fn test_single_worker_visits_each_index_once() {
        let mut scheduler = ParallelScheduler::with_threads(1);
        assert!(visit_counts(&mut scheduler, 1000).iter().all(|&c| c == 1));
    }

    #[test]
    fn test_many_workers_visit_each_index_once() {
        let mut scheduler = ParallelScheduler::with_threads(8);
        for _ in 0..20 {
            assert!(visit_counts(&mut scheduler, 257).iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_offset_range() {
        let mut scheduler = ParallelScheduler::with_threads(3);
        let sum = AtomicUsize::new(0);
        scheduler
            .for_each(10, 20, &|i| {
                sum.fetch_add(i, Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(sum.into_inner(), (10..20).sum::<usize>());
    }

    #[test]
    fn test_empty_range_is_noop() {
        let mut scheduler = ParallelScheduler::with_threads(2);
        scheduler.for_each(5, 5, &|_| panic!("not called")).unwrap();
        scheduler.for_each(6, 2, &|_| panic!("not called")).unwrap();
    }

    #[test]
    fn test_panicking_body_reports_and_recovers() {
        let mut scheduler = ParallelScheduler::with_threads(4);
        let visited = AtomicUsize::new(0);
        let result = scheduler.for_each(0, 100, &|i| {
            visited.fetch_add(1, Ordering::Relaxed);
            if i == 13 {
                panic!("unlucky index");
            }
        });

        assert!(matches!(result, Err(SchedulerError::BodyPanicked)));
        assert_eq!(visited.into_inner(), 100);
        // Pool still works afterwards
        assert!(visit_counts(&mut scheduler, 50).iter().all(|&c| c == 1));
    }

    #[test]
    fn test_set_threads_recreates_pool() {
        let mut scheduler = ParallelScheduler::with_threads(2);
        assert!(visit_counts(&mut scheduler, 64).iter().all(|&c| c == 1));

        scheduler.set_threads(5).unwrap();
        assert_eq!(scheduler.threads(), 5);
        assert!(visit_counts(&mut scheduler, 64).iter().all(|&c| c == 1));

        scheduler.set_threads(0).unwrap();
        assert_eq!(scheduler.threads(), 1);
        assert!(!scheduler.is_poisoned());
    }
}
