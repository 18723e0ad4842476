//! One-shot background jobs.
//!
//! A [`Job`] bundles everything it needs, runs once on its own named
//! thread and hands its output back through a completion channel:
//!
//! ```text
//!   supervisor                     job thread
//!   ──────────                     ──────────
//!   spawn_job(job) ─────────────►  job.execute()
//!   is_active() == true            active = false
//!   try_result() == None           send(output)
//!   try_result() == Some(output) ◄─┘
//! ```
//!
//! Jobs take their inputs by value, so a resource moved into a job can't be
//! touched by anyone else until the output returns it. There is no
//! cancellation; a spawned job always runs to completion.

use crossbeam_channel::{Receiver, TryRecvError, bounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Errors from background jobs.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to spawn job thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("job panicked")]
    Panicked,

    #[error("job result already taken")]
    Disconnected,
}

/// A unit of work executed off the calling thread.
pub trait Job: Send + 'static {
    type Output: Send + 'static;

    /// Thread name used while the job runs.
    fn name(&self) -> &'static str {
        "job"
    }

    /// Do the work synchronously on the current thread.
    fn execute(self) -> Self::Output;
}

/// Handle to a spawned job.
#[derive(Debug)]
pub struct JobHandle<T> {
    result_rx: Receiver<Result<T, JobError>>,
    active: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Run `job` on a new named thread.
pub fn spawn_job<J: Job>(job: J) -> Result<JobHandle<J::Output>, JobError> {
    let (result_tx, result_rx) = bounded(1);
    let active = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&active);
    let name = job.name();

    let thread = thread::Builder::new().name(name.into()).spawn(move || {
        let output = panic::catch_unwind(AssertUnwindSafe(|| job.execute()))
            .map_err(|_| JobError::Panicked);
        if output.is_err() {
            log::error!("Background job '{}' panicked", name);
        }
        flag.store(false, Ordering::Release);
        // The handle may have been dropped; nobody is waiting then
        let _ = result_tx.send(output);
    })?;

    log::trace!("Spawned background job '{}'", name);
    Ok(JobHandle {
        result_rx,
        active,
        thread: Some(thread),
    })
}

impl<T> JobHandle<T> {
    /// Whether the job is still running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Take the result if the job has finished.
    pub fn try_result(&mut self) -> Option<Result<T, JobError>> {
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JobError::Disconnected)),
        }
    }

    /// Block until the job finishes.
    pub fn wait(mut self) -> Result<T, JobError> {
        let result = self
            .result_rx
            .recv()
            .map_err(|_| JobError::Disconnected)
            .and_then(|r| r);
        self.join();
        result
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    struct Sum(Vec<u64>);

    impl Job for Sum {
        type Output = u64;

        fn name(&self) -> &'static str {
            "sum"
        }

        fn execute(self) -> u64 {
            self.0.iter().sum()
        }
    }

    struct Gated(crossbeam_channel::Receiver<()>);

    impl Job for Gated {
        type Output = &'static str;

        fn execute(self) -> &'static str {
            let _ = self.0.recv();
            "done"
        }
    }

    struct Explodes;

    impl Job for Explodes {
        type Output = ();

        fn execute(self) {
            panic!("boom");
        }
    }

    #[test]
    fn test_wait_returns_output() {
        let handle = spawn_job(Sum(vec![1, 2, 3, 4])).unwrap();
        assert_eq!(handle.wait().unwrap(), 10);
    }

    #[test]
    fn test_active_until_complete() {
        let (gate_tx, gate_rx) = unbounded();
        let mut handle = spawn_job(Gated(gate_rx)).unwrap();

        assert!(handle.is_active());
        assert!(handle.try_result().is_none());

        gate_tx.send(()).unwrap();
        let mut result = None;
        for _ in 0..500 {
            if let Some(r) = handle.try_result() {
                result = Some(r);
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(result.unwrap().unwrap(), "done");
        assert!(!handle.is_active());
    }

    #[test]
    fn test_panicking_job_reports_error() {
        let handle = spawn_job(Explodes).unwrap();
        assert!(matches!(handle.wait(), Err(JobError::Panicked)));
    }
}
