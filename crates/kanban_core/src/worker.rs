//! Dedicated background worker for long-running jobs.
//!
//! # Responsibility
//! - Run export, import and wide evidence builds off the interactive path.
//! - Hand each job a [`CancellationToken`] checked between entity batches.
//!
//! # Invariants
//! - Jobs run one at a time, in submission order, on a single thread.
//! - A panicking job only fails its own handle; the thread keeps serving.
//! - Waiting on a [`JobHandle`] is always bounded by a timeout.

use crate::error::{KanbanError, KanbanResult};
use log::{error, info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cooperative cancellation flag shared between a caller and its job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with `Cancelled` once the flag is set.
    pub fn check(&self) -> KanbanResult<()> {
        if self.is_cancelled() {
            return Err(KanbanError::Cancelled);
        }
        Ok(())
    }
}

/// Result handle for one submitted job.
pub struct JobHandle<T> {
    receiver: mpsc::Receiver<KanbanResult<T>>,
    token: CancellationToken,
}

impl<T> JobHandle<T> {
    /// Requests cancellation; the job stops at its next batch boundary.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Waits up to `timeout` for the job result.
    ///
    /// Returns `None` while the job is still running.
    pub fn wait(&self, timeout: Duration) -> Option<KanbanResult<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(KanbanError::WorkerStopped)),
        }
    }
}

/// Counts processed items and checks the token at every batch boundary.
pub(crate) struct BatchGuard<'a> {
    token: Option<&'a CancellationToken>,
    batch_size: usize,
    processed: usize,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn new(token: Option<&'a CancellationToken>, batch_size: usize) -> Self {
        Self {
            token,
            batch_size: batch_size.max(1),
            processed: 0,
        }
    }

    /// Guard for foreground calls, which cannot be cancelled.
    pub(crate) fn foreground() -> Self {
        Self::new(None, usize::MAX)
    }

    pub(crate) fn tick(&mut self) -> KanbanResult<()> {
        self.processed += 1;
        if self.processed % self.batch_size == 0 {
            return self.check();
        }
        Ok(())
    }

    pub(crate) fn check(&self) -> KanbanResult<()> {
        match self.token {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}

pub struct BackgroundWorker {
    sender: Mutex<Option<Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundWorker {
    /// Starts the worker thread.
    pub fn spawn(name: &str) -> KanbanResult<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread = Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .map_err(|err| {
                error!("event=worker_spawn module=worker status=error error={err}");
                KanbanError::WorkerStopped
            })?;
        info!("event=worker_spawn module=worker status=ok name={name}");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Queues `job`; the result arrives on the returned handle.
    pub fn submit<T, F>(&self, job: F) -> KanbanResult<JobHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> KanbanResult<T> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (result_tx, result_rx) = mpsc::channel();
        let job_token = token.clone();
        let wrapped: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(|| job(&job_token)));
            match outcome {
                Ok(result) => {
                    // Receiver may be gone if the caller dropped the handle.
                    let _ = result_tx.send(result);
                }
                Err(_) => warn!("event=worker_job module=worker status=error error_code=job_panicked"),
            }
        });

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(KanbanError::WorkerStopped)?;
        sender
            .send(wrapped)
            .map_err(|_| KanbanError::WorkerStopped)?;
        Ok(JobHandle {
            receiver: result_rx,
            token,
        })
    }

    /// Stops accepting jobs and joins the thread after queued jobs finish.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("event=worker_shutdown module=worker status=error error_code=join_failed");
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
