//! Bounded asynchronous dispatch of client operations.
//!
//! A [`Dispatcher`] owns a fixed set of background workers pulling from a
//! bounded submission queue. Each submission yields a [`WorkUnit`]: a
//! cancellable, one-shot handle to the eventual result. Cancellation is
//! cooperative; a unit cancelled before a worker picks it up completes
//! with [`ErrorKind::Cancelled`] without any network activity, while
//! in-flight work observes the token at the next attempt boundary.
//!
//! Panics inside work functions are caught at the worker boundary and
//! delivered as [`ErrorKind::Panicked`] results; they never take a worker
//! down.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::{ErrorKind, Response, Result};

/// Default number of background workers
pub const DEFAULT_WORKERS: usize = 4;
/// Default capacity of the submission queue
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

type WorkFn = Box<dyn FnOnce(CancelToken) -> BoxFuture<'static, Result<Response>> + Send>;

struct Job {
    cancelled: Arc<AtomicBool>,
    respond: oneshot::Sender<Result<Response>>,
    work: WorkFn,
}

/// A cancellable, one-shot unit of asynchronous execution.
///
/// Created by [`Dispatcher::submit`], completed exactly once by a worker.
/// The result is delivered through an internal one-shot channel, so it can
/// never be observed partially or twice.
#[derive(Debug)]
pub struct WorkUnit {
    id: String,
    token: CancelToken,
    rx: oneshot::Receiver<Result<Response>>,
}

impl WorkUnit {
    /// Caller-supplied id of this unit
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Requests cooperative cancellation.
    ///
    /// Returns `true` if this call flipped the unit from live to
    /// cancelled. Work that has not started yet will not start; work
    /// already in flight observes the token between attempts.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    /// Whether cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits for the delivered result, consuming the unit.
    ///
    /// # Errors
    ///
    /// Returns the work function's error, [`ErrorKind::Cancelled`] if the
    /// unit was cancelled before execution, or [`ErrorKind::ClientClosed`]
    /// if the dispatcher shut down before the unit ran.
    pub async fn wait(self) -> Result<Response> {
        self.rx.await.unwrap_or(Err(ErrorKind::ClientClosed))
    }

    /// Non-blocking probe for the result.
    ///
    /// Returns `None` while the unit has not completed yet.
    pub fn try_result(&mut self) -> Option<Result<Response>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ErrorKind::ClientClosed)),
        }
    }
}

/// Submits client operations to a bounded pool of background workers.
///
/// The worker count is independent of the client's connection pool size.
/// Dropping the dispatcher closes the queue; workers drain what was
/// already submitted and then exit.
#[derive(Debug)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_DEPTH)
    }
}

impl Dispatcher {
    /// Creates a dispatcher with `workers` background workers and a
    /// submission queue holding at most `queue_depth` pending units.
    ///
    /// Values of 0 are treated as 1.
    #[must_use]
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|_| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        // Hold the lock only while receiving, so other
                        // workers can pick up jobs while this one runs.
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        run_job(job).await;
                    }
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Submits a work function and returns its [`WorkUnit`].
    ///
    /// The function is invoked on a worker with the unit's [`CancelToken`];
    /// thread it into [`Client::execute`](crate::Client::execute) so that
    /// cancellation is observed between attempts. Submission blocks while
    /// the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ClientClosed`] if the dispatcher has shut down.
    pub async fn submit<F, Fut>(&self, id: impl Into<String>, work: F) -> Result<WorkUnit>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (respond, rx) = oneshot::channel();
        let job = Job {
            cancelled: Arc::clone(&cancelled),
            respond,
            work: Box::new(move |token| work(token).boxed()),
        };

        self.tx
            .send(job)
            .await
            .map_err(|_| ErrorKind::ClientClosed)?;

        Ok(WorkUnit {
            id: id.into(),
            token: CancelToken::from_flag(cancelled),
            rx,
        })
    }

    /// Closes the submission queue and waits for all workers to drain
    /// outstanding units and exit.
    pub async fn shutdown(self) {
        let Self { tx, workers } = self;
        drop(tx);
        for worker in workers {
            // Workers never panic; panics inside work functions are
            // caught and delivered as results.
            let _ = worker.await;
        }
    }
}

async fn run_job(job: Job) {
    let token = CancelToken::from_flag(Arc::clone(&job.cancelled));

    let result = if token.is_cancelled() {
        Err(ErrorKind::Cancelled)
    } else {
        match AssertUnwindSafe((job.work)(token)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ErrorKind::Panicked(panic_message(panic.as_ref()))),
        }
    };

    // The WorkUnit may have been dropped; undeliverable results are fine
    let _ = job.respond.send(result);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
