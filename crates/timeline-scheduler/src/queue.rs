use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::Result;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

enum Message {
    Run(Job),
    /// Answered once every message queued before it has been processed.
    Barrier(oneshot::Sender<()>),
}

/// Single-worker FIFO job queue.
///
/// Timer dispatch only ever calls [`UpdateQueue::enqueue`], which never
/// blocks; the slow part (filesystem sync, HTTP) runs on the worker task.
/// Jobs run strictly one at a time in submission order. A job that returns
/// an error or panics is logged and the worker moves on to the next one.
pub struct UpdateQueue {
    tx: mpsc::UnboundedSender<Message>,
    worker: JoinHandle<()>,
}

impl UpdateQueue {
    /// Spawn the worker on the current Tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(worker_loop(rx));
        Self { tx, worker }
    }

    /// Append a job. Returns immediately.
    pub fn enqueue<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let job: Job = Box::new(move || job().boxed());
        if self.tx.send(Message::Run(job)).is_err() {
            error!("update worker is gone, job dropped");
        }
    }

    /// Wait until every job enqueued before this call has finished.
    pub async fn wait_for_drain(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Barrier(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UpdateQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn worker_loop(mut rx: mpsc::UnboundedReceiver<Message>) {
    debug!("update worker started");
    while let Some(message) = rx.recv().await {
        match message {
            Message::Run(job) => run_job(job).await,
            Message::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("update worker stopped");
}

async fn run_job(job: Job) {
    // Building the future may panic too, so it happens inside the guard.
    let outcome = AssertUnwindSafe(async move { job().await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "update job failed, waiting for the next tick"),
        Err(panic) => error!(
            panic = %panic_message(panic.as_ref()),
            "update job panicked, waiting for the next tick"
        ),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
