//! Bounded worker pool shared by every connection.
//!
//! A fixed number of workers pull jobs FIFO from one queue. Each job runs on tokio's
//! blocking thread pool so CPU-bound evaluation never stalls the reactor; at most `width`
//! jobs run at once. A job that panics is answered with an `(Exception)` reply.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{self, JoinError};
use tracing::{debug, warn};

use crate::errors::{ProtocolError, ServerError};
use crate::handler::Job;
use crate::response::Response;

struct Task {
    job: Job,
    reply: oneshot::Sender<Response>,
}

#[derive(Debug)]
pub struct WorkerPool {
    queue: mpsc::UnboundedSender<Task>,
    width: usize,
}

impl WorkerPool {
    /// Starts `width` workers (at least one). Must be called from within a tokio runtime.
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        let (queue, receiver) = mpsc::unbounded_channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..width {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    // hold the lock only while waiting for the next task
                    let task = receiver.lock().await.recv().await;
                    let Some(task) = task else {
                        debug!(worker, "worker pool queue closed");
                        break;
                    };
                    let response = match task::spawn_blocking(task.job).await {
                        Ok(response) => response,
                        Err(err) => {
                            warn!(worker, "job failed: {}", err);
                            failure_response(err)
                        }
                    };
                    // the connection may be gone; its reply is dropped
                    let _ = task.reply.send(response);
                }
            });
        }

        Self { queue, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Enqueues `job`; the returned receiver resolves with its reply.
    pub fn submit(&self, job: Job) -> Result<oneshot::Receiver<Response>, ServerError> {
        let (reply, receiver) = oneshot::channel();
        self.queue
            .send(Task { job, reply })
            .map_err(|_| ServerError::PoolClosed)?;
        Ok(receiver)
    }
}

fn failure_response(err: JoinError) -> Response {
    let description = if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    };
    Response::error(ProtocolError::Exception(description))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "worker panicked".to_string(),
        },
    }
}
