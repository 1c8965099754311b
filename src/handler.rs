use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::computation::Computation;
use crate::errors::ProtocolError;
use crate::request::{Request, RequestKind};
use crate::response::Response;
use crate::stats::StatsStore;

/// Deferred work producing exactly one reply; runs on a pool worker.
pub type Job = Box<dyn FnOnce() -> Response + Send + 'static>;

/// What the connection should do with one inbound line.
pub enum Dispatch {
    /// Already resolved; queue as is.
    Reply(Response),
    /// Hand to the worker pool and queue the pending reply.
    Submit(Job),
    /// Queue the ack, then close once every earlier reply is written.
    Quit(Response),
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reply(response) => f.debug_tuple("Reply").field(response).finish(),
            Self::Submit(_) => f.write_str("Submit(..)"),
            Self::Quit(response) => f.debug_tuple("Quit").field(response).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestHandler {
    stats: Arc<StatsStore>,
}

impl RequestHandler {
    pub fn new(stats: Arc<StatsStore>) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &Arc<StatsStore> {
        &self.stats
    }

    /// Classifies and validates `line`. `received` is when the line was read off the wire.
    pub fn handle(&self, line: &str, received: Instant) -> Dispatch {
        let request = Request::new(line);
        debug!(command = request.command(), kind = ?request.kind(), "dispatching");

        match request.kind() {
            RequestKind::Quit => Dispatch::Quit(Response::ack()),
            RequestKind::Stat => match request.stat_request() {
                Ok(stat) => {
                    let stats = self.stats.clone();
                    Dispatch::Submit(Box::new(move || {
                        stats.respond(stat.kind(), received.elapsed())
                    }))
                }
                Err(error) => Dispatch::Reply(error.into()),
            },
            RequestKind::Computation => match request.computation_request() {
                Ok(parsed) => {
                    let stats = self.stats.clone();
                    let computation = Computation::new(parsed);
                    Dispatch::Submit(Box::new(move || computation.respond(&stats)))
                }
                Err(error) => Dispatch::Reply(error.into()),
            },
            RequestKind::Unknown => Dispatch::Reply(ProtocolError::IllegalCommand.into()),
        }
    }
}
