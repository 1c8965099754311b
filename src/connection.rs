//! Per-connection session: a sequential reader and an ordered reply writer.
//!
//! The reader decodes one message per line and never waits for work to finish. Every
//! message queues exactly one [`PendingReply`] into an mpsc channel; a single writer task
//! drains that channel in order, awaiting deferred replies one at a time, so replies leave
//! in the same order their requests arrived no matter when the pool finishes them.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::errors::{ProtocolError, ServerError};
use crate::handler::{Dispatch, RequestHandler};
use crate::pool::WorkerPool;
use crate::response::Response;

/// One decoded unit of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    /// A line longer than the configured maximum; its bytes were discarded.
    Overlong,
    /// A complete line that is not valid UTF-8; its bytes were discarded.
    Malformed,
}

#[async_trait]
pub trait LineReader: Send {
    /// `Ok(None)` once the peer has closed its side.
    async fn read_line(&mut self) -> Result<Option<Inbound>, ServerError>;
}

#[async_trait]
pub trait LineWriter: Send {
    async fn write_line(&mut self, line: String) -> Result<(), ServerError>;
    async fn close(&mut self) -> Result<(), ServerError>;
}

#[async_trait]
impl<T> LineReader for Box<T>
where
    T: LineReader + ?Sized,
{
    async fn read_line(&mut self) -> Result<Option<Inbound>, ServerError> {
        (**self).read_line().await
    }
}

#[async_trait]
impl<T> LineWriter for Box<T>
where
    T: LineWriter + ?Sized,
{
    async fn write_line(&mut self, line: String) -> Result<(), ServerError> {
        (**self).write_line(line).await
    }

    async fn close(&mut self) -> Result<(), ServerError> {
        (**self).close().await
    }
}

/// [`LinesCodec`] that reports an over-long line as [`Inbound::Overlong`] and a non UTF-8
/// line as [`Inbound::Malformed`], then keeps going with the next line instead of failing
/// the stream.
#[derive(Debug, Clone)]
pub struct InboundCodec {
    lines: LinesCodec,
}

impl InboundCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Inbound>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Inbound::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Inbound::Overlong)),
            // the inner codec only raises InvalidData after it has consumed the bad line
            Err(LinesCodecError::Io(err)) if err.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Inbound::Malformed))
            }
            Err(err) => Err(err),
        }
    }
}

impl Decoder for InboundCodec {
    type Item = Inbound;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, LinesCodecError> {
        Self::map(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, LinesCodecError> {
        Self::map(self.lines.decode_eof(src))
    }
}

pub struct LinesReader<R> {
    inner: FramedRead<R, InboundCodec>,
}

impl<R: AsyncRead + Unpin + Send> LinesReader<R> {
    pub fn new(inner: R, max_length: usize) -> Self {
        Self {
            inner: FramedRead::new(inner, InboundCodec::new(max_length)),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LineReader for LinesReader<R> {
    async fn read_line(&mut self) -> Result<Option<Inbound>, ServerError> {
        match self.inner.next().await {
            Some(Ok(inbound)) => Ok(Some(inbound)),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }
}

pub struct LinesWriter<W> {
    inner: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin + Send> LinesWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: FramedWrite::new(inner, LinesCodec::new()),
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> LineWriter for LinesWriter<W> {
    async fn write_line(&mut self, line: String) -> Result<(), ServerError> {
        self.inner.send(line).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ServerError> {
        SinkExt::<String>::close(&mut self.inner).await?;
        Ok(())
    }
}

/// A reply slot in the connection's output sequence.
#[derive(Debug)]
pub enum PendingReply {
    Ready(Response),
    Deferred(oneshot::Receiver<Response>),
}

impl PendingReply {
    async fn resolve(self) -> Response {
        match self {
            Self::Ready(response) => response,
            Self::Deferred(receiver) => receiver.await.unwrap_or_else(|_| {
                Response::error(ProtocolError::Exception(
                    "The request was dropped before completing".to_string(),
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Quit,
    PeerClosed,
    IdleTimeout(Duration),
    ReadFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => write!(f, "client quit"),
            Self::PeerClosed => write!(f, "peer closed"),
            Self::IdleTimeout(after) => write!(f, "idle for {:?}", after),
            Self::ReadFailed(reason) => write!(f, "read failed: {}", reason),
        }
    }
}

pub struct ConnectionSession<R, W> {
    peer: String,
    reader: R,
    writer: W,
    handler: RequestHandler,
    pool: Arc<WorkerPool>,
    idle_timeout: Duration,
}

impl<R, W> ConnectionSession<R, W>
where
    R: LineReader,
    W: LineWriter + 'static,
{
    pub fn new(
        peer: impl Into<String>,
        reader: R,
        writer: W,
        handler: RequestHandler,
        pool: Arc<WorkerPool>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            peer: peer.into(),
            reader,
            writer,
            handler,
            pool,
            idle_timeout,
        }
    }

    /// Serves the connection until it closes. Every reply queued before the close is
    /// written (or dropped, if the peer is gone) before this returns.
    pub async fn run(self) -> CloseReason {
        let Self {
            peer,
            mut reader,
            writer,
            handler,
            pool,
            idle_timeout,
        } = self;
        info!(%peer, "connection established");

        let (replies, queue) = mpsc::unbounded_channel::<PendingReply>();
        let writer_task = tokio::spawn(write_replies(peer.clone(), writer, queue));

        let reason = loop {
            let inbound = match timeout(idle_timeout, reader.read_line()).await {
                Err(_) => break CloseReason::IdleTimeout(idle_timeout),
                Ok(Ok(Some(inbound))) => inbound,
                Ok(Ok(None)) => break CloseReason::PeerClosed,
                Ok(Err(err)) => break CloseReason::ReadFailed(err.to_string()),
            };
            let received = Instant::now();

            let pending = match inbound {
                Inbound::Line(line) => {
                    debug!(%peer, message = %line, "received");
                    match handler.handle(&line, received) {
                        Dispatch::Reply(response) => PendingReply::Ready(response),
                        Dispatch::Quit(ack) => {
                            let _ = replies.send(PendingReply::Ready(ack));
                            break CloseReason::Quit;
                        }
                        Dispatch::Submit(job) => match pool.submit(job) {
                            Ok(receiver) => PendingReply::Deferred(receiver),
                            Err(err) => PendingReply::Ready(Response::error(
                                ProtocolError::Exception(err.to_string()),
                            )),
                        },
                    }
                }
                Inbound::Overlong => {
                    warn!(%peer, "discarded over-long line");
                    PendingReply::Ready(Response::error(ProtocolError::Exception(
                        "Message exceeds the maximum line length".to_string(),
                    )))
                }
                Inbound::Malformed => {
                    warn!(%peer, "discarded line that is not valid UTF-8");
                    PendingReply::Ready(Response::error(ProtocolError::Exception(
                        "Message is not valid UTF-8".to_string(),
                    )))
                }
            };

            // a closed queue means the writer died; keep reading so the peer can still quit
            if replies.send(pending).is_err() {
                debug!(%peer, "reply dropped, writer is gone");
            }
        };

        drop(replies);
        if let Err(err) = writer_task.await {
            warn!(%peer, "reply writer failed: {}", err);
        }
        info!(%peer, %reason, "connection closed");
        reason
    }
}

async fn write_replies<W: LineWriter>(
    peer: String,
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<PendingReply>,
) {
    while let Some(pending) = queue.recv().await {
        let response = pending.resolve().await;
        if let Err(err) = writer.write_line(response.to_string()).await {
            warn!(%peer, "failed to write reply: {}", err);
            return;
        }
    }
    if let Err(err) = writer.close().await {
        debug!(%peer, "failed to close writer: {}", err);
    }
}
