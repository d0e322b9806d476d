//! One end of the controller/worker channel.
//!
//! [`connect`] splits a duplex byte stream into a writer task and a reader
//! task. Responses are routed back to the caller awaiting them through a
//! pending map; requests and notifications from the other side are queued on
//! [`Connection::inbound`] for the owner to handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use checkstyle_types::Notification;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{FrameReader, FrameWriter};
use crate::message::{self, IncomingFrame, NotificationMessage, Request, ResponseError};

const WRITER_CHANNEL_CAPACITY: usize = 64;

const INBOUND_CHANNEL_CAPACITY: usize = 256;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ResponseError>>>>>;

enum WriterCommand {
    Send(Value),
    Shutdown,
}

/// Message from the other side that needs handling by the owner.
#[derive(Debug)]
pub enum Inbound {
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// The reader stopped; no further messages will arrive.
    Closed(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The other side closed its pipe.
    Eof,
    /// The stream produced a frame that could not be read.
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("connection closed")]
    Closed,
    #[error("request '{method}' timed out after {}s", timeout.as_secs())]
    Timeout { method: String, timeout: Duration },
    #[error(transparent)]
    Remote(#[from] ResponseError),
    #[error("serializing message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cloneable sending half of a connection.
#[derive(Clone)]
pub struct Outgoing {
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
}

impl Outgoing {
    /// Send a request and wait for its response.
    ///
    /// The pending entry is removed on every exit path so repeated timeouts
    /// do not grow the map.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request::new(id, method, params))?;
        if self.writer_tx.send(WriterCommand::Send(frame)).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(RpcError::Closed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome?),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                Err(RpcError::Closed)
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Send a typed notification.
    pub async fn notify<N: Notification>(&self, params: &N::Params) -> Result<(), RpcError> {
        let params = serde_json::to_value(params)?;
        self.notify_method(N::METHOD, Some(params)).await
    }

    /// Send a notification by method name.
    pub async fn notify_method(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), RpcError> {
        let frame = serde_json::to_value(NotificationMessage::new(method, params))?;
        self.send_frame(frame).await
    }

    /// Answer a request received through [`Inbound::Request`].
    pub async fn respond(
        &self,
        id: Value,
        outcome: Result<Value, ResponseError>,
    ) -> Result<(), RpcError> {
        self.send_frame(message::response_frame(id, outcome)).await
    }

    /// Stop the writer task after the frames already queued.
    pub async fn shutdown(&self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
    }

    async fn send_frame(&self, frame: Value) -> Result<(), RpcError> {
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| RpcError::Closed)
    }
}

/// Fire-and-forget emission of typed notifications.
///
/// Worker components push status through this so they can be driven by a
/// recording sink in tests.
pub trait NotificationSink: Send + Sync {
    fn emit<N: Notification>(&self, params: N::Params) -> impl Future<Output = ()> + Send;
}

impl NotificationSink for Outgoing {
    fn emit<N: Notification>(&self, params: N::Params) -> impl Future<Output = ()> + Send {
        let frame = serde_json::to_value(&params)
            .and_then(|p| serde_json::to_value(NotificationMessage::new(N::METHOD, Some(p))));
        let writer_tx = self.writer_tx.clone();
        async move {
            match frame {
                Ok(frame) => {
                    if writer_tx.send(WriterCommand::Send(frame)).await.is_err() {
                        tracing::debug!(
                            method = N::METHOD,
                            "dropping notification, channel closed"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(method = N::METHOD, "failed to serialize notification: {e}");
                }
            }
        }
    }
}

/// A running connection: sending half, inbound queue, and the two I/O tasks.
pub struct Connection {
    pub outgoing: Outgoing,
    pub inbound: mpsc::Receiver<Inbound>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl Connection {
    /// Separate the inbound queue from the task handles so each can move to
    /// its own owner.
    #[must_use]
    pub fn split(self) -> (ConnectionHandle, mpsc::Receiver<Inbound>) {
        (
            ConnectionHandle {
                outgoing: self.outgoing,
                reader_handle: self.reader_handle,
                writer_handle: self.writer_handle,
            },
            self.inbound,
        )
    }

    /// Flush queued frames, then stop both I/O tasks.
    pub async fn close(self) {
        self.split().0.close().await;
    }
}

/// The I/O tasks of a connection whose inbound queue was taken by [`Connection::split`].
pub struct ConnectionHandle {
    pub outgoing: Outgoing,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Flush queued frames, then stop both I/O tasks.
    pub async fn close(self) {
        self.outgoing.shutdown().await;
        let _ = self.writer_handle.await;
        self.reader_handle.abort();
    }
}

/// Start the I/O tasks for a connection over `reader`/`writer`.
///
/// `name` labels log lines from this connection.
pub fn connect<R, W>(reader: R, writer: W, name: &str) -> Connection
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(INBOUND_CHANNEL_CAPACITY);

    let writer_name = name.to_string();
    let writer_handle = tokio::spawn(async move {
        let mut writer = FrameWriter::new(writer);
        while let Some(cmd) = writer_rx.recv().await {
            match cmd {
                WriterCommand::Send(frame) => {
                    if let Err(e) = writer.write_frame(&frame).await {
                        tracing::warn!("{writer_name}: write error: {e:#}");
                        break;
                    }
                }
                WriterCommand::Shutdown => break,
            }
        }
    });

    let reader_pending = pending.clone();
    let reader_writer_tx = writer_tx.clone();
    let reader_name = name.to_string();
    let reader_handle = tokio::spawn(async move {
        let mut reader = FrameReader::new(reader);
        let reason = loop {
            match reader.read_frame().await {
                Ok(Some(frame)) => {
                    dispatch_frame(
                        &frame,
                        &reader_pending,
                        &inbound_tx,
                        &reader_writer_tx,
                        &reader_name,
                    )
                    .await;
                }
                Ok(None) => {
                    tracing::info!("{reader_name}: peer closed the channel");
                    break CloseReason::Eof;
                }
                Err(e) => {
                    tracing::warn!("{reader_name}: read error: {e:#}");
                    break CloseReason::Failed(format!("{e:#}"));
                }
            }
        };
        // Dropping the senders fails every outstanding request with `Closed`.
        reader_pending.lock().await.clear();
        let _ = inbound_tx.send(Inbound::Closed(reason)).await;
    });

    Connection {
        outgoing: Outgoing {
            writer_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
        },
        inbound: inbound_rx,
        reader_handle,
        writer_handle,
    }
}

async fn dispatch_frame(
    frame: &Value,
    pending: &Mutex<HashMap<u64, oneshot::Sender<Result<Value, ResponseError>>>>,
    inbound_tx: &mpsc::Sender<Inbound>,
    writer_tx: &mpsc::Sender<WriterCommand>,
    name: &str,
) {
    let Some(incoming) = message::parse_incoming(frame) else {
        tracing::trace!("{name}: ignoring malformed JSON-RPC frame");
        return;
    };

    match incoming {
        IncomingFrame::Response { id, outcome } => {
            let sender = pending.lock().await.remove(&id);
            match sender {
                Some(tx) => {
                    let _ = tx.send(outcome);
                }
                None => tracing::debug!("{name}: response for unknown request id {id}"),
            }
        }
        IncomingFrame::Request { id, method, params } => {
            // The peer blocks on a reply, so answer even when nobody is listening.
            if let Err(mpsc::error::SendError(Inbound::Request { id, method, .. })) = inbound_tx
                .send(Inbound::Request { id, method, params })
                .await
            {
                let reply =
                    message::response_frame(id, Err(ResponseError::method_not_found(&method)));
                let _ = writer_tx.send(WriterCommand::Send(reply)).await;
            }
        }
        IncomingFrame::Notification { method, params } => {
            if inbound_tx
                .send(Inbound::Notification { method, params })
                .await
                .is_err()
            {
                tracing::trace!("{name}: inbound queue closed, dropping notification");
            }
        }
    }
}
