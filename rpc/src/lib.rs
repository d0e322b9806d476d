//! JSON-RPC peer for the Checkstyle controller/worker channel.

pub mod codec;
pub mod message;
pub mod uri;

mod peer;

pub use message::{ResponseError, parse_params};
pub use peer::{
    CloseReason, Connection, ConnectionHandle, Inbound, NotificationSink, Outgoing, RpcError,
    connect,
};
