//! Remote session layer: the channel abstraction and the coordinator that
//! caches sessions and mirrors local transaction boundaries.

pub mod channel;
pub mod connection;

pub use channel::{ConnectParams, Connector, RemoteChannel, RemoteError, RemoteErrorKind, RemoteResult};
pub use connection::{ConnectionKey, ConnectionManager, SessionHandle};
