use std::io;

/// An error local to one [`Conn`](crate::Conn).
///
/// `ConnError`s never cross connections: an I/O
/// failure or timeout on one `Conn` has no effect on any other live
/// connection the `Listener` is holding.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("reading from the connection")]
    Read(#[source] io::Error),

    #[error("writing to the connection")]
    Write(#[source] io::Error),

    #[error("timeout")]
    Timeout,

    #[error("peer closed the connection mid-command")]
    UnexpectedEof,

    #[error("DATA body exceeded the maximum accepted size")]
    DataTooLarge,

    #[error("connection is already closed")]
    AlreadyClosed,
}

/// What an [`EventBus`](crate::EventBus) handler may fail with.
///
/// Caught by the `ServerFSM`'s exception policy and turned into
/// a `500 INTERNAL ERROR` reply on the connection that triggered it; the
/// session itself is not torn down.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> HandlerError {
        HandlerError(msg.into())
    }
}
