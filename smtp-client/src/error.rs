use std::io;

/// A failure that aborted one [`crate::ClientFsm`] session, named after the
/// dialogue phase it happened in. Every variant keeps enough
/// context — the underlying I/O error, or the full reply line — to build
/// the per-recipient error message the [`crate::Dispatcher`] hands back to
/// its caller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connecting to {host}:{port}")]
    Connecting {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("reading a reply")]
    Io(#[source] io::Error),

    #[error("writing a command")]
    WriteIo(#[source] io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("peer closed the connection before sending a complete reply")]
    UnexpectedEof,

    #[error("server sent a malformed reply: {0}")]
    MalformedReply(String),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("every RCPT was rejected; first failure: {0}")]
    AllRecipientsRejected(String),
}

impl TransportError {
    /// The text surfaced to the per-recipient callback — the full wire
    /// reply line where one exists, a short description otherwise.
    pub fn as_reply_text(&self) -> String {
        match self {
            TransportError::UnexpectedReply(line)
            | TransportError::MalformedReply(line)
            | TransportError::AllRecipientsRejected(line) => line.clone(),
            other => other.to_string(),
        }
    }
}

/// A failure in the [`crate::Dispatcher`]'s own bookkeeping, as opposed to
/// one specific client-dialogue session (the "resolution" and
/// cancellation error kinds).
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("No MX record for domain {domain}")]
    NoMxRecord { domain: String },

    #[error("Cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn as_reply_text(&self) -> String {
        self.to_string()
    }
}
