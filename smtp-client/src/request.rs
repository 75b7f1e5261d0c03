use std::collections::HashMap;
use std::time::Duration;

use smtp_message::Email;

const DEFAULT_PORT: u16 = 25;
const DEFAULT_HELO: &str = "localhost";

/// One send operation: a message, its envelope, and the handful of
/// operational knobs (`host`/`port` override, `helo` identity,
/// timeout, debug). Built through [`SendRequest::builder`] rather than a
/// named-argument call surface, since Rust has no idiomatic named-argument
/// syntax — every option becomes a builder method instead.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub(crate) from: Email,
    pub(crate) to: Vec<Email>,
    pub(crate) data: Vec<u8>,
    pub(crate) host: Option<String>,
    pub(crate) port: u16,
    pub(crate) helo: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) debug: bool,
}

impl SendRequest {
    pub fn builder(from: Email, to: Vec<Email>, data: impl Into<Vec<u8>>) -> SendRequestBuilder {
        SendRequestBuilder {
            from,
            to,
            data: data.into(),
            host: None,
            port: DEFAULT_PORT,
            helo: DEFAULT_HELO.to_owned(),
            timeout: None,
            debug: false,
        }
    }

    pub fn from(&self) -> &Email {
        &self.from
    }

    pub fn to(&self) -> &[Email] {
        &self.to
    }
}

pub struct SendRequestBuilder {
    from: Email,
    to: Vec<Email>,
    data: Vec<u8>,
    host: Option<String>,
    port: u16,
    helo: String,
    timeout: Option<Duration>,
    debug: bool,
}

impl SendRequestBuilder {
    /// Override MX resolution entirely: every recipient, regardless of
    /// domain, is delivered to this one `host`/`port`.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn helo(mut self, helo: impl Into<String>) -> Self {
        self.helo = helo.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn build(self) -> SendRequest {
        SendRequest {
            from: self.from,
            to: self.to,
            data: self.data,
            host: self.host,
            port: self.port,
            helo: self.helo,
            timeout: self.timeout,
            debug: self.debug,
        }
    }
}

/// The aggregated result of one [`crate::Dispatcher::send`]. A
/// single-recipient request collapses to a
/// plain ok/err pair; a multi-recipient request reports a full map keyed
/// by recipient address, covering every recipient exactly once.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Single {
        ok: Option<String>,
        err: Option<String>,
    },
    Multi {
        ok: HashMap<String, String>,
        err: HashMap<String, String>,
    },
}

impl SendOutcome {
    /// Whether every recipient was accepted.
    pub fn is_full_success(&self) -> bool {
        match self {
            SendOutcome::Single { err, .. } => err.is_none(),
            SendOutcome::Multi { err, .. } => err.is_empty(),
        }
    }
}
