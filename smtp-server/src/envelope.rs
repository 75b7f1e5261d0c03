/// A completed mail transaction, handed to the application's `mail` sink.
///
/// `Envelope` is an immutable snapshot: once built, the `ServerFsm` no
/// longer holds a reference to it, and the sink is free to keep, move, or
/// drop it without worrying about a subsequent `RSET` mutating it out from
/// under the sink (it can't — there is nothing left to mutate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
    pub data: Vec<u8>,
}

/// The mutable, in-progress transaction state a [`crate::ServerFsm`] builds
/// up across `MAIL`/`RCPT`/`DATA`.
///
/// Unlike [`Envelope`], `from` and `to` are optional/empty until the
/// corresponding command has actually succeeded, and `helo` survives a
/// reset since `HELO`/`EHLO`/`RSET` only clear the transaction, not the
/// greeting.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    helo: Option<String>,
    from: Option<String>,
    to: Vec<String>,
}

impl Transaction {
    pub fn helo(&self) -> Option<&str> {
        self.helo.as_deref()
    }

    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    /// `HELO`/`EHLO`: record the greeting and reset the in-progress
    /// transaction, keeping the greeting itself.
    pub fn greet(&mut self, domain: impl Into<String>) {
        self.from = None;
        self.to.clear();
        self.helo = Some(domain.into());
    }

    /// `RSET`: empty the transaction, keeping `helo` intact.
    pub fn reset(&mut self) {
        self.from = None;
        self.to.clear();
    }

    pub fn set_from(&mut self, mailbox: String) {
        self.from = Some(mailbox);
    }

    pub fn push_rcpt(&mut self, mailbox: String) {
        self.to.push(mailbox);
    }

    /// Consume the transaction's `from`/`to` together with a completed
    /// `DATA` body into the immutable [`Envelope`] the sink receives, then
    /// reset in place for the next transaction on this connection.
    pub fn take_envelope(&mut self, data: Vec<u8>) -> Envelope {
        let from = self.from.take().expect("DATA only reachable with a from");
        let to = std::mem::take(&mut self.to);
        Envelope { from, to, data }
    }
}
