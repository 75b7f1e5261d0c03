use smtp_message::Reply;

use crate::{conn::Conn, envelope::Envelope};

/// What a `MAIL FROM`/`RCPT TO` acceptance-policy hook decided.
///
/// A rejection supplies the exact reply line to send instead of the
/// built-in `250`; the connection state is left as if the command had
/// never been seen.
pub enum VerbDecision {
    Accept,
    Reject(Reply),
}

/// The named-event dispatch table.
///
/// A string-keyed `emit`/`has`/`eventif` bus would let any verb handler be
/// swapped at runtime, but a statically typed realization of that needs one
/// differently-shaped callback per event anyway, so `Hooks` keeps the
/// *registration table* idea (defaults filled in at construction) but gives
/// each named event its own field instead of a `HashMap<String, Box<dyn
/// Any>>`. The two events worth overriding for an acceptance policy —
/// `MAIL FROM` and `RCPT TO` — get a dedicated [`VerbDecision`] hook; every
/// other verb's behavior is the fixed transition table in `fsm.rs`, since
/// nothing exercises overriding them and a generic handler-per-verb table
/// would be speculative engineering with no caller to exercise it.
///
/// `client`, `disconnect` and `mail` accept any number of handlers, fired
/// in registration order — this is `emit`, not `eventif`: the bus itself
/// makes zero handlers cheap by just not allocating the `Vec`.
pub struct Hooks<IO> {
    on_client: Vec<Box<dyn Fn(&mut Conn<IO>) + Send + Sync>>,
    on_disconnect: Vec<Box<dyn Fn(&str) + Send + Sync>>,
    on_mail: Vec<Box<dyn Fn(Envelope) + Send + Sync>>,
    on_mail_from: Option<Box<dyn Fn(&str) -> VerbDecision + Send + Sync>>,
    on_rcpt_to: Option<Box<dyn Fn(&str) -> VerbDecision + Send + Sync>>,
}

impl<IO> Default for Hooks<IO> {
    fn default() -> Self {
        Hooks {
            on_client: Vec::new(),
            on_disconnect: Vec::new(),
            on_mail: Vec::new(),
            on_mail_from: None,
            on_rcpt_to: None,
        }
    }
}

impl<IO> Hooks<IO> {
    pub fn new() -> Hooks<IO> {
        Hooks::default()
    }

    pub fn on_client(&mut self, handler: impl Fn(&mut Conn<IO>) + Send + Sync + 'static) {
        self.on_client.push(Box::new(handler));
    }

    pub fn on_disconnect(&mut self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.on_disconnect.push(Box::new(handler));
    }

    /// Register the delivery sink. This is the one hook the rest of the
    /// crate treats as mandatory in practice, but nothing stops an
    /// application from registering several, or none at all and simply
    /// never looking at delivered mail.
    pub fn on_mail(&mut self, handler: impl Fn(Envelope) + Send + Sync + 'static) {
        self.on_mail.push(Box::new(handler));
    }

    pub fn on_mail_from(&mut self, handler: impl Fn(&str) -> VerbDecision + Send + Sync + 'static) {
        self.on_mail_from = Some(Box::new(handler));
    }

    pub fn on_rcpt_to(&mut self, handler: impl Fn(&str) -> VerbDecision + Send + Sync + 'static) {
        self.on_rcpt_to = Some(Box::new(handler));
    }

    pub(crate) fn fire_client(&self, conn: &mut Conn<IO>) {
        for h in &self.on_client {
            h(conn);
        }
    }

    pub(crate) fn fire_disconnect(&self, reason: &str) {
        for h in &self.on_disconnect {
            h(reason);
        }
    }

    pub(crate) fn fire_mail(&self, envelope: Envelope) {
        if let Some((last, rest)) = self.on_mail.split_last() {
            for h in rest {
                h(envelope.clone());
            }
            last(envelope);
        }
    }

    pub(crate) fn check_mail_from(&self, mailbox: &str) -> VerbDecision {
        match &self.on_mail_from {
            Some(h) => h(mailbox),
            None => VerbDecision::Accept,
        }
    }

    pub(crate) fn check_rcpt_to(&self, mailbox: &str) -> VerbDecision {
        match &self.on_rcpt_to {
            Some(h) => h(mailbox),
            None => VerbDecision::Accept,
        }
    }
}
