//! Asynchronous SMTP server core.
//!
//! This crate drives accepted TCP connections through the SMTP
//! command/response state machine described by RFC 5321 §3-4 (the subset
//! of verbs `{HELO, EHLO, MAIL, RCPT, QUIT, DATA, EXPN, VRFY, NOOP, HELP,
//! RSET}`), assembles complete messages, and hands them to an
//! application-registered `mail` hook. It does not do TLS, AUTH, address
//! normalization beyond extracting a mailbox, or persistent queuing — those
//! are left to the application.
//!
//! [`Conn`] is the line-framed I/O layer, [`ServerFsm`] is the protocol
//! state machine, [`Listener`] owns the listening socket and the live
//! connection set, and [`Hooks`] is the extensibility surface an
//! application registers against.

mod conn;
mod envelope;
mod error;
mod events;
mod fsm;
mod listener;

pub use conn::{Conn, MAX_DATA_BYTES};
pub use envelope::Envelope;
pub use error::{ConnError, HandlerError};
pub use events::{Hooks, VerbDecision};
pub use fsm::ServerFsm;
pub use listener::Listener;

/// Construct a [`Listener`], register `mail_handler` as the sole `mail`
/// hook, and start it — a one-shot facade for the common case
/// of an application that just wants delivered mail and nothing else out
/// of the extensibility surface. Returns the running [`Listener`]; holding
/// onto it (or calling [`Listener::stop`]) is the caller's job, since
/// dropping it would otherwise be indistinguishable from an intentional
/// shutdown.
pub async fn serve_with<F>(
    host: Option<String>,
    port: u16,
    hostname: impl Into<String>,
    mail_handler: F,
) -> std::io::Result<Listener>
where
    F: Fn(Envelope) + Send + Sync + 'static,
{
    let mut listener = Listener::new(host, port, hostname, false);
    listener.hooks().on_mail(mail_handler);
    listener.start().await?;
    Ok(listener)
}
