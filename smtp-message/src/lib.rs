//! Line-oriented parser and builder for the subset of RFC 5321 command and
//! reply lines that `smtp-server` and `smtp-client` need to speak to each
//! other and to the outside world.
//!
//! This crate knows nothing about sockets, timeouts or state machines: it
//! turns bytes into [`Command`]s and [`Reply`]s and back, and extracts a
//! single mailbox out of the handful of address forms RFC 5321 actually
//! allows on a `MAIL FROM:`/`RCPT TO:` line.

mod command;
mod email;
mod error;
mod framing;
mod reply;

pub use command::Command;
pub use email::Email;
pub use error::ParseError;
pub use framing::{find_crlf, stuff_line, unstuff_line, DATA_TERMINATOR};
pub use reply::{Reply, ReplyCode};
