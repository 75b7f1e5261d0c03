use std::panic::{self, AssertUnwindSafe};

use smtp_message::{Command, Reply, ReplyCode};
use tracing::{instrument, trace, warn};

use crate::{
    conn::Conn,
    envelope::Transaction,
    error::{ConnError, HandlerError},
    events::{Hooks, VerbDecision},
};

/// The per-connection state set.
///
/// `InData` only exists for the duration of a single `handle_line` call —
/// by the time control returns to the command loop the transaction has
/// either completed (back to `Idle`) or the connection has been killed for
/// an oversize body, so the command loop itself never observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Greeted,
    Idle,
    HaveFrom,
    HaveRcpt,
    InData,
    Closed,
}

/// Run a synchronous hook and turn a panic into a [`HandlerError`] instead
/// of unwinding across the connection task: the session stays open and the
/// peer gets `500 INTERNAL ERROR` instead of the task dying silently.
fn catch<T>(f: impl FnOnce() -> T) -> Result<T, HandlerError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_owned());
        HandlerError::new(msg)
    })
}

/// The server-side SMTP dialogue for a single connection: command
/// parsing, the state transition table, and envelope assembly. Knows
/// nothing about sockets (that's [`Conn`]) or how many connections are
/// live (that's [`crate::Listener`]).
pub struct ServerFsm {
    state: State,
    txn: Transaction,
    hostname: String,
    debug: bool,
}

impl ServerFsm {
    pub fn new(hostname: impl Into<String>, debug: bool) -> ServerFsm {
        ServerFsm {
            state: State::Greeted,
            txn: Transaction::default(),
            hostname: hostname.into(),
            debug,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Write the `220` greeting and fire `client`, on accepting a new
    /// connection.
    pub async fn greet<IO>(&mut self, conn: &mut Conn<IO>, hooks: &Hooks<IO>) -> Result<(), ConnError>
    where
        IO: Unpin + Send + futures::io::AsyncRead + futures::io::AsyncWrite,
    {
        conn.reply(&Reply::new(
            ReplyCode::SERVICE_READY,
            format!("{} Ready.", self.hostname),
        ))
        .await?;
        hooks.fire_client(conn);
        Ok(())
    }

    fn handler_exception_reply(&self, err: &HandlerError) -> Reply {
        let text = if self.debug {
            format!("INTERNAL ERROR: {}", err)
        } else {
            "INTERNAL ERROR".to_owned()
        };
        Reply::new(ReplyCode::COMMAND_UNRECOGNIZED, text)
    }

    /// Read, parse, and act on one command line. On return the reply for
    /// that command (and, for a successful `DATA`, the whole body and the
    /// `mail` dispatch) has been fully written.
    #[instrument(level = "trace", skip(self, conn, hooks, line))]
    pub async fn handle_line<IO>(
        &mut self,
        conn: &mut Conn<IO>,
        hooks: &Hooks<IO>,
        line: &str,
    ) -> Result<(), ConnError>
    where
        IO: Unpin + Send + futures::io::AsyncRead + futures::io::AsyncWrite,
    {
        trace!(%line, "handling command line");
        let verb = line
            .trim()
            .splitn(2, char::is_whitespace)
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(_) if verb == "MAIL" => {
                return conn
                    .reply(&Reply::new(
                        ReplyCode::SYNTAX_ERROR,
                        "Usage: MAIL FROM: mail addr",
                    ))
                    .await;
            }
            Err(_) if verb == "RCPT" => {
                return conn
                    .reply(&Reply::new(
                        ReplyCode::SYNTAX_ERROR,
                        "Usage: RCPT TO: mail addr",
                    ))
                    .await;
            }
            Err(_) => {
                return conn
                    .reply(&Reply::new(ReplyCode::COMMAND_UNRECOGNIZED, "Learn to type!"))
                    .await;
            }
        };

        self.dispatch(conn, hooks, cmd).await
    }

    async fn reply_bad_sequence<IO>(&self, conn: &mut Conn<IO>, msg: &str) -> Result<(), ConnError>
    where
        IO: Unpin + Send + futures::io::AsyncRead + futures::io::AsyncWrite,
    {
        conn.reply(&Reply::new(ReplyCode::BAD_SEQUENCE, msg)).await
    }

    async fn dispatch<IO>(
        &mut self,
        conn: &mut Conn<IO>,
        hooks: &Hooks<IO>,
        cmd: Command,
    ) -> Result<(), ConnError>
    where
        IO: Unpin + Send + futures::io::AsyncRead + futures::io::AsyncWrite,
    {
        match cmd {
            Command::Helo { domain } | Command::Ehlo { domain } => {
                self.txn.greet(domain);
                self.state = State::Idle;
                conn.ok(Some("Go on.")).await
            }

            Command::Mail { mailbox } => match self.state {
                State::Idle => {
                    let text = mailbox.map(|e| e.to_string()).unwrap_or_default();
                    match catch(|| hooks.check_mail_from(&text)) {
                        Ok(VerbDecision::Accept) => {
                            self.txn.set_from(text);
                            self.state = State::HaveFrom;
                            conn.ok(None).await
                        }
                        Ok(VerbDecision::Reject(reply)) => conn.reply(&reply).await,
                        Err(e) => {
                            warn!(error = %e, "MAIL FROM handler panicked");
                            conn.reply(&self.handler_exception_reply(&e)).await
                        }
                    }
                }
                State::Greeted => {
                    self.reply_bad_sequence(conn, "Error: send HELO/EHLO first")
                        .await
                }
                State::HaveFrom | State::HaveRcpt => {
                    self.reply_bad_sequence(conn, "Error: nested MAIL command")
                        .await
                }
                State::InData | State::Closed => unreachable!("not reachable from the command loop"),
            },

            Command::Rcpt { mailbox } => match self.state {
                State::HaveFrom | State::HaveRcpt => {
                    let text = mailbox.to_string();
                    match catch(|| hooks.check_rcpt_to(&text)) {
                        Ok(VerbDecision::Accept) => {
                            self.txn.push_rcpt(text);
                            self.state = State::HaveRcpt;
                            conn.ok(None).await
                        }
                        Ok(VerbDecision::Reject(reply)) => conn.reply(&reply).await,
                        Err(e) => {
                            warn!(error = %e, "RCPT TO handler panicked");
                            conn.reply(&self.handler_exception_reply(&e)).await
                        }
                    }
                }
                State::Idle => {
                    self.reply_bad_sequence(conn, "Error: need MAIL command")
                        .await
                }
                State::Greeted => {
                    self.reply_bad_sequence(conn, "Error: send HELO/EHLO first")
                        .await
                }
                State::InData | State::Closed => unreachable!("not reachable from the command loop"),
            },

            Command::Data => match self.state {
                State::HaveRcpt => {
                    conn.reply(&Reply::new(
                        ReplyCode::START_MAIL_INPUT,
                        "End data with <CR><LF>.<CR><LF>",
                    ))
                    .await?;
                    self.state = State::InData;
                    let body = match conn.read_data_body().await {
                        Ok(body) => body,
                        Err(ConnError::DataTooLarge) => {
                            conn.reply(&Reply::new(
                                ReplyCode::EXCEEDED_STORAGE,
                                "Too much mail data",
                            ))
                            .await?;
                            conn.close().await?;
                            self.state = State::Closed;
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    };
                    let envelope = self.txn.take_envelope(body);
                    self.state = State::Idle;
                    match catch(|| hooks.fire_mail(envelope)) {
                        Ok(()) => conn.ok(Some("I'll take it")).await,
                        Err(e) => {
                            warn!(error = %e, "mail handler panicked");
                            conn.reply(&self.handler_exception_reply(&e)).await
                        }
                    }
                }
                State::HaveFrom => {
                    conn.reply(&Reply::new(
                        ReplyCode::TRANSACTION_FAILED,
                        "Error: need RCPT command",
                    ))
                    .await
                }
                State::Idle => {
                    self.reply_bad_sequence(conn, "Error: need MAIL command")
                        .await
                }
                State::Greeted => {
                    self.reply_bad_sequence(conn, "Error: send HELO/EHLO first")
                        .await
                }
                State::InData | State::Closed => unreachable!("not reachable from the command loop"),
            },

            Command::Rset => {
                self.txn.reset();
                self.state = State::Idle;
                conn.ok(None).await
            }

            Command::Noop => {
                conn.reply(&Reply::new(ReplyCode::CANNOT_VRFY_BUT_PLEASE_TRY, "Ok."))
                    .await
            }

            Command::Help { .. } => {
                conn.reply(&Reply::new(ReplyCode::custom(214), "No help available."))
                    .await
            }

            Command::Expn { .. } | Command::Vrfy { .. } => {
                conn.reply(&Reply::new(
                    ReplyCode::CANNOT_VRFY_BUT_PLEASE_TRY,
                    "Nice try.",
                ))
                .await
            }

            Command::Quit => {
                conn.reply(&Reply::new(ReplyCode::CLOSING_CHANNEL, "Bye.")).await?;
                conn.close().await?;
                self.state = State::Closed;
                Ok(())
            }
        }
    }
}
