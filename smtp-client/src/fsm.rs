use futures::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use smtp_message::{Email, ReplyCode};

use crate::conn::ClientConn;

/// Drives one client-side SMTP dialogue — greeting → HELO → MAIL → RCPT* →
/// DATA → body → `.` → QUIT — against a single already-connected peer, for
/// every recipient sharing that peer.
///
/// Per-recipient results are independent after the `MAIL` stage: a `RCPT`
/// rejection is recorded against that one mailbox and does not abort the
/// others, unless *every* `RCPT` in the group fails, in which case the
/// whole session (including `DATA`) is skipped and every recipient is
/// reported with the first `RCPT` error.
///
/// `debug`, the client-side counterpart to the server's debug flag, turns
/// on a `tracing::debug!` line for every command sent and reply received
/// in this session, on top of the `trace!`-level wire logging `ClientConn`
/// already does unconditionally — the same "extra diagnostic detail,
/// opt-in per call" shape as the server's debug-mode reply suffix.
#[allow(clippy::too_many_arguments)]
pub async fn run<IO>(
    conn: &mut ClientConn<IO>,
    helo: &str,
    from: &Email,
    recipients: &[Email],
    data: &[u8],
    debug: bool,
) -> Vec<(Email, Result<String, String>)>
where
    IO: Unpin + Send + AsyncRead + AsyncWrite,
{
    if let Err(e) = expect_code(conn, ReplyCode::SERVICE_READY, debug).await {
        return all_fail(recipients, e);
    }

    if let Err(e) = send_and_expect(conn, &format!("HELO {}", helo), ReplyCode::OKAY, debug).await
    {
        return all_fail(recipients, e);
    }

    if let Err(e) = send_and_expect(
        conn,
        &format!("MAIL FROM:<{}>", from),
        ReplyCode::OKAY,
        debug,
    )
    .await
    {
        return all_fail(recipients, e);
    }

    let mut outcomes: Vec<(Email, Result<String, String>)> = Vec::with_capacity(recipients.len());
    let mut first_rcpt_err: Option<String> = None;
    for rcpt in recipients {
        let result =
            send_and_expect(conn, &format!("RCPT TO:<{}>", rcpt), ReplyCode::OKAY, debug).await;
        if let Err(ref e) = result {
            first_rcpt_err.get_or_insert_with(|| e.clone());
        }
        outcomes.push((rcpt.clone(), result));
    }

    let any_accepted = outcomes.iter().any(|(_, r)| r.is_ok());
    if !any_accepted {
        // Every RCPT failed: abort before DATA, all recipients share the
        // first rejection.
        let err = first_rcpt_err.expect("at least one recipient when no RCPT succeeded");
        return recipients
            .iter()
            .cloned()
            .map(|r| (r, Err(err.clone())))
            .collect();
    }

    if let Err(e) = send_and_expect(conn, "DATA", ReplyCode::START_MAIL_INPUT, debug).await {
        return apply_session_result(outcomes, Err(e));
    }

    if let Err(e) = conn.write_raw(data).await {
        return apply_session_result(outcomes, Err(e.to_string()));
    }
    if debug {
        debug!(bytes = data.len(), "wrote DATA body");
    }

    let final_reply = send_and_expect(conn, ".", ReplyCode::OKAY, debug).await;
    let outcomes = apply_session_result(outcomes, final_reply);

    // QUIT is best-effort: its reply is not required for success (the
    // step 8).
    let _ = conn.write_line("QUIT").await;
    if debug {
        debug!("sent QUIT");
    }

    outcomes
}

/// Apply a shared session-level result (a `DATA` failure, or the final `.`
/// reply) to every recipient that had an accepted `RCPT`, leaving
/// recipients that already failed at `RCPT` with their own error.
fn apply_session_result(
    outcomes: Vec<(Email, Result<String, String>)>,
    session_result: Result<String, String>,
) -> Vec<(Email, Result<String, String>)> {
    outcomes
        .into_iter()
        .map(|(rcpt, result)| match result {
            Ok(_) => (rcpt, session_result.clone()),
            Err(e) => (rcpt, Err(e)),
        })
        .collect()
}

fn all_fail(recipients: &[Email], msg: String) -> Vec<(Email, Result<String, String>)> {
    recipients
        .iter()
        .cloned()
        .map(|r| (r, Err(msg.clone())))
        .collect()
}

async fn expect_code<IO>(
    conn: &mut ClientConn<IO>,
    want: ReplyCode,
    debug: bool,
) -> Result<String, String>
where
    IO: Unpin + Send + AsyncRead + AsyncWrite,
{
    let reply = conn.read_reply().await;
    if debug {
        match &reply {
            Ok(r) => debug!(code = %r.code, text = %r.text(), "received reply"),
            Err(e) => debug!(error = %e, "failed to read reply"),
        }
    }
    match reply {
        Ok(r) if r.code == want => Ok(r.text()),
        Ok(r) => Err(r.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

async fn send_and_expect<IO>(
    conn: &mut ClientConn<IO>,
    line: &str,
    want: ReplyCode,
    debug: bool,
) -> Result<String, String>
where
    IO: Unpin + Send + AsyncRead + AsyncWrite,
{
    if debug {
        debug!(line, "sending command");
    }
    if let Err(e) = conn.write_line(line).await {
        return Err(e.to_string());
    }
    expect_code(conn, want, debug).await
}
