use std::io;
use std::time::Duration;

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use smtp_message::{find_crlf, unstuff_line, Reply, ReplyCode};
use tracing::trace;

use crate::error::ConnError;

/// Race `fut` against an optional inactivity timeout, mapping a plain I/O
/// error to [`ConnError::Read`]. Takes `timeout` by value rather than
/// borrowing `Conn` so the caller can hold a mutable borrow of `self.io`
/// across the await.
async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = io::Result<T>>,
) -> Result<T, ConnError> {
    match timeout {
        None => fut.await.map_err(ConnError::Read),
        Some(d) => {
            smol::future::or(
                async { fut.await.map_err(ConnError::Read) },
                async {
                    smol::Timer::after(d).await;
                    Err(ConnError::Timeout)
                },
            )
            .await
        }
    }
}

/// Maximum number of bytes a `DATA` body may occupy before the connection
/// is killed with a `552`. RFC 5321 does not mandate a specific limit;
/// this one is generous enough for ordinary mail and small enough to bound
/// memory use per connection.
pub const MAX_DATA_BYTES: usize = 32 * 1024 * 1024;

/// How much unread bytes to pull off the socket at a time.
const READ_CHUNK: usize = 8 * 1024;

/// A single TCP session, framed into CRLF-terminated lines.
///
/// `Conn` owns the socket and an internal read buffer; it knows how to
/// read one command line, read and unstuff a whole `DATA` body, and write
/// reply lines, all with an optional per-connection inactivity timeout.
/// It knows nothing about the SMTP verb grammar or state machine — that
/// lives in [`crate::ServerFsm`].
pub struct Conn<IO> {
    io: IO,
    buf: Vec<u8>,
    timeout: Option<Duration>,
    closed: bool,
}

impl<IO> Conn<IO>
where
    IO: Unpin + Send + AsyncRead + AsyncWrite,
{
    pub fn new(io: IO, timeout: Option<Duration>) -> Conn<IO> {
        Conn {
            io,
            buf: Vec::new(),
            timeout,
            closed: false,
        }
    }

    /// Read and return one complete CRLF-terminated command line, with the
    /// terminator and surrounding whitespace stripped. Returns `Ok(None)`
    /// on a clean peer-initiated close with no partial line pending.
    pub async fn read_command(&mut self) -> Result<Option<String>, ConnError> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.drain(..pos + 2).collect::<Vec<u8>>();
                let line = &line[..line.len() - 2];
                let text = String::from_utf8_lossy(line).trim().to_string();
                return Ok(Some(text));
            }
            if !self.fill().await? {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ConnError::UnexpectedEof);
            }
        }
    }

    /// Read a complete `DATA` body: lines up to and including the
    /// terminating lone `.` line, which is consumed but not returned.
    /// Dot-unstuffing is applied to every other line. The returned bytes
    /// preserve the CRLF between lines and have no trailing dot-line.
    pub async fn read_data_body(&mut self) -> Result<Vec<u8>, ConnError> {
        let mut body = Vec::new();
        loop {
            match find_crlf(&self.buf) {
                Some(pos) => {
                    let line: Vec<u8> = self.buf.drain(..pos + 2).collect();
                    let line_no_crlf = &line[..line.len() - 2];
                    if line_no_crlf == smtp_message::DATA_TERMINATOR {
                        return Ok(body);
                    }
                    body.extend_from_slice(unstuff_line(line_no_crlf));
                    body.extend_from_slice(b"\r\n");
                    if body.len() > MAX_DATA_BYTES {
                        return Err(ConnError::DataTooLarge);
                    }
                }
                None => {
                    if !self.fill().await? {
                        return Err(ConnError::UnexpectedEof);
                    }
                }
            }
        }
    }

    /// Write a reply verbatim, CRLF-terminated. If `text` already contains
    /// CRLFs it is written as-is — used for the raw multi-line bytes
    /// between `DATA`'s `354` and the terminating `.`.
    pub async fn reply(&mut self, reply: &Reply) -> Result<(), ConnError> {
        self.write_all(&reply.to_wire()).await
    }

    /// `reply("250 " + (msg or "OK"))`.
    pub async fn ok(&mut self, msg: Option<&str>) -> Result<(), ConnError> {
        self.reply(&Reply::new(ReplyCode::OKAY, msg.unwrap_or("OK")))
            .await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ConnError> {
        trace!(bytes = %String::from_utf8_lossy(bytes), "writing to connection");
        let timeout = self.timeout;
        with_timeout(timeout, self.io.write_all(bytes))
            .await
            .map_err(|e| match e {
                ConnError::Read(io_err) => ConnError::Write(io_err),
                other => other,
            })
    }

    /// Read more bytes off the socket into the internal buffer. Returns
    /// `false` on a clean EOF (zero-byte read).
    async fn fill(&mut self) -> Result<bool, ConnError> {
        let mut chunk = [0u8; READ_CHUNK];
        let timeout = self.timeout;
        let n = with_timeout(timeout, self.io.read(&mut chunk)).await?;
        if n == 0 {
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    /// Flush pending writes on a best-effort basis and mark the connection
    /// closed. Idempotent: a second call is a no-op.
    pub async fn close(&mut self) -> Result<(), ConnError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _ = self.io.flush().await;
        let _ = self.io.close().await;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use duplexify::Duplex;
    use futures::{executor, io::Cursor};

    use super::*;

    fn test_conn(input: &[u8]) -> Conn<Duplex<Cursor<Vec<u8>>, Cursor<Vec<u8>>>> {
        let io = Duplex::new(Cursor::new(input.to_vec()), Cursor::new(Vec::new()));
        Conn::new(io, None)
    }

    #[test]
    fn reads_one_command_line_at_a_time() {
        let mut conn = test_conn(b"MAIL FROM:<a@b>\r\nRCPT TO:<c@d>\r\n");
        executor::block_on(async {
            assert_eq!(
                conn.read_command().await.unwrap(),
                Some("MAIL FROM:<a@b>".to_string())
            );
            assert_eq!(
                conn.read_command().await.unwrap(),
                Some("RCPT TO:<c@d>".to_string())
            );
            assert_eq!(conn.read_command().await.unwrap(), None);
        });
    }

    #[test]
    fn reads_and_unstuffs_data_body() {
        let mut conn = test_conn(b"hello\r\n..dotted\r\n.\r\n");
        executor::block_on(async {
            let body = conn.read_data_body().await.unwrap();
            assert_eq!(body, b"hello\r\n.dotted\r\n");
        });
    }

    #[test]
    fn errors_on_eof_mid_line() {
        let mut conn = test_conn(b"MAIL FROM");
        executor::block_on(async {
            assert!(matches!(
                conn.read_command().await,
                Err(ConnError::UnexpectedEof)
            ));
        });
    }

    #[test]
    fn close_is_idempotent() {
        let mut conn = test_conn(b"");
        executor::block_on(async {
            conn.close().await.unwrap();
            conn.close().await.unwrap();
            assert!(conn.is_closed());
        });
    }
}
