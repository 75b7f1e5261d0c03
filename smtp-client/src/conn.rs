use std::io;
use std::time::Duration;

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use smtp_message::{find_crlf, Reply};
use tracing::trace;

use crate::error::TransportError;

const READ_CHUNK: usize = 8 * 1024;

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = io::Result<T>>,
) -> Result<T, TransportError> {
    match timeout {
        None => fut.await.map_err(TransportError::Io),
        Some(d) => {
            smol::future::or(
                async { fut.await.map_err(TransportError::Io) },
                async {
                    smol::Timer::after(d).await;
                    Err(TransportError::Timeout)
                },
            )
            .await
        }
    }
}

/// The client side's line/reply I/O layer, the counterpart to
/// `smtp-server`'s `Conn` (the same CRLF framing rules apply, just
/// with the client reading replies and writing commands instead of the
/// reverse).
pub struct ClientConn<IO> {
    io: IO,
    buf: Vec<u8>,
    timeout: Option<Duration>,
}

impl<IO> ClientConn<IO>
where
    IO: Unpin + Send + AsyncRead + AsyncWrite,
{
    pub fn new(io: IO, timeout: Option<Duration>) -> ClientConn<IO> {
        ClientConn {
            io,
            buf: Vec::new(),
            timeout,
        }
    }

    async fn fill(&mut self) -> Result<bool, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        let timeout = self.timeout;
        let n = with_timeout(timeout, self.io.read(&mut chunk)).await?;
        if n == 0 {
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line: Vec<u8> = self.buf.drain(..pos + 2).collect();
                let text = String::from_utf8_lossy(&line[..line.len() - 2]).into_owned();
                return Ok(text);
            }
            if !self.fill().await? {
                return Err(TransportError::UnexpectedEof);
            }
        }
    }

    /// Read one complete (possibly multi-line) reply, accumulating `NNN-`
    /// continuation lines until the terminal `NNN ` line arrives.
    pub async fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let is_last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line);
            if is_last {
                break;
            }
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        Reply::parse(&refs).map_err(|e| TransportError::MalformedReply(e.to_string()))
    }

    /// Write one command line, appending the CRLF terminator.
    pub async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        trace!(line, "sending command");
        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        self.write_raw(&bytes).await
    }

    /// Write bytes verbatim — used for the raw `DATA` body, which the
    /// caller has already dot-stuffed it.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let timeout = self.timeout;
        with_timeout(timeout, self.io.write_all(bytes))
            .await
            .map_err(|e| match e {
                TransportError::Io(io_err) => TransportError::WriteIo(io_err),
                other => other,
            })
    }
}
