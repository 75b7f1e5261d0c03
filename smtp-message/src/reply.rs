use std::fmt;

use crate::error::ParseError;

/// A three-digit SMTP reply code (RFC 5321 §4.2).
///
/// Only the codes this library's server and client sides actually emit or
/// expect are named as constants; any other code can still be built with
/// [`ReplyCode::custom`] so a handler can return an arbitrary extended
/// reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyCode(u16);

impl ReplyCode {
    pub const SERVICE_READY: ReplyCode = ReplyCode(220);
    pub const CLOSING_CHANNEL: ReplyCode = ReplyCode(221);
    pub const OKAY: ReplyCode = ReplyCode(250);
    pub const CANNOT_VRFY_BUT_PLEASE_TRY: ReplyCode = ReplyCode(252);
    pub const START_MAIL_INPUT: ReplyCode = ReplyCode(354);
    pub const COMMAND_UNRECOGNIZED: ReplyCode = ReplyCode(500);
    pub const SYNTAX_ERROR: ReplyCode = ReplyCode(501);
    pub const BAD_SEQUENCE: ReplyCode = ReplyCode(503);
    pub const EXCEEDED_STORAGE: ReplyCode = ReplyCode(552);
    pub const TRANSACTION_FAILED: ReplyCode = ReplyCode(554);

    pub fn custom(code: u16) -> ReplyCode {
        assert!(code < 1000, "SMTP reply codes are three digits");
        ReplyCode(code)
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Whether this code is in the 2xx/3xx "positive" range.
    pub fn is_positive(self) -> bool {
        self.0 < 400
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// A (possibly multi-line) SMTP reply.
///
/// On the wire, a reply is one or more lines sharing the same status code:
/// every line but the last uses `NNN-text`, the last uses `NNN text`. A
/// single-line reply is just the degenerate case of one "last" line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn new(code: ReplyCode, text: impl Into<String>) -> Reply {
        Reply {
            code,
            lines: vec![text.into()],
        }
    }

    /// The concatenation of every line's text, `\r\n`-joined — what a
    /// delivery sink or a caller checking an error message actually wants
    /// to look at, as opposed to the individual wire lines.
    pub fn text(&self) -> String {
        self.lines.join("\r\n")
    }

    /// Render as the exact bytes this reply occupies on the wire,
    /// including the trailing CRLF of the last line.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let (last, rest) = self.lines.split_last().expect("a Reply always has a line");
        for line in rest {
            out.extend_from_slice(format!("{}-{}\r\n", self.code, line).as_bytes());
        }
        out.extend_from_slice(format!("{} {}\r\n", self.code, last).as_bytes());
        out
    }

    /// Parse one complete reply out of a buffer of whole CRLF-terminated
    /// lines (as produced by the line reader in `smtp-client`). Every line
    /// but the last must start with `NNN-`; the last must start with
    /// `NNN `, and all codes must agree.
    pub fn parse(lines: &[&str]) -> Result<Reply, ParseError> {
        let mut code = None;
        let mut text = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            let is_last = i + 1 == lines.len();
            let (this_code, sep, rest) = split_reply_line(line)?;
            match code {
                None => code = Some(this_code),
                Some(c) if c == this_code => (),
                Some(c) => return Err(ParseError::MismatchedReplyCode(this_code.get(), c.get())),
            }
            if is_last {
                if sep != ' ' {
                    return Err(ParseError::BadReplySeparator);
                }
            } else if sep != '-' {
                return Err(ParseError::BadReplySeparator);
            }
            text.push(rest.to_owned());
        }
        Ok(Reply {
            code: code.ok_or(ParseError::BadReplyCode)?,
            lines: text,
        })
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

fn split_reply_line(line: &str) -> Result<(ReplyCode, char, &str), ParseError> {
    if line.len() < 3 || !line.as_bytes()[..3].iter().all(u8::is_ascii_digit) {
        return Err(ParseError::BadReplyCode);
    }
    let code: u16 = line[..3].parse().map_err(|_| ParseError::BadReplyCode)?;
    let sep = line[3..].chars().next().unwrap_or(' ');
    let rest = if line.len() > 3 { &line[4..] } else { "" };
    Ok((ReplyCode::custom(code), sep, rest))
}
