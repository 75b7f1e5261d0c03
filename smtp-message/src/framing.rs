//! CRLF line framing and DATA-mode dot (un)stuffing.
//!
//! SMTP is a line-oriented protocol: every command, every reply line and
//! every line of a message body is terminated by a CRLF pair, and the
//! message body itself is terminated by a line containing only a single
//! `.`. A body line that would otherwise read as only `.`, or that starts
//! with one, is "stuffed" with a leading extra dot by the sender and
//! un-stuffed by the receiver — see RFC 5321 §4.5.2.

/// A line consisting of exactly a single dot marks the end of a `DATA` body.
pub const DATA_TERMINATOR: &[u8] = b".";

/// Find the first CRLF in `buf`, returning the index of the `\r`.
///
/// Used by the line-framed readers in `smtp-server` and `smtp-client` to
/// decide how much of a read buffer constitutes one complete line. A bare
/// `\n` is not treated as a line terminator: SMTP requires CRLF.
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Undo dot-stuffing on a single DATA-mode line.
///
/// Any line beginning with `..` loses exactly one leading dot; every other
/// line is returned unchanged. This must only be applied to lines that are
/// not themselves the terminating `.` line.
pub fn unstuff_line(line: &[u8]) -> &[u8] {
    if line.starts_with(b"..") {
        &line[1..]
    } else {
        line
    }
}

/// Apply dot-stuffing to a single outgoing body line, for callers of
/// `smtp-client` that would rather not reimplement RFC 5321 §4.5.2
/// themselves. `smtp-client` itself never calls this: per the wire
/// protocol contract, dot-stuffing the body is the caller's responsibility.
pub fn stuff_line(line: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    if line.starts_with(b".") {
        let mut stuffed = Vec::with_capacity(line.len() + 1);
        stuffed.push(b'.');
        stuffed.extend_from_slice(line);
        std::borrow::Cow::Owned(stuffed)
    } else {
        std::borrow::Cow::Borrowed(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_crlf() {
        assert_eq!(find_crlf(b"MAIL FROM:<a@b>\r\nRCPT"), Some(15));
        assert_eq!(find_crlf(b"no newline here"), None);
        assert_eq!(find_crlf(b"lone \n is not enough\r\n"), Some(20));
    }

    #[test]
    fn unstuffs_leading_dot() {
        assert_eq!(unstuff_line(b"..foo"), b".foo");
        assert_eq!(unstuff_line(b".foo"), b".foo");
        assert_eq!(unstuff_line(b"foo"), b"foo");
        assert_eq!(unstuff_line(b".."), b".");
    }

    #[test]
    fn stuffs_leading_dot() {
        assert_eq!(&*stuff_line(b".foo"), b"..foo");
        assert_eq!(&*stuff_line(b"foo"), b"foo");
        assert_eq!(&*stuff_line(b"."), b"..");
    }

    #[quickcheck_macros::quickcheck]
    fn stuff_then_unstuff_is_identity(line: Vec<u8>) -> bool {
        unstuff_line(&stuff_line(&line)) == &line[..]
    }
}
