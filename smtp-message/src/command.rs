use crate::{email::Email, error::ParseError};

/// One SMTP command line, already split into verb and arguments.
///
/// [`Command::parse`] implements the whitespace-splitting, uppercase-verb
/// grammar this library's server side actually needs, rather than a full
/// RFC 5321 ABNF grammar: split on whitespace, uppercase the verb, and for
/// `MAIL`/`RCPT` additionally require the `FROM:`/`TO:` keyword and exactly
/// one parseable mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo { domain: String },
    Ehlo { domain: String },
    Mail { mailbox: Option<Email> },
    Rcpt { mailbox: Email },
    Data,
    Rset,
    Noop,
    Help { subject: String },
    Expn { name: String },
    Vrfy { name: String },
    Quit,
}

impl Command {
    /// Parse a single command line, with or without its trailing CRLF.
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        let mut parts = line.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or("").to_ascii_uppercase();
        let rest = parts.next().unwrap_or("").trim();

        match verb.as_str() {
            "HELO" => Ok(Command::Helo {
                domain: rest.to_owned(),
            }),
            "EHLO" => Ok(Command::Ehlo {
                domain: rest.to_owned(),
            }),
            "MAIL" => Ok(Command::Mail {
                mailbox: parse_path_argument(rest, "FROM:")?,
            }),
            "RCPT" => Ok(Command::Rcpt {
                mailbox: parse_path_argument(rest, "TO:")?
                    .ok_or_else(|| ParseError::BadMailbox(rest.to_owned()))?,
            }),
            "DATA" => Ok(Command::Data),
            "RSET" => Ok(Command::Rset),
            "NOOP" => Ok(Command::Noop),
            "HELP" => Ok(Command::Help {
                subject: rest.to_owned(),
            }),
            "EXPN" => Ok(Command::Expn {
                name: rest.to_owned(),
            }),
            "VRFY" => Ok(Command::Vrfy {
                name: rest.to_owned(),
            }),
            "QUIT" => Ok(Command::Quit),
            _ => Err(ParseError::UnknownVerb),
        }
    }
}

/// Parse the `FROM:<addr>` / `TO:<addr>` argument of MAIL/RCPT.
///
/// Returns `Ok(None)` only for `MAIL FROM:<>`, the null reverse-path used
/// by bounce messages; every other empty or malformed argument is an
/// error.
fn parse_path_argument(rest: &str, keyword: &str) -> Result<Option<Email>, ParseError> {
    let rest = rest.trim_start();
    let found_len = rest.len().min(keyword.len());
    if !rest[..found_len].eq_ignore_ascii_case(keyword) {
        return Err(ParseError::BadKeyword {
            expected: if keyword == "FROM:" { "FROM" } else { "TO" },
            found: rest.to_owned(),
        });
    }
    let addr = rest[keyword.len()..].trim();
    if keyword == "FROM:" && addr == "<>" {
        // The null reverse-path, used by bounce messages.
        return Ok(None);
    }
    if addr.is_empty() {
        return Err(ParseError::BadMailbox(addr.to_owned()));
    }
    Email::parse(addr).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_helo_and_ehlo() {
        assert_eq!(
            Command::parse("HELO foo.bar\r\n").unwrap(),
            Command::Helo {
                domain: "foo.bar".into()
            }
        );
        assert_eq!(
            Command::parse("ehlo baz.quux").unwrap(),
            Command::Ehlo {
                domain: "baz.quux".into()
            }
        );
    }

    #[test]
    fn parses_mail_from_with_and_without_brackets() {
        let a = Command::parse("MAIL FROM:<a@b>").unwrap();
        assert_eq!(
            a,
            Command::Mail {
                mailbox: Some(Email::new("a", "b"))
            }
        );
        let b = Command::parse("MAIL FROM: plain@addr").unwrap();
        assert_eq!(
            b,
            Command::Mail {
                mailbox: Some(Email::new("plain", "addr"))
            }
        );
    }

    #[test]
    fn parses_null_reverse_path() {
        assert_eq!(
            Command::parse("MAIL FROM:<>").unwrap(),
            Command::Mail { mailbox: None }
        );
    }

    #[test]
    fn rejects_mail_without_keyword() {
        assert!(Command::parse("MAIL <a@b>").is_err());
    }

    #[test]
    fn rejects_mail_with_empty_argument() {
        assert!(Command::parse("MAIL FROM:").is_err());
    }

    #[test]
    fn parses_rcpt_to() {
        assert_eq!(
            Command::parse("RCPT TO:<c@d>").unwrap(),
            Command::Rcpt {
                mailbox: Email::new("c", "d")
            }
        );
    }

    #[test]
    fn rejects_rcpt_without_mailbox() {
        assert!(Command::parse("RCPT TO:<>").is_err());
        assert!(Command::parse("RCPT TO:").is_err());
    }

    #[test]
    fn parses_bare_verbs() {
        assert_eq!(Command::parse("DATA").unwrap(), Command::Data);
        assert_eq!(Command::parse("QUIT\r\n").unwrap(), Command::Quit);
        assert_eq!(Command::parse("rset").unwrap(), Command::Rset);
        assert_eq!(Command::parse("NOOP").unwrap(), Command::Noop);
    }

    #[test]
    fn rejects_unknown_verb() {
        assert_eq!(Command::parse("FOO bar").unwrap_err(), ParseError::UnknownVerb);
    }
}
