use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt},
    sequence::{delimited, preceded},
    IResult,
};

use crate::error::ParseError;

/// A single mailbox, as extracted from a `MAIL FROM:`/`RCPT TO:` argument.
///
/// Per the library's scope, this is *extraction*, not RFC-5322 validation:
/// callers that need to reject malformed local-parts or domains should do
/// so themselves. [`Email::parse`] accepts the forms actually seen on the
/// wire: `<local@domain>`, bare `local@domain`, and the obsolete
/// source-routed form `<@a,@b:local@domain>` (the route is discarded, as
/// neither postfix nor any other modern MTA honors it either).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email {
    local: String,
    domain: String,
}

impl Email {
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Email {
        Email {
            local: local.into(),
            domain: domain.into(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Parse a single mailbox out of a `MAIL FROM:`/`RCPT TO:` argument.
    ///
    /// `MAIL FROM:<>` (the null reverse-path) is rejected here: callers
    /// that need to allow it (bounce messages) check for an empty argument
    /// before calling `parse`.
    pub fn parse(arg: &str) -> Result<Email, ParseError> {
        let arg = arg.trim();
        match all_consuming(mailbox)(arg) {
            Ok((_, email)) => Ok(email),
            Err(_) => Err(ParseError::BadMailbox(arg.to_owned())),
        }
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

fn addr_spec(input: &str) -> IResult<&str, Email> {
    let (input, local) = take_while1(|c: char| c != '@')(input)?;
    let (input, _) = char('@')(input)?;
    let (input, domain) = take_while1(|c: char| c != '>')(input)?;
    Ok((input, Email::new(local, domain)))
}

fn source_route(input: &str) -> IResult<&str, ()> {
    let (input, _) = take_until(":")(input)?;
    let (input, _) = tag(":")(input)?;
    Ok((input, ()))
}

fn bracketed(input: &str) -> IResult<&str, Email> {
    delimited(
        char('<'),
        preceded(opt(source_route), addr_spec),
        char('>'),
    )(input)
}

fn mailbox(input: &str) -> IResult<&str, Email> {
    alt((bracketed, addr_spec))(input)
}
