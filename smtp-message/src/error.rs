/// Something went wrong while turning a line of wire bytes into a
/// [`Command`](crate::Command), [`Reply`](crate::Reply) or
/// [`Email`](crate::Email).
///
/// `ParseError` never carries the original allocation it was built from
/// past its own lifetime: callers that need the raw line for a `501`/`500`
/// reply already have it, since parsing is always driven off a line they
/// still own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognized command verb")]
    UnknownVerb,

    #[error("command line is not valid UTF-8")]
    NotUtf8,

    #[error("expected `{expected}:`, found `{found}`")]
    BadKeyword { expected: &'static str, found: String },

    #[error("could not parse a mailbox out of `{0}`")]
    BadMailbox(String),

    #[error("reply line does not start with a 3-digit status code")]
    BadReplyCode,

    #[error("reply line is missing its separator (`-` or ` `) after the status code")]
    BadReplySeparator,

    #[error("continuation line's status code `{0}` does not match the reply in progress (`{1}`)")]
    MismatchedReplyCode(u16, u16),
}
