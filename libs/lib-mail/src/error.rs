use std::fmt;

/// Distinguishes the failure kinds a mailbox operation can produce so callers
/// can decide whether to retry, fail the account, or fail just the message.
#[derive(Debug)]
pub enum MailError {
    Connection(String),
    Authentication(String),
    Parse(String),
    Timeout(String),
    Protocol(String),
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailError::Connection(msg) => write!(f, "connection error: {msg}"),
            MailError::Authentication(msg) => write!(f, "authentication error: {msg}"),
            MailError::Parse(msg) => write!(f, "parse error: {msg}"),
            MailError::Timeout(msg) => write!(f, "timeout: {msg}"),
            MailError::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for MailError {}

impl From<async_native_tls::Error> for MailError {
    fn from(err: async_native_tls::Error) -> Self {
        MailError::Connection(err.to_string())
    }
}

impl From<std::io::Error> for MailError {
    fn from(err: std::io::Error) -> Self {
        MailError::Connection(err.to_string())
    }
}

pub type MailResult<T> = Result<T, MailError>;
