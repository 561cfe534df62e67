use std::error;
use std::fmt;

/// Coarse classification of an [`Error`], for callers that only need to
/// decide between fixing config, fixing input, or retrying later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    MalformedAddress,
    ProviderRejected,
    Transport,
    Serialization,
    Mime,
}

/// All possible delivery errors.
/// Each variant carries enough detail for the caller to log or alert on.
#[derive(Clone, Debug)]
pub enum Error {
    /// Missing API key, bad host, unreadable config file
    Configuration(String),
    /// An address that resolves to an empty email
    MalformedAddress(String),
    /// SendGrid answered with a status >= 400
    ProviderRejected { status: u16, body: String },
    /// Connection, TLS or timeout failure
    Transport(String),
    Serialization(String),
    Mime(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::MalformedAddress(_) => ErrorKind::MalformedAddress,
            Error::ProviderRejected { .. } => ErrorKind::ProviderRejected,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Mime(_) => ErrorKind::Mime,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Configuration(ref msg) => write!(f, "Configuration: {}", msg),
            Error::MalformedAddress(ref addr) => write!(f, "MalformedAddress: {:?}", addr),
            Error::ProviderRejected { status, ref body } => {
                write!(f, "SendGrid API error: {} - {}", status, body)
            }
            Error::Transport(ref msg) => write!(f, "Transport: {}", msg),
            Error::Serialization(ref msg) => write!(f, "Serialization: {}", msg),
            Error::Mime(ref msg) => write!(f, "Mime: {}", msg),
        }
    }
}

impl error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {}", err))
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Configuration(format!("invalid api_host: {}", err))
    }
}

impl From<serde_json::error::Error> for Error {
    fn from(err: serde_json::error::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<mailparse::MailParseError> for Error {
    fn from(err: mailparse::MailParseError) -> Self {
        Self::Mime(err.to_string())
    }
}
