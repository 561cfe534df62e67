//! Map delivery outcomes to sendmail-style exit codes.
use sendgrid_api::Error;

// See sysexits.h
pub const OK: i32 = 0;
pub const DATAERR: i32 = 65;
pub const UNAVAILABLE: i32 = 69;
pub const TEMPFAIL: i32 = 75;

/// Exit code for a failed delivery.
///
/// `TEMPFAIL` asks the MTA to queue the message and try again later;
/// `UNAVAILABLE` and `DATAERR` make it bounce.
pub fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Transport(_) | Error::Configuration(_) => TEMPFAIL,
        Error::ProviderRejected { status, .. } if *status == 429 || *status >= 500 => TEMPFAIL,
        Error::ProviderRejected { .. } => UNAVAILABLE,
        Error::MalformedAddress(_) | Error::Mime(_) | Error::Serialization(_) => DATAERR,
    }
}

/// Enhanced status code for bounces, printed for the MTA to put in the DSN.
/// See: https://www.iana.org/assignments/smtp-enhanced-status-codes/smtp-enhanced-status-codes.xhtml
pub fn enhanced_code(err: &Error) -> Option<&'static str> {
    match err {
        Error::ProviderRejected { status, .. } => match *status {
            401 | 403 => Some("5.7.8"),
            413 => Some("5.3.4"),
            _ if *status >= 500 || *status == 429 => None,
            _ => Some("5.5.4"),
        },
        Error::MalformedAddress(_) => Some("5.1.3"),
        Error::Mime(_) | Error::Serialization(_) => Some("5.6.0"),
        Error::Transport(_) | Error::Configuration(_) => None,
    }
}
