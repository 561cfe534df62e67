use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::email::Address;
use crate::error::Error;

lazy_static! {
    // "Display Name <email@example.com>"
    static ref NAMED_ADDRESS: Regex = Regex::new(r"^(.+?)\s*<(.+?)>$").unwrap();
}

/// An `{email, name}` pair as SendGrid expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailAddress {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Split an address into email and optional display name.
///
/// This is deliberately not an RFC 5322 parser: callers validate
/// addresses before building an `Email`.
pub fn parse(address: &Address) -> Result<EmailAddress, Error> {
    let (email, name) = match address {
        Address::Mailbox { email, name } => {
            (email.trim().to_string(), name.as_deref().and_then(display_name))
        }
        Address::Raw(raw) => match NAMED_ADDRESS.captures(raw) {
            Some(caps) => (caps[2].trim().to_string(), display_name(&caps[1])),
            None => (raw.trim().to_string(), None),
        },
    };

    if email.is_empty() {
        return Err(Error::MalformedAddress(address_text(address)));
    }

    Ok(EmailAddress { email, name })
}

pub fn parse_all(addresses: &[Address]) -> Result<Vec<EmailAddress>, Error> {
    addresses.iter().map(parse).collect()
}

// Blank names are sent as absent, never as ""
fn display_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn address_text(address: &Address) -> String {
    match address {
        Address::Raw(raw) => raw.clone(),
        Address::Mailbox { email, name: Some(name) } => format!("{} <{}>", name, email),
        Address::Mailbox { email, name: None } => email.clone(),
    }
}
