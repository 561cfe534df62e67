use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::api::{self, MailSend, Personalization};
use crate::address;
use crate::email::{Address, Body, Email};
use crate::error::Error;

const TEXT_PLAIN: &str = "text/plain";
const TEXT_HTML: &str = "text/html";

/// Translate an `Email` into the SendGrid v3 mail/send body.
///
/// The only failure is a missing sender or recipient, or an address that
/// resolves to an empty email.
pub fn normalize(email: &Email) -> Result<MailSend, Error> {
    let sender = match &email.sender {
        Some(sender) => address::parse(sender)?,
        None => return Err(Error::MalformedAddress(String::new())),
    };

    if email.recipients.is_empty() {
        return Err(Error::MalformedAddress("no recipients".to_string()));
    }

    let personalization = Personalization {
        to: address::parse_all(&email.recipients)?,
        cc: optional_addresses(&email.cc)?,
        bcc: optional_addresses(&email.bcc)?,
        subject: email.subject.clone(),
    };

    let reply_to = match email.reply_to.first() {
        Some(addr) => Some(address::parse(addr)?),
        None => None,
    };

    let headers = if email.headers.is_empty() {
        None
    } else {
        Some(email.headers.clone())
    };

    let attachments = if email.attachments.is_empty() {
        None
    } else {
        Some(
            email
                .attachments
                .iter()
                .map(|a| api::Attachment {
                    content: STANDARD.encode(&a.data),
                    filename: a.name.clone(),
                    type_: a.content_type.clone(),
                    disposition: "attachment".to_string(),
                })
                .collect(),
        )
    };

    Ok(MailSend {
        personalizations: vec![personalization],
        from: sender,
        content: content(&email.body),
        reply_to,
        headers,
        attachments,
    })
}

fn optional_addresses(addresses: &[Address]) -> Result<Option<Vec<address::EmailAddress>>, Error> {
    if addresses.is_empty() {
        Ok(None)
    } else {
        address::parse_all(addresses).map(Some)
    }
}

// HTML goes first; some clients render the first part they understand
fn content(body: &Body) -> Vec<api::Content> {
    match body {
        Body::Multipart { html, text } => {
            let mut content = Vec::with_capacity(2);

            if let Some(html) = html {
                content.push(api::Content {
                    type_: TEXT_HTML.to_string(),
                    value: html.clone(),
                });
            }

            if let Some(text) = text {
                content.push(api::Content {
                    type_: TEXT_PLAIN.to_string(),
                    value: text.clone(),
                });
            }

            content
        }
        Body::Single { content_type, text } => vec![api::Content {
            type_: determine_content_type(content_type.as_deref()).to_string(),
            value: text.clone(),
        }],
    }
}

/// Anything that is not HTML goes out as plain text, parameters dropped.
fn determine_content_type(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.to_ascii_lowercase().contains(TEXT_HTML) => TEXT_HTML,
        _ => TEXT_PLAIN,
    }
}
