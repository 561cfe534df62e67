//! Generic outgoing email representation.
//!
//! `Email` is what callers hand to a transport. It knows nothing about the
//! SendGrid wire format; see `sendgrid::payload` for the translation.
use std::collections::BTreeMap;

use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

use crate::error::Error;

// Headers SendGrid refuses to accept in the `headers` object
const RESERVED_HEADERS: &[&str] = &["x-sg-id", "x-sg-eid"];

/// A single address, either as typed by a human or already split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    /// `jane@example.com` or `Jane Doe <jane@example.com>`
    Raw(String),
    Mailbox { email: String, name: Option<String> },
}

impl Address {
    pub fn mailbox(email: impl Into<String>, name: Option<&str>) -> Self {
        Address::Mailbox {
            email: email.into(),
            name: name.map(String::from),
        }
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address::Raw(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address::Raw(s)
    }
}

/// Email body.
///
/// A multipart body holds at most one HTML and at most one plain text
/// alternative. Either may be missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Single {
        content_type: Option<String>,
        text: String,
    },
    Multipart {
        html: Option<String>,
        text: Option<String>,
    },
}

impl Body {
    pub fn text(text: impl Into<String>) -> Self {
        Body::Single {
            content_type: Some("text/plain".to_string()),
            text: text.into(),
        }
    }

    pub fn html(html: impl Into<String>) -> Self {
        Body::Single {
            content_type: Some("text/html".to_string()),
            text: html.into(),
        }
    }

    pub fn alternative(text: impl Into<String>, html: impl Into<String>) -> Self {
        Body::Multipart {
            html: Some(html.into()),
            text: Some(text.into()),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::Single {
            content_type: None,
            text: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub data: Vec<u8>,
    pub content_type: String,
    pub name: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
            name: name.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Email {
    pub sender: Option<Address>,
    pub recipients: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    /// Only the first entry is used by SendGrid
    pub reply_to: Vec<Address>,
    pub subject: String,
    pub headers: BTreeMap<String, String>,
    pub body: Body,
    pub attachments: Vec<Attachment>,
}

impl Email {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_sender(mut self, sender: impl Into<Address>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Replaces the recipient list
    pub fn with_recipients<I, A>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Address>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn to(mut self, recipient: impl Into<Address>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    pub fn cc(mut self, address: impl Into<Address>) -> Self {
        self.cc.push(address.into());
        self
    }

    pub fn bcc(mut self, address: impl Into<Address>) -> Self {
        self.bcc.push(address.into());
        self
    }

    pub fn reply_to(mut self, address: impl Into<Address>) -> Self {
        self.reply_to.push(address.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Convert a raw MIME email into structured format.
    ///
    /// Walks the MIME tree and extracts:
    ///
    /// 1. Envelope-ish headers (From, To, Cc, Bcc, Reply-To, Subject)
    /// 2. Custom `X-` headers
    /// 3. Body (text and/or html)
    /// 4. Attachments, inline or not
    pub fn from_mime(mime_content: &[u8]) -> Result<Email, Error> {
        let parsed = mailparse::parse_mail(mime_content)?;

        let mut email = Email::new();

        email.subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
        email.sender = parse_address_header(&parsed, "From")?.into_iter().next();
        email.recipients = parse_address_header(&parsed, "To")?;
        email.cc = parse_address_header(&parsed, "Cc")?;
        email.bcc = parse_address_header(&parsed, "Bcc")?;
        email.reply_to = parse_address_header(&parsed, "Reply-To")?;

        for header in parsed.headers.iter() {
            let key = header.get_key();
            let lower = key.to_ascii_lowercase();

            if lower.starts_with("x-") && !RESERVED_HEADERS.contains(&lower.as_str()) {
                email.headers.insert(key, header.get_value());
            }
        }

        if parsed.ctype.mimetype.starts_with("multipart/") {
            let mut html = None;
            let mut text = None;
            email.parse_recursive(&parsed, &mut html, &mut text)?;
            email.body = Body::Multipart { html, text };
        } else {
            email.body = Body::Single {
                content_type: Some(parsed.ctype.mimetype.clone()),
                text: parsed.get_body()?,
            };
        }

        Ok(email)
    }

    fn parse_recursive(
        &mut self,
        part: &ParsedMail,
        html: &mut Option<String>,
        text: &mut Option<String>,
    ) -> Result<(), Error> {
        let mimetype = &part.ctype.mimetype;

        if let Some(attachment) = attachment_from_mime(part)? {
            self.attachments.push(attachment);
            return Ok(());
        }

        if mimetype.starts_with("multipart/") {
            for subpart in part.subparts.iter() {
                self.parse_recursive(subpart, html, text)?;
            }
            return Ok(());
        }

        // First alternative of each kind wins
        if mimetype == "text/html" && html.is_none() {
            *html = Some(part.get_body()?);
        } else if mimetype == "text/plain" && text.is_none() {
            *text = Some(part.get_body()?);
        } else {
            log::debug!("Skipping MIME part of type {}", mimetype);
        }

        Ok(())
    }
}

fn parse_address_header(parsed: &ParsedMail, name: &str) -> Result<Vec<Address>, Error> {
    let header = match parsed.headers.get_first_header(name) {
        Some(h) => h,
        None => return Ok(Vec::new()),
    };

    let mut addresses = Vec::new();

    for addr in mailparse::addrparse_header(header)?.iter() {
        match addr {
            mailparse::MailAddr::Single(info) => {
                addresses.push(Address::mailbox(info.addr.clone(), info.display_name.as_deref()));
            }
            mailparse::MailAddr::Group(group) => {
                for info in group.addrs.iter() {
                    addresses.push(Address::mailbox(info.addr.clone(), info.display_name.as_deref()));
                }
            }
        }
    }

    Ok(addresses)
}

/// Inspect part headers to determine if this is an attachment.
/// Inline text parts are treated as body, everything else with a
/// Content-Disposition is an attachment.
fn attachment_from_mime(part: &ParsedMail) -> Result<Option<Attachment>, Error> {
    if part.headers.get_first_value("Content-Disposition").is_none() {
        return Ok(None);
    }

    let disposition = part.get_content_disposition();
    let mimetype = &part.ctype.mimetype;

    match disposition.disposition {
        DispositionType::Attachment => (),
        DispositionType::Inline if !mimetype.starts_with("text/") => (),
        _ => return Ok(None),
    }

    let name = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .cloned()
        .unwrap_or_else(|| "attachment".to_string());

    Ok(Some(Attachment::new(name, mimetype.clone(), part.get_body_raw()?)))
}
