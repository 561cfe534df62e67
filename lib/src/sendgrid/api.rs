use std::collections::BTreeMap;

use reqwest::StatusCode;

use serde::Serialize;

use crate::address::EmailAddress;
use crate::error::Error;

pub const SENDGRID_DEFAULT_HOST: &str = "https://api.sendgrid.com";
pub const SENDGRID_MAIL_SEND_PATH: &str = "/v3/mail/send";
pub const SENDGRID_MESSAGE_ID_HEADER: &str = "X-Message-Id";

// Request timeout, in seconds
pub(crate) const SENDGRID_REQUEST_TIMEOUT: u64 = 30;

/// Map a SendGrid response into a rejection if its status is >= 400.
///
/// The body is consumed only on failure, where it is the diagnostic.
pub async fn map_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();

    if status.as_u16() < StatusCode::BAD_REQUEST.as_u16() {
        return Ok(resp);
    }

    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Could not read SendGrid error body: {}", e);
            String::new()
        }
    };

    Err(Error::ProviderRejected {
        status: status.as_u16(),
        body,
    })
}

#[inline]
pub fn build_endpoint_url(api_host: &str) -> String {
    format!("{}{}", api_host.trim_end_matches('/'), SENDGRID_MAIL_SEND_PATH)
}

/// Body of `POST /v3/mail/send`
#[derive(Debug, Serialize, PartialEq)]
pub struct MailSend {
    pub personalizations: Vec<Personalization>,
    pub from: EmailAddress,
    pub content: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<EmailAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Personalization {
    pub to: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<EmailAddress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<EmailAddress>>,
    pub subject: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Content {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Attachment {
    /// Base64, no line wrapping
    pub content: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub disposition: String,
}
