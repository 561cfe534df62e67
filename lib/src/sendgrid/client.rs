use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;

use super::{api, payload};

use crate::config::Settings;
use crate::email::Email;
use crate::transport::{Receipt, Transport, TransportFuture};
use crate::Error;

/// Delivers mail through the SendGrid v3 Web API.
///
/// Holds only immutable configuration plus a pooled HTTP client, so one
/// instance can be shared across tasks.
#[derive(Clone)]
pub struct SendgridClient {
    api_key: String,
    endpoint: reqwest::Url,
    client: reqwest::Client,
}

impl SendgridClient {
    /// Build a client, falling back to `SENDGRID_API_KEY` from the
    /// process environment when `settings` has no key.
    pub fn new(settings: Settings) -> Result<Self, Error> {
        Self::with_env(settings, |name| std::env::var(name).ok())
    }

    pub fn from_key(api_key: &str) -> Result<Self, Error> {
        Self::new(Settings::default().with_api_key(api_key))
    }

    /// Same as `new`, with the environment lookup supplied by the caller.
    pub fn with_env<F>(settings: Settings, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = settings.resolve_api_key(lookup)?;

        // Must be usable as an Authorization header before anything is sent
        HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
            Error::Configuration("API key contains characters not allowed in a header".to_string())
        })?;

        let api_host = settings
            .api_host
            .as_deref()
            .unwrap_or(api::SENDGRID_DEFAULT_HOST);
        let endpoint = reqwest::Url::parse(&api::build_endpoint_url(api_host))?;

        let timeout = settings.timeout.unwrap_or(api::SENDGRID_REQUEST_TIMEOUT);

        // A 3xx is a success; following it would send the mail twice
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .redirect(Policy::none())
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    /// Send one email. Makes exactly one request and never retries.
    pub async fn deliver(&self, email: &Email) -> Result<Receipt, Error> {
        let payload = payload::normalize(email)?;
        let body = serde_json::to_vec(&payload)?;

        let recipients = payload.personalizations[0]
            .to
            .iter()
            .map(|a| a.email.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        log::debug!("POST {} ({} bytes) for {}", self.endpoint, body.len(), recipients);

        match self.request(body).await {
            Ok(receipt) => {
                log::info!(
                    "Email sent via SendGrid API: {} - Message ID: {}",
                    recipients,
                    receipt.message_id.as_deref().unwrap_or("none")
                );
                Ok(receipt)
            }
            Err(e) => {
                log::error!("Failed to send email to {}: {}", recipients, e);
                Err(e)
            }
        }
    }

    #[inline]
    async fn request(&self, body: Vec<u8>) -> Result<Receipt, Error> {
        let req = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        // Map response into an error if applicable
        let resp = api::map_status(req.send().await?).await?;

        let message_id = resp
            .headers()
            .get(api::SENDGRID_MESSAGE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(Receipt {
            status: resp.status().as_u16(),
            message_id,
        })
    }
}

impl Transport for SendgridClient {
    fn deliver<'a>(&'a self, email: &'a Email) -> TransportFuture<'a, Receipt> {
        Box::pin(SendgridClient::deliver(self, email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::Body;
    use crate::ErrorKind;

    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Requests = Arc<Mutex<Vec<String>>>;

    fn response(status_line: &str, headers: &[&str], body: &str) -> String {
        let mut resp = format!("HTTP/1.1 {}\r\n", status_line);
        for header in headers {
            resp.push_str(header);
            resp.push_str("\r\n");
        }
        resp.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        resp
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);

                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Local stand-in for the SendGrid API. Answers every request with
    /// `reply` (or never, if `reply` is None) and records what it got.
    async fn fake_sendgrid(reply: Option<String>) -> (String, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        let requests = Requests::default();
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);

                match &reply {
                    Some(reply) => {
                        let _ = socket.write_all(reply.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    None => tokio::time::sleep(Duration::from_secs(60)).await,
                }
            }
        });

        (host, requests)
    }

    /// Splits a raw request into a lowercased head and the JSON body
    fn split(request: &str) -> (String, serde_json::Value) {
        let mut parts = request.splitn(2, "\r\n\r\n");
        let head = parts.next().unwrap().to_ascii_lowercase();
        let body = serde_json::from_str(parts.next().unwrap()).unwrap();
        (head, body)
    }

    fn client(host: &str) -> SendgridClient {
        let settings = Settings::default().with_api_key("SG.test-key").with_api_host(host);
        SendgridClient::with_env(settings, |_| None).unwrap()
    }

    fn hello() -> Email {
        Email::new()
            .with_sender("a@x.com")
            .to("b@y.com")
            .subject("Hi")
            .body(Body::text("Hello"))
    }

    #[tokio::test]
    async fn accepted_with_message_id() {
        let reply = response("202 Accepted", &["X-Message-Id: abc123"], "");
        let (host, requests) = fake_sendgrid(Some(reply)).await;

        let receipt = client(&host).deliver(&hello()).await.unwrap();

        assert_eq!(receipt.status, 202);
        assert_eq!(receipt.message_id.as_deref(), Some("abc123"));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_shape() {
        let (host, requests) = fake_sendgrid(Some(response("202 Accepted", &[], ""))).await;

        client(&host).deliver(&hello()).await.unwrap();

        let request = requests.lock().unwrap()[0].clone();
        let (head, body) = split(&request);

        assert!(head.starts_with("post /v3/mail/send http/1.1\r\n"), "{}", head);
        assert!(head.contains("\r\nauthorization: bearer sg.test-key"));
        assert!(head.contains("\r\ncontent-type: application/json"));
        assert_eq!(
            body,
            serde_json::json!({
                "personalizations": [{ "to": [{ "email": "b@y.com" }], "subject": "Hi" }],
                "from": { "email": "a@x.com" },
                "content": [{ "type": "text/plain", "value": "Hello" }],
            })
        );
    }

    #[tokio::test]
    async fn success_without_message_id() {
        let (host, _) = fake_sendgrid(Some(response("200 OK", &[], "{}"))).await;

        let receipt = client(&host).deliver(&hello()).await.unwrap();
        assert_eq!(receipt.status, 200);
        assert_eq!(receipt.message_id, None);
    }

    #[tokio::test]
    async fn redirect_is_success_and_not_followed() {
        let reply = response("302 Found", &["Location: /v3/elsewhere"], "");
        let (host, requests) = fake_sendgrid(Some(reply)).await;

        let receipt = client(&host).deliver(&hello()).await.unwrap();

        assert_eq!(receipt.status, 302);
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_is_rejected_with_body() {
        let body = r#"{"errors":[{"message":"The provided authorization grant is invalid, expired, or revoked","field":null,"help":null}]}"#;
        let (host, requests) =
            fake_sendgrid(Some(response("401 Unauthorized", &[], body))).await;

        let err = client(&host).deliver(&hello()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProviderRejected);
        match &err {
            Error::ProviderRejected { status, body: got } => {
                assert_eq!(*status, 401);
                assert_eq!(got, body);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains(body));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let (host, _) =
            fake_sendgrid(Some(response("503 Service Unavailable", &[], "try later"))).await;

        match client(&host).deliver(&hello()).await {
            Err(Error::ProviderRejected { status: 503, body }) => assert_eq!(body, "try later"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let (host, requests) = fake_sendgrid(Some(response("202 Accepted", &[], ""))).await;

        let settings = Settings::default().with_api_host(host.as_str());
        let result = SendgridClient::with_env(settings, |_| None);

        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(requests.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn key_falls_back_to_env() {
        let (host, requests) = fake_sendgrid(Some(response("202 Accepted", &[], ""))).await;

        let settings = Settings::default().with_api_host(host.as_str());
        let client = SendgridClient::with_env(settings, |name| {
            if name == "SENDGRID_API_KEY" {
                Some("SG.from-env".to_string())
            } else {
                None
            }
        })
        .unwrap();

        client.deliver(&hello()).await.unwrap();

        let (head, _) = split(&requests.lock().unwrap()[0]);
        assert!(head.contains("authorization: bearer sg.from-env"));
    }

    #[tokio::test]
    async fn unusable_key_fails_at_construction() {
        let (host, requests) = fake_sendgrid(Some(response("202 Accepted", &[], ""))).await;

        let settings = Settings::default()
            .with_api_key("SG.abc\ndef")
            .with_api_host(host.as_str());
        let result = SendgridClient::with_env(settings, |_| None);

        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(requests.lock().unwrap().len(), 0);
    }

    #[test]
    fn bad_host_is_a_configuration_error() {
        let settings = Settings::default().with_api_key("k").with_api_host("not a host");
        let result = SendgridClient::with_env(settings, |_| None);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn default_host() {
        let client = SendgridClient::from_key("k").unwrap();
        assert_eq!(client.endpoint().as_str(), "https://api.sendgrid.com/v3/mail/send");
    }

    #[tokio::test]
    async fn malformed_address_sends_nothing() {
        let (host, requests) = fake_sendgrid(Some(response("202 Accepted", &[], ""))).await;

        let email = hello().to("   ");
        let err = client(&host).deliver(&email).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedAddress);
        assert_eq!(requests.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client(&host).deliver(&hello()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn timeout_is_a_transport_error() {
        let (host, requests) = fake_sendgrid(None).await;

        let settings = Settings::default()
            .with_api_key("k")
            .with_api_host(host.as_str())
            .with_timeout(1);
        let client = SendgridClient::with_env(settings, |_| None).unwrap();

        let err = client.deliver(&hello()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("timed out"), "{}", err);
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn usable_as_transport_object() {
        let reply = response("202 Accepted", &["X-Message-Id: xyz"], "");
        let (host, _) = fake_sendgrid(Some(reply)).await;

        let transport: Box<dyn Transport + Send + Sync> = Box::new(client(&host));
        let receipt = transport.deliver(&hello()).await.unwrap();

        assert_eq!(receipt.message_id.as_deref(), Some("xyz"));
    }
}
