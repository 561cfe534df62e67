//! Delivers outgoing email through the SendGrid v3 Web API.
//!
//! ```no_run
//! use sendgrid_api::email::{Body, Email};
//! use sendgrid_api::{config, SendgridClient};
//!
//! # async fn run() -> Result<(), sendgrid_api::Error> {
//! let client = SendgridClient::new(config::load_config(None)?)?;
//!
//! let email = Email::new()
//!     .with_sender("Jobs Board <noreply@example.com>")
//!     .to("jane@example.com")
//!     .subject("Your posting was approved")
//!     .body(Body::alternative("Approved!", "<p>Approved!</p>"));
//!
//! let receipt = client.deliver(&email).await?;
//! println!("{:?}", receipt.message_id);
//! # Ok(())
//! # }
//! ```
pub mod address;
pub mod config;
pub mod email;
pub mod error;
pub mod sendgrid;
pub mod transport;

pub use error::{Error, ErrorKind};
pub use sendgrid::SendgridClient;
pub use transport::{Receipt, Transport};
