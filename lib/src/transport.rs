use std::future::Future;
use std::pin::Pin;

use crate::email::Email;
use crate::error::Error;

// Definition of future types for async use
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Outcome of a successful delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// HTTP status returned by the provider, always < 400
    pub status: u16,
    /// Provider-assigned message id, if the provider returned one
    pub message_id: Option<String>,
}

/// Something that can hand an `Email` over to a delivery service.
///
/// Implementations make exactly one delivery attempt per call and never
/// retry on their own.
pub trait Transport {
    fn deliver<'a>(&'a self, email: &'a Email) -> TransportFuture<'a, Receipt>;
}
