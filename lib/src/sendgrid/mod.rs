pub mod api;
mod client;
mod payload;

pub use client::SendgridClient;
pub use payload::normalize;
