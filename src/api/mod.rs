//! Backend http api, the connection token endpoint.

mod client;
mod error;
pub mod types;

pub use client::{Client, TokenProvider};
pub use error::Error;

/// Result type for api module
pub type Result<T> = std::result::Result<T, Error>;
