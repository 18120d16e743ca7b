//! Thin JSON-over-HTTP layer on `reqwest`.
//!
//! Exchange clients build paths, query strings and headers; this crate sends
//! them and turns the response into a typed value or a [`RestError`]. Non-2xx
//! bodies are kept verbatim so the caller can decode venue error codes.

mod client;
mod error;

pub use client::RestClient;
pub use error::RestError;
pub use reqwest::Method;
