//! Remote content API access.
//!
//! `Transport` is the seam to the network: a plain `GET url -> (status,
//! bytes)` with no retries. `HttpTransport` implements it over reqwest and
//! attaches the bearer token; `MemoryTransport` serves canned responses.
//! `MenuApi` builds endpoint URLs, maps failing statuses to
//! `TransportError` and runs response bodies through the decoder.

pub mod client;
pub mod error;
pub mod transport;

pub use client::MenuApi;
pub use error::TransportError;
pub use transport::{HttpResponse, HttpTransport, MemoryTransport, Transport};
