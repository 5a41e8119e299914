//! HTTP client side of cachet.
//!
//! This crate provides the transport contract, a reqwest-backed transport,
//! and the caching decision engine that sits in front of it.

pub mod cache;
pub mod transport;

pub use cache::{CacheState, HttpCache};
pub use transport::{ReqwestTransport, Transport, TransportConfig};
