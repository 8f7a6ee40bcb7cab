//! Wallet backend integration module
//!
//! Token lists and exchange rates come from the wallet backend rather than the chain.
//! The session only depends on the `TokenRegistry` trait.

/// HTTP client and the `TokenRegistry` trait
mod client;
/// Token, rate and error types
mod types;

pub use client::{DEFAULT_BACKEND_URL, HereBackendClient, TokenRegistry};
pub use types::*;
