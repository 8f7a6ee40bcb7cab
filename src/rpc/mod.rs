//! Chain RPC integration module
//!
//! This module provides the read-only chain interface consumed by the sync engine and a
//! JSON-RPC implementation of it. The engine only depends on the `ChainReader` trait, so
//! tests and alternative SDKs can plug in their own reader.

/// JSON-RPC client and the `ChainReader` trait
mod client;
/// Type definitions for RPC data structures
mod types;

pub use client::{ChainReader, NearRpcClient, view_function_as};
pub use types::*;
