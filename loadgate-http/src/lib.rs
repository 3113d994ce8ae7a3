//! HTTP transport for loadgate
//!
//! This crate provides the seam between the load engine and the network:
//! a small [`HttpClient`] trait that the engine drives, and a pooled
//! reqwest-backed implementation configured from the `http` config domain.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-export main types for convenience
pub use client::{HttpClient, HttpManager};
pub use config::HttpConfig;
pub use errors::HttpError;
pub use types::{HttpMethod, HttpRequest, HttpResponse};
