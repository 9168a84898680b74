//! API client module
//!
//! HTTP client for the Flik batch server.

pub mod client;
pub mod endpoints;

pub use client::ApiClient;
