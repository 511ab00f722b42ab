//! Outbound HTTP plumbing shared by provider adapters

mod client;

pub use client::{HttpClient, HttpClientBuilder};
