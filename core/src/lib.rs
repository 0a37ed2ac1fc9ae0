//! Blocking client for the Online Labs cloud API.
//!
//! # Overview
//! `OlClient` exposes one method per remote operation on the account service
//! (tokens, organizations, users) and the compute service (servers, volumes,
//! snapshots, images, IPs). Each call is a single HTTP request whose JSON
//! envelope is unwrapped to the field the operation is about.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`);
//!   a `Transport` performs the round-trip, `UreqTransport` in production.
//! - Response classification lives in `response` and is pure.
//! - Results are `serde_json::Value` passthroughs; only request payloads are
//!   typed.
//! - No retries, no pooling, no pagination. One call, one request.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod response;
pub mod transport;
pub mod types;

pub use client::OlClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{ServerAction, VolumeType};
