//! HTTP transport for the gateway
//!
//! Routes `POST /gateway` into the dispatcher, upgrades `GET /gateway` to an
//! SSE stream when asked, and serves discovery, metadata and health endpoints.

pub mod handlers;
pub mod session;
pub mod sse;
