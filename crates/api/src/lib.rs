//! HTTP surface for the Atelier generation front end.
//!
//! Thin axum handlers over the session engine: job submission, queue
//! and history views, image retrieval, tag search, and a status
//! endpoint. All per-client state is keyed by the `x-client-id` header
//! the browser front end mints and persists.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod response;
pub mod router;
pub mod state;
