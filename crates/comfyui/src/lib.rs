//! ComfyUI gateway client.
//!
//! Talks to a ComfyUI server over its REST API (workflow submission,
//! history retrieval, image download) and WebSocket push channel, and
//! resolves a submitted workflow to a finished set of images. The
//! central correctness rule lives in [`gateway::Gateway::await_completion`]:
//! push notifications are treated as hints only, and the pollable
//! history endpoint is always consulted before success is declared.

pub mod api;
pub mod client;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod outputs;

pub use error::GatewayError;
pub use gateway::{Gateway, GenerationResult, ImageArtifact};
