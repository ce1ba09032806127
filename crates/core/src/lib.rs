//! Domain types and pure logic for the Atelier generation front end.
//!
//! Everything here is runtime-agnostic: job and history records, the
//! workflow template renderer, seed resolution, endpoint redaction,
//! and the tag-dictionary prompt helper. Network and state management
//! live in the `atelier-comfyui` and `atelier-session` crates.

pub mod error;
pub mod history;
pub mod job;
pub mod redact;
pub mod tags;
pub mod types;
pub mod workflow;
