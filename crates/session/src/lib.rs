//! Job lifecycle and concurrency control.
//!
//! The authoritative in-process record of pending and running jobs:
//! per-client queues and history stores, the shared slot counters the
//! admission controller checks against, the driver that walks an
//! admitted job through the gateway, and the restart reconciliation
//! sweep that resolves interrupted sessions against gateway state.

pub mod backend;
pub mod counters;
pub mod engine;
pub mod history;
pub mod queue;
pub mod reconcile;

pub use backend::GenerationBackend;
pub use counters::{CounterSnapshot, Limits, SlotCounters};
pub use engine::{EngineConfig, SessionEngine};
