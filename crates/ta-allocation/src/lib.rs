//! Round-based teaching-assistant allocation with audit logging, live updates,
//! professor feedback and course administration.

pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
