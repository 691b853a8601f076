//! Ambient plumbing shared by Gather binaries: tracing, request ids, health, serde helpers.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
