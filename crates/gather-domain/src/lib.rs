//! Domain types shared across Gather services.
//!
//! This crate contains only pure types with no framework dependencies.
//! Every layer of a service may import it.

pub mod access;
pub mod fee;
pub mod id;
pub mod job;
pub mod payment;
pub mod rate_limit;
