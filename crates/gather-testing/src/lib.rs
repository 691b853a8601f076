//! Test utilities for Gather services.
//!
//! Provides `MockAuth`, the webhook signer and the fixture loader.
//! Import in `#[cfg(test)]` blocks and `tests/` only, never in production code.

pub mod auth;
pub mod fixture;
pub mod webhook;
