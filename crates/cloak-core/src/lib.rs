//! Core abstractions for Cloak: backing-map, secret-storage, and vault contracts.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod backend;
pub mod secrets;
pub mod vault;
