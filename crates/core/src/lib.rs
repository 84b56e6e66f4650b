//! woosync Core - Shared types library.
//!
//! This crate provides the types shared by every woosync component:
//! - `engine` - Sync core, adapters, and the callback server binary
//! - `cli` - Command-line tools for manual syncs, locks, and migrations
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere, including in test fakes.
//!
//! # Modules
//!
//! - [`types`] - Order records, classification rules, sync state records,
//!   import outcomes, and type-safe references

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
