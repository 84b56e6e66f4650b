//! woosync engine library.
//!
//! Reconciles orders and inventory between a WooCommerce storefront and a
//! fulfillment warehouse. The crate is split into the sync core, which only
//! talks to collaborators through traits, and the adapters that implement
//! those traits for production use.
//!
//! # Sync core
//!
//! - [`cursor`] - Incremental, paginated order pull with a persisted watermark
//! - [`guard`] - Already-imported check and the advisory import lock
//! - [`classify`] - Shipping method classification rules
//! - [`transform`] - Sandboxed order transform stage
//! - [`feedback`] - Best-effort status comments back to the storefront
//! - [`connector`] - Per-event flows (order import, inventory, shipments, lifecycle)
//! - [`events`] - Event queue and worker
//! - [`cron`] - Periodic incremental order pull
//!
//! # Collaborator seams
//!
//! - [`remote::RemoteGateway`] - Storefront REST API
//! - [`local::LocalCommerce`] - Warehouse API
//! - [`settings::ConfigStore`] - Connector configuration
//! - [`sync_state::StateStore`] - Watermark, lock, and registration flag
//! - [`events::EventBus`] - Queued event dispatch
//!
//! # Security
//!
//! Storefront and warehouse credentials are held as `SecretString` and are
//! never logged.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bootstrap;
pub mod classify;
pub mod clock;
pub mod config;
pub mod connector;
pub mod cron;
pub mod cursor;
pub mod db;
pub mod error;
pub mod events;
pub mod feedback;
pub mod guard;
pub mod local;
pub mod remote;
pub mod routes;
pub mod settings;
pub mod state;
pub mod sync_state;
#[cfg(test)]
mod testing;
pub mod transform;

pub use connector::Connector;
pub use error::SyncError;
