//! Core types for woosync.
//!
//! This module provides type-safe wrappers and records for the sync domain.

pub mod id;
pub mod import;
pub mod inventory;
pub mod order;
pub mod rule;
pub mod state;
pub mod status;
pub mod timestamp;

pub use id::*;
pub use import::{ExistingOrder, ImportOutcome, ImportResult};
pub use inventory::{InventoryLevels, StockAdjustment};
pub use order::*;
pub use rule::{RuleField, RuleOperator, ShippingRule};
pub use state::{LockRecord, LockValue, StateKey};
pub use status::*;
