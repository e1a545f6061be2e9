//! Common types module for the upholstery shop order system.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: customer orders and their quotation, branches, acting users,
//! lifecycle events, storage keys and the HTTP API envelope.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Acting user and role types supplied by the auth gateway.
pub mod auth;
/// Branch directory types.
pub mod branch;
/// Lifecycle event types published after committed transitions.
pub mod events;
/// Customer order, quotation and fulfillment types.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions shared across crates.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use auth::*;
pub use branch::*;
pub use events::*;
pub use order::*;
pub use registry::*;
pub use storage::*;
pub use utils::{format_order_number, truncate_id};
pub use validation::*;
