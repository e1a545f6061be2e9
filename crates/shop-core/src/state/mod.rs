//! State management for customer orders.
//!
//! This module holds the transition rules of both lifecycle axes and the
//! state machine that applies them to stored orders with optimistic
//! concurrency.

pub mod order;

pub use order::{
	is_valid_quotation_transition, is_valid_status_transition, LifecycleError,
	OrderStateMachine, Transition,
};
