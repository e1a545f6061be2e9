//! Core order lifecycle for the shop order system.
//!
//! A customer order moves through a quotation axis and a fulfillment axis.
//! This crate holds the transition rules, the role policy that guards them,
//! the state machine that commits transitions atomically against storage,
//! and the engine that ties these together and publishes events.

pub mod builder;
pub mod engine;
pub mod policy;
pub mod state;

pub use builder::{BuilderError, EngineBuilder, EngineFactories};
pub use engine::activity::{ActivityEntry, ActivityFeed};
pub use engine::event_bus::EventBus;
pub use engine::OrderEngine;
pub use policy::{Action, Scope};
pub use state::{LifecycleError, OrderStateMachine, Transition};
