//! Event system for netlab
//!
//! This crate provides the event bus and event types used to report node
//! lifecycle progress to display and link-wiring consumers.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
