//! Core lifecycle engine for the marketplace system.
//!
//! This crate ties the storage, identity and view layers together: the
//! graph mapper assembles flat rows into order aggregates, the state
//! module validates lifecycle transitions, and the orders repository
//! exposes the transactional lifecycle operations (apply, withdraw,
//! select, start, cancel, complete) together with live order streams.

pub mod graph;
pub mod repository;
pub mod state;

pub use graph::to_domain_orders;
pub use repository::{OrdersError, OrdersRepository};
pub use state::StateError;
