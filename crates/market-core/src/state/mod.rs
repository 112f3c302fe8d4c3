//! State management for the order lifecycle.
//!
//! This module provides transition validation for the three status enums,
//! ensuring orders, applications and assignments only move along their
//! allowed lifecycle edges.

pub mod order;

pub use order::{
	ensure_application_transition, ensure_assignment_transition, ensure_order_transition,
	StateError,
};
