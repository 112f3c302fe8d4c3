//! Lifecycle transition tables.
//!
//! Orders move Staffing -> InProgress -> Completed, with Canceled reachable
//! from both live states and Expired entered only by an external scheduler
//! while staffing. Applications move Applied -> Selected and back (the
//! dispatcher may change their mind before start), ending in Rejected or
//! Withdrawn. Assignments start Active and end Completed or Canceled.
//! Validation is pure; persisting a validated transition is the
//! repository's job.

use market_types::{ApplicationStatus, AssignmentStatus, OrderStatus};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised when a status change leaves the allowed lifecycle edges.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Invalid order transition from {from} to {to}")]
	InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
	#[error("Invalid application transition from {from} to {to}")]
	InvalidApplicationTransition {
		from: ApplicationStatus,
		to: ApplicationStatus,
	},
	#[error("Invalid assignment transition from {from} to {to}")]
	InvalidAssignmentTransition {
		from: AssignmentStatus,
		to: AssignmentStatus,
	},
}

// Static transition tables - each state maps to allowed next states

static ORDER_TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Staffing,
		HashSet::from([
			OrderStatus::InProgress,
			OrderStatus::Canceled,
			OrderStatus::Expired,
		]),
	);
	m.insert(
		OrderStatus::InProgress,
		HashSet::from([OrderStatus::Completed, OrderStatus::Canceled]),
	);
	m.insert(OrderStatus::Completed, HashSet::new()); // terminal
	m.insert(OrderStatus::Canceled, HashSet::new()); // terminal
	m.insert(OrderStatus::Expired, HashSet::new()); // terminal
	m
});

static APPLICATION_TRANSITIONS: Lazy<HashMap<ApplicationStatus, HashSet<ApplicationStatus>>> =
	Lazy::new(|| {
		let mut m = HashMap::new();
		m.insert(
			ApplicationStatus::Applied,
			HashSet::from([
				ApplicationStatus::Selected,
				ApplicationStatus::Rejected,
				ApplicationStatus::Withdrawn,
			]),
		);
		m.insert(
			ApplicationStatus::Selected,
			HashSet::from([
				ApplicationStatus::Applied,
				ApplicationStatus::Rejected,
				ApplicationStatus::Withdrawn,
			]),
		);
		m.insert(ApplicationStatus::Rejected, HashSet::new()); // terminal
		m.insert(ApplicationStatus::Withdrawn, HashSet::new()); // terminal
		m
	});

static ASSIGNMENT_TRANSITIONS: Lazy<HashMap<AssignmentStatus, HashSet<AssignmentStatus>>> =
	Lazy::new(|| {
		let mut m = HashMap::new();
		m.insert(
			AssignmentStatus::Active,
			HashSet::from([AssignmentStatus::Completed, AssignmentStatus::Canceled]),
		);
		m.insert(AssignmentStatus::Completed, HashSet::new()); // terminal
		m.insert(AssignmentStatus::Canceled, HashSet::new()); // terminal
		m
	});

/// Validates an order status change.
pub fn ensure_order_transition(from: OrderStatus, to: OrderStatus) -> Result<(), StateError> {
	if ORDER_TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to))
	{
		Ok(())
	} else {
		Err(StateError::InvalidOrderTransition { from, to })
	}
}

/// Validates an application status change.
pub fn ensure_application_transition(
	from: ApplicationStatus,
	to: ApplicationStatus,
) -> Result<(), StateError> {
	if APPLICATION_TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to))
	{
		Ok(())
	} else {
		Err(StateError::InvalidApplicationTransition { from, to })
	}
}

/// Validates an assignment status change.
pub fn ensure_assignment_transition(
	from: AssignmentStatus,
	to: AssignmentStatus,
) -> Result<(), StateError> {
	if ASSIGNMENT_TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to))
	{
		Ok(())
	} else {
		Err(StateError::InvalidAssignmentTransition { from, to })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn order_follows_lifecycle_edges() {
		assert!(ensure_order_transition(OrderStatus::Staffing, OrderStatus::InProgress).is_ok());
		assert!(ensure_order_transition(OrderStatus::Staffing, OrderStatus::Expired).is_ok());
		assert!(ensure_order_transition(OrderStatus::InProgress, OrderStatus::Completed).is_ok());
		assert!(ensure_order_transition(OrderStatus::Staffing, OrderStatus::Completed).is_err());
		assert!(ensure_order_transition(OrderStatus::Completed, OrderStatus::Staffing).is_err());
	}

	#[test]
	fn selection_is_reversible_until_terminal() {
		assert!(
			ensure_application_transition(ApplicationStatus::Applied, ApplicationStatus::Selected)
				.is_ok()
		);
		assert!(
			ensure_application_transition(ApplicationStatus::Selected, ApplicationStatus::Applied)
				.is_ok()
		);
		assert!(ensure_application_transition(
			ApplicationStatus::Withdrawn,
			ApplicationStatus::Applied
		)
		.is_err());
		assert!(ensure_application_transition(
			ApplicationStatus::Rejected,
			ApplicationStatus::Selected
		)
		.is_err());
	}

	#[test]
	fn assignments_only_leave_active() {
		assert!(
			ensure_assignment_transition(AssignmentStatus::Active, AssignmentStatus::Completed)
				.is_ok()
		);
		assert!(
			ensure_assignment_transition(AssignmentStatus::Completed, AssignmentStatus::Canceled)
				.is_err()
		);
	}
}
