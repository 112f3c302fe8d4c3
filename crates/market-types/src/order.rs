//! Order lifecycle types for the marketplace engine.
//!
//! This module defines the order aggregate and the two collections it owns:
//! applications (a loader asking to work an order) and assignments (a
//! confirmed worker-to-order binding created when the order starts).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Documented keys of the open `meta` bag carried by every order.
///
/// The bag is an extension point for fields that do not warrant a schema
/// change; values are stored as strings and parsed defensively by the
/// presentation mappers.
pub mod meta_keys {
	/// Creation timestamp in Unix milliseconds.
	pub const CREATED_AT: &str = "createdAt";
	/// Id of the dispatcher that posted the order.
	pub const DISPATCHER_ID: &str = "dispatcherId";
	/// Minimum loader rating requested by the dispatcher.
	pub const MIN_WORKER_RATING: &str = "minWorkerRating";
	/// Free-form reason recorded when an order is canceled.
	pub const CANCEL_REASON: &str = "cancelReason";
}

/// When the work is scheduled to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScheduleMode {
	/// As soon as workers are staffed.
	Soon,
	/// At an exact point in time.
	#[serde(rename_all = "camelCase")]
	Exact {
		/// Scheduled start in Unix milliseconds.
		at_millis: i64,
	},
}

impl ScheduleMode {
	/// Returns the exact scheduling time, or 0 for `Soon` orders which
	/// carry none.
	pub fn at_millis_or_zero(&self) -> i64 {
		match self {
			ScheduleMode::Soon => 0,
			ScheduleMode::Exact { at_millis } => *at_millis,
		}
	}
}

/// Status of an order in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
	/// Open for applications.
	Staffing,
	/// Started; loaders are assigned and working.
	InProgress,
	/// Finished successfully (terminal).
	Completed,
	/// Canceled by the dispatcher (terminal).
	Canceled,
	/// Expired without starting (terminal; set by an external scheduler,
	/// never by the engine itself).
	Expired,
}

impl OrderStatus {
	/// True for statuses with no outgoing transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::Completed | OrderStatus::Canceled | OrderStatus::Expired
		)
	}

	/// True for statuses that count toward a loader's active-application
	/// limit.
	pub fn is_active(&self) -> bool {
		matches!(self, OrderStatus::Staffing | OrderStatus::InProgress)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Staffing => write!(f, "Staffing"),
			OrderStatus::InProgress => write!(f, "InProgress"),
			OrderStatus::Completed => write!(f, "Completed"),
			OrderStatus::Canceled => write!(f, "Canceled"),
			OrderStatus::Expired => write!(f, "Expired"),
		}
	}
}

/// Status of a loader's application to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplicationStatus {
	/// Submitted, awaiting a dispatcher decision.
	Applied,
	/// Picked by the dispatcher for the next start.
	Selected,
	/// Not taken when the order started (terminal).
	Rejected,
	/// Withdrawn by the loader (terminal).
	Withdrawn,
}

impl ApplicationStatus {
	/// True while the application still occupies one of the loader's
	/// active slots.
	pub fn is_open(&self) -> bool {
		matches!(self, ApplicationStatus::Applied | ApplicationStatus::Selected)
	}
}

impl fmt::Display for ApplicationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApplicationStatus::Applied => write!(f, "Applied"),
			ApplicationStatus::Selected => write!(f, "Selected"),
			ApplicationStatus::Rejected => write!(f, "Rejected"),
			ApplicationStatus::Withdrawn => write!(f, "Withdrawn"),
		}
	}
}

/// Status of a confirmed worker-to-order binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentStatus {
	/// The loader is working the order.
	Active,
	/// The order finished with this loader on it (terminal).
	Completed,
	/// The order was canceled while this loader was assigned (terminal).
	Canceled,
}

impl fmt::Display for AssignmentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AssignmentStatus::Active => write!(f, "Active"),
			AssignmentStatus::Completed => write!(f, "Completed"),
			AssignmentStatus::Canceled => write!(f, "Canceled"),
		}
	}
}

/// Persisted flat order row.
///
/// This is exactly what the orders table stores; the aggregate [`Order`]
/// attaches the owned collections on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
	/// Store-assigned identifier.
	pub id: i64,
	pub title: String,
	pub address: String,
	/// Offered pay, in minor currency units per hour.
	pub price_per_hour: i64,
	pub schedule: ScheduleMode,
	/// Expected duration of the work in minutes.
	pub duration_min: u32,
	/// Count of assignments in `{Active, Completed}`; maintained by the
	/// lifecycle engine and never allowed to exceed `workers_total`.
	pub workers_current: u32,
	/// Worker capacity requested by the dispatcher.
	pub workers_total: u32,
	/// Free-form tags, order-preserving.
	#[serde(default)]
	pub tags: Vec<String>,
	/// Open string-keyed bag; see [`meta_keys`] for the documented keys.
	#[serde(default)]
	pub meta: BTreeMap<String, String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub comment: Option<String>,
	pub status: OrderStatus,
	/// Id of the dispatcher that created the order.
	pub created_by_user_id: i64,
}

/// A loader's request to work an order.
///
/// Keyed by `(order_id, loader_id)`; at most one application per loader
/// per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderApplication {
	pub order_id: i64,
	pub loader_id: i64,
	pub status: ApplicationStatus,
	pub applied_at_millis: i64,
	/// Loader rating snapshot taken at application time; immutable once
	/// set.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rating_snapshot: Option<f32>,
}

/// A confirmed worker-to-order binding, created when the order starts.
///
/// Keyed by `(order_id, loader_id)`. Assignments are never deleted; a
/// terminal status is the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAssignment {
	pub order_id: i64,
	pub loader_id: i64,
	pub status: AssignmentStatus,
	pub assigned_at_millis: i64,
	/// Set once, when the order transitions to `InProgress`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub started_at_millis: Option<i64>,
}

/// The order aggregate: the flat row plus the collections it owns.
///
/// Aggregates handed out by the engine are deep-copied snapshots of
/// committed state; consumers inspect them but never feed them back as
/// writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	#[serde(flatten)]
	pub row: OrderRow,
	#[serde(default)]
	pub applications: Vec<OrderApplication>,
	#[serde(default)]
	pub assignments: Vec<OrderAssignment>,
}

impl Order {
	/// Wraps a flat row into an aggregate with empty collections.
	pub fn from_row(row: OrderRow) -> Self {
		Self {
			row,
			applications: Vec::new(),
			assignments: Vec::new(),
		}
	}

	pub fn id(&self) -> i64 {
		self.row.id
	}

	pub fn status(&self) -> OrderStatus {
		self.row.status
	}

	/// Worker count derived from the attached assignments, counting
	/// `Active` and `Completed` ones.
	pub fn derived_workers_current(&self) -> u32 {
		self.assignments
			.iter()
			.filter(|a| {
				matches!(
					a.status,
					AssignmentStatus::Active | AssignmentStatus::Completed
				)
			})
			.count() as u32
	}

	/// True if the given loader holds an assignment on this order, in any
	/// status.
	pub fn has_assignment_for(&self, loader_id: i64) -> bool {
		self.assignments.iter().any(|a| a.loader_id == loader_id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_row() -> OrderRow {
		OrderRow {
			id: 7,
			title: "Unload a truck".into(),
			address: "12 Dock St".into(),
			price_per_hour: 2500,
			schedule: ScheduleMode::Exact { at_millis: 1_700_000_000_000 },
			duration_min: 90,
			workers_current: 0,
			workers_total: 2,
			tags: vec!["heavy".into(), "night".into()],
			meta: BTreeMap::new(),
			comment: None,
			status: OrderStatus::Staffing,
			created_by_user_id: 42,
		}
	}

	#[test]
	fn order_row_round_trips_through_json() {
		let row = sample_row();
		let json = serde_json::to_string(&row).unwrap();
		// Wire names are camelCase
		assert!(json.contains("\"pricePerHour\""));
		assert!(json.contains("\"createdByUserId\""));
		let back: OrderRow = serde_json::from_str(&json).unwrap();
		assert_eq!(back, row);
	}

	#[test]
	fn derived_workers_counts_active_and_completed() {
		let mut order = Order::from_row(sample_row());
		for (loader, status) in [
			(1, AssignmentStatus::Active),
			(2, AssignmentStatus::Completed),
			(3, AssignmentStatus::Canceled),
		] {
			order.assignments.push(OrderAssignment {
				order_id: 7,
				loader_id: loader,
				status,
				assigned_at_millis: 0,
				started_at_millis: None,
			});
		}
		assert_eq!(order.derived_workers_current(), 2);
		assert!(order.has_assignment_for(3));
		assert!(!order.has_assignment_for(4));
	}

	#[test]
	fn schedule_mode_exposes_exact_time_only() {
		assert_eq!(ScheduleMode::Soon.at_millis_or_zero(), 0);
		assert_eq!(
			ScheduleMode::Exact { at_millis: 5 }.at_millis_or_zero(),
			5
		);
	}
}
