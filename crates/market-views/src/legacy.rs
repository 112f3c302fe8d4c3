//! Flat legacy order shape.
//!
//! Older clients consume a flat order model with a four-value status enum
//! and whole-hour durations. The mapping is total and deterministic so a
//! refactor of the canonical aggregate never changes what those clients
//! receive.

use market_types::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

/// Status enum of the legacy shape.
///
/// Canceled and expired orders collapse into one value; the old clients
/// never distinguished them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegacyOrderStatus {
	Available,
	InProgress,
	Completed,
	Cancelled,
}

/// The flat order shape older clients consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderModel {
	pub id: i64,
	pub title: String,
	pub address: String,
	pub price_per_hour: i64,
	/// Scheduling time in epoch millis, `0` for as-soon-as-possible.
	pub scheduled_at_millis: i64,
	/// Whole hours, rounded up, never below 1.
	pub duration_hours: u32,
	pub required_workers: u32,
	/// The legacy shape modeled a single worker per order. Orders carry
	/// many assignments now, so no single worker can be resolved.
	pub worker_id: Option<i64>,
	pub comment: Option<String>,
	pub status: LegacyOrderStatus,
}

fn collapse_status(status: OrderStatus) -> LegacyOrderStatus {
	match status {
		OrderStatus::Staffing => LegacyOrderStatus::Available,
		OrderStatus::InProgress => LegacyOrderStatus::InProgress,
		OrderStatus::Completed => LegacyOrderStatus::Completed,
		OrderStatus::Canceled | OrderStatus::Expired => LegacyOrderStatus::Cancelled,
	}
}

/// Maps the canonical aggregate to the flat legacy shape. Total; never
/// fails.
pub fn to_order_model(order: &Order) -> OrderModel {
	OrderModel {
		id: order.row.id,
		title: order.row.title.clone(),
		address: order.row.address.clone(),
		price_per_hour: order.row.price_per_hour,
		scheduled_at_millis: order.row.schedule.at_millis_or_zero(),
		duration_hours: order.row.duration_min.div_ceil(60).max(1),
		required_workers: order.row.workers_total,
		worker_id: None,
		comment: order.row.comment.clone(),
		status: collapse_status(order.row.status),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use market_types::{AssignmentStatus, OrderAssignment, OrderRow, ScheduleMode};
	use std::collections::BTreeMap;

	fn order(status: OrderStatus, duration_min: u32) -> Order {
		Order::from_row(OrderRow {
			id: 11,
			title: "Unload truck".into(),
			address: "Gate 2".into(),
			price_per_hour: 900,
			schedule: ScheduleMode::Exact {
				at_millis: 1_700_000_000_000,
			},
			duration_min,
			workers_current: 0,
			workers_total: 4,
			tags: vec!["heavy".into()],
			meta: BTreeMap::new(),
			comment: Some("ring twice".into()),
			status,
			created_by_user_id: 3,
		})
	}

	#[test]
	fn statuses_collapse_to_legacy_values() {
		let cases = [
			(OrderStatus::Staffing, LegacyOrderStatus::Available),
			(OrderStatus::InProgress, LegacyOrderStatus::InProgress),
			(OrderStatus::Completed, LegacyOrderStatus::Completed),
			(OrderStatus::Canceled, LegacyOrderStatus::Cancelled),
			(OrderStatus::Expired, LegacyOrderStatus::Cancelled),
		];
		for (status, expected) in cases {
			assert_eq!(to_order_model(&order(status, 60)).status, expected);
		}
	}

	#[test]
	fn duration_rounds_up_to_whole_hours_with_floor_of_one() {
		assert_eq!(to_order_model(&order(OrderStatus::Staffing, 0)).duration_hours, 1);
		assert_eq!(to_order_model(&order(OrderStatus::Staffing, 30)).duration_hours, 1);
		assert_eq!(to_order_model(&order(OrderStatus::Staffing, 61)).duration_hours, 2);
		assert_eq!(to_order_model(&order(OrderStatus::Staffing, 120)).duration_hours, 2);
	}

	#[test]
	fn worker_id_stays_empty_regardless_of_assignments() {
		let mut order = order(OrderStatus::InProgress, 60);
		for loader_id in [20, 21] {
			order.assignments.push(OrderAssignment {
				order_id: order.row.id,
				loader_id,
				status: AssignmentStatus::Active,
				assigned_at_millis: 0,
				started_at_millis: Some(0),
			});
		}

		let model = to_order_model(&order);
		assert_eq!(model.worker_id, None);
		assert_eq!(model.required_workers, 4);
	}
}
