//! Card shape for UI lists.
//!
//! The card carries a few fields that live in the order's open metadata
//! bag. Metadata values are free-form strings, so parsing is defensive:
//! a missing or unparsable value falls back to a documented default and
//! the mapping never fails.

use market_types::{meta_keys, Order, OrderStatus};
use serde::{Deserialize, Serialize};

/// The card shape UI lists render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCard {
	pub id: i64,
	pub title: String,
	pub address: String,
	pub price_per_hour: i64,
	/// Scheduling time in epoch millis, `0` for as-soon-as-possible.
	pub scheduled_at_millis: i64,
	pub duration_min: u32,
	pub workers_current: u32,
	pub workers_total: u32,
	pub tags: Vec<String>,
	/// From meta `minWorkerRating`; defaults to `0.0` (no minimum).
	pub min_worker_rating: f32,
	/// From meta `dispatcherId`; defaults to `0` (unknown).
	pub dispatcher_id: i64,
	/// From meta `createdAt`; defaults to the order's scheduling time.
	pub created_at_millis: i64,
	pub status: OrderStatus,
}

fn meta_parsed<T: std::str::FromStr>(order: &Order, key: &str) -> Option<T> {
	order.row.meta.get(key).and_then(|v| v.parse().ok())
}

/// Maps the canonical aggregate to the card shape. Total; never fails.
pub fn to_order_card(order: &Order) -> OrderCard {
	let scheduled_at_millis = order.row.schedule.at_millis_or_zero();
	OrderCard {
		id: order.row.id,
		title: order.row.title.clone(),
		address: order.row.address.clone(),
		price_per_hour: order.row.price_per_hour,
		scheduled_at_millis,
		duration_min: order.row.duration_min,
		workers_current: order.row.workers_current,
		workers_total: order.row.workers_total,
		tags: order.row.tags.clone(),
		min_worker_rating: meta_parsed(order, meta_keys::MIN_WORKER_RATING).unwrap_or(0.0),
		dispatcher_id: meta_parsed(order, meta_keys::DISPATCHER_ID).unwrap_or(0),
		created_at_millis: meta_parsed(order, meta_keys::CREATED_AT)
			.unwrap_or(scheduled_at_millis),
		status: order.row.status,
	}
}
