//! Graph mapper assembling flat rows into order aggregates.
//!
//! Pure and deterministic: returned orders follow the input order order,
//! and each aggregate's applications and assignments preserve their input
//! relative order. Related rows referencing an order absent from the batch
//! are dropped; partial batches and foreign rows must never poison the
//! graph.

use market_types::{Order, OrderApplication, OrderAssignment, OrderRow};
use std::collections::HashMap;

/// Assembles order aggregates from flat table snapshots.
pub fn to_domain_orders(
	orders: Vec<OrderRow>,
	applications: Vec<OrderApplication>,
	assignments: Vec<OrderAssignment>,
) -> Vec<Order> {
	let mut by_id: HashMap<i64, usize> = HashMap::with_capacity(orders.len());
	let mut result: Vec<Order> = orders
		.into_iter()
		.enumerate()
		.map(|(index, row)| {
			by_id.insert(row.id, index);
			Order::from_row(row)
		})
		.collect();

	for app in applications {
		if let Some(&index) = by_id.get(&app.order_id) {
			result[index].applications.push(app);
		}
	}
	for assignment in assignments {
		if let Some(&index) = by_id.get(&assignment.order_id) {
			result[index].assignments.push(assignment);
		}
	}

	result
}
