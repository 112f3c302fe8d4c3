//! Role-scoped visibility filtering.
//!
//! Given the signed-in user, restricts which orders a consumer may see.
//! Dispatchers manage their own postings and see nothing else, not even
//! another dispatcher's open staffing. Loaders browse every order still
//! accepting applications plus the orders they hold an assignment on, in
//! any assignment status, so their work history stays visible after an
//! order leaves staffing.

use market_types::{CurrentUser, Order, OrderStatus, UserRole};

/// Filters a snapshot of orders down to what `user` may see.
///
/// Preserves the input order. Pure function over the snapshot; the caller
/// decides how fresh that snapshot is.
pub fn filter_for_user(orders: &[Order], user: &CurrentUser) -> Vec<Order> {
	orders
		.iter()
		.filter(|order| match user.role {
			UserRole::Dispatcher => order.row.created_by_user_id == user.id,
			UserRole::Loader => {
				order.status() == OrderStatus::Staffing || order.has_assignment_for(user.id)
			},
		})
		.cloned()
		.collect()
}
