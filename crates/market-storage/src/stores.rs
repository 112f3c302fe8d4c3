//! Typed per-entity stores over the shared database.
//!
//! Each store is a thin read-side view of one table: point lookups, the
//! per-entity queries the lifecycle engine needs, and `observe_all` live
//! snapshot streams fed by the database's publish-on-commit channel.
//! Mutations are not exposed here; they only exist on
//! [`TxTables`](crate::TxTables) inside a `Database::write` transaction,
//! which keeps the lifecycle engine the sole writer.

use crate::database::{Database, Tables};
use futures::Stream;
use market_types::{
	ApplicationStatus, AssignmentStatus, OrderApplication, OrderAssignment, OrderRow, StoreTable,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Builds a live snapshot stream for one table.
///
/// The stream yields the current snapshot immediately, then a fresh
/// snapshot after every commit touching `table`. A lagged subscriber
/// coalesces to the latest committed snapshot instead of replaying
/// history; the stream ends when the database is dropped. Dropping the
/// stream releases its subscription immediately.
fn observe_table<T, F>(
	db: Arc<Database>,
	table: StoreTable,
	snapshot: F,
) -> impl Stream<Item = Vec<T>> + Send
where
	T: Send + 'static,
	F: Fn(&Tables) -> Vec<T> + Send + Sync + 'static,
{
	let mut rx = db.subscribe();
	async_stream::stream! {
		yield db.read(&snapshot).await;
		loop {
			match rx.recv().await {
				Ok(notice) => {
					if notice.touches(table) {
						yield db.read(&snapshot).await;
					}
				}
				// Missed notices collapse into one latest snapshot.
				Err(RecvError::Lagged(_)) => yield db.read(&snapshot).await,
				Err(RecvError::Closed) => break,
			}
		}
	}
}

/// Read-side view of the orders table.
#[derive(Clone)]
pub struct OrderStore {
	db: Arc<Database>,
}

impl OrderStore {
	pub fn new(db: Arc<Database>) -> Self {
		Self { db }
	}

	/// Point lookup by store id.
	pub async fn get(&self, id: i64) -> Option<OrderRow> {
		self.db.read(|t| t.order(id).cloned()).await
	}

	/// Full table snapshot in insertion order.
	pub async fn all(&self) -> Vec<OrderRow> {
		self.db.read(|t| t.orders().to_vec()).await
	}

	/// Live sequence of full order-row snapshots.
	pub fn observe_all(&self) -> impl Stream<Item = Vec<OrderRow>> + Send {
		observe_table(self.db.clone(), StoreTable::Orders, |t| t.orders().to_vec())
	}
}

/// Read-side view of the applications table.
#[derive(Clone)]
pub struct ApplicationStore {
	db: Arc<Database>,
}

impl ApplicationStore {
	pub fn new(db: Arc<Database>) -> Self {
		Self { db }
	}

	pub async fn get(&self, order_id: i64, loader_id: i64) -> Option<OrderApplication> {
		self.db
			.read(|t| t.application(order_id, loader_id).cloned())
			.await
	}

	pub async fn get_by_order(&self, order_id: i64) -> Vec<OrderApplication> {
		self.db
			.read(|t| t.applications_by_order(order_id).cloned().collect())
			.await
	}

	pub async fn count_by_loader_and_status(
		&self,
		loader_id: i64,
		status: ApplicationStatus,
	) -> usize {
		self.db
			.read(|t| t.count_applications_by_loader_and_status(loader_id, status))
			.await
	}

	/// Counts the loader's applications on one order that sit in any of
	/// the given statuses.
	pub async fn count_by_order_loader_and_statuses(
		&self,
		order_id: i64,
		loader_id: i64,
		statuses: &[ApplicationStatus],
	) -> usize {
		self.db
			.read(|t| {
				t.applications_by_order(order_id)
					.filter(|a| a.loader_id == loader_id && statuses.contains(&a.status))
					.count()
			})
			.await
	}

	/// Live sequence of full application snapshots.
	pub fn observe_all(&self) -> impl Stream<Item = Vec<OrderApplication>> + Send {
		observe_table(self.db.clone(), StoreTable::Applications, |t| {
			t.applications().to_vec()
		})
	}
}

/// Read-side view of the assignments table.
#[derive(Clone)]
pub struct AssignmentStore {
	db: Arc<Database>,
}

impl AssignmentStore {
	pub fn new(db: Arc<Database>) -> Self {
		Self { db }
	}

	pub async fn get_by_order(&self, order_id: i64) -> Vec<OrderAssignment> {
		self.db
			.read(|t| t.assignments_by_order(order_id).cloned().collect())
			.await
	}

	pub async fn count_by_loader_and_status(
		&self,
		loader_id: i64,
		status: AssignmentStatus,
	) -> usize {
		self.db
			.read(|t| t.count_assignments_by_loader_and_status(loader_id, status))
			.await
	}

	/// For each of the given loaders, the orders on which they hold an
	/// assignment in `status`, as `(loader_id, order_id)` pairs.
	pub async fn find_active_by_loaders(
		&self,
		loader_ids: &[i64],
		status: AssignmentStatus,
	) -> Vec<(i64, i64)> {
		self.db
			.read(|t| {
				t.assignments()
					.iter()
					.filter(|a| a.status == status && loader_ids.contains(&a.loader_id))
					.map(|a| (a.loader_id, a.order_id))
					.collect()
			})
			.await
	}

	/// Live sequence of full assignment snapshots.
	pub fn observe_all(&self) -> impl Stream<Item = Vec<OrderAssignment>> + Send {
		observe_table(self.db.clone(), StoreTable::Assignments, |t| {
			t.assignments().to_vec()
		})
	}
}
