//! Orders repository: the lifecycle engine.
//!
//! The repository is the only writer in the system. Every lifecycle
//! operation runs its checks and its writes inside one database
//! transaction, so cross-entity invariants hold at every commit and a
//! reactive subscriber never observes a partially updated order. Reads
//! come back as deep-copied aggregates; callers inspect them, they never
//! feed them back as writes.

use crate::graph::to_domain_orders;
use crate::state::{
	ensure_application_transition, ensure_order_transition, StateError,
};
use futures::Stream;
use market_config::EngineConfig;
use market_identity::IdentityService;
use market_storage::{
	ApplicationStore, AssignmentStore, Database, OrderStore, StorageError, Tables, TxTables,
};
use market_types::{
	meta_keys, ApplicationStatus, AssignmentStatus, Order, OrderApplication, OrderAssignment,
	OrderRow, OrderStatus,
};
use market_views::filter_for_user;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;

/// Errors raised by lifecycle operations.
///
/// A failed operation always leaves the store unchanged; retrying is the
/// caller's decision.
#[derive(Debug, Error)]
pub enum OrdersError {
	/// Malformed input, e.g. a non-positive worker count.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The referenced order or application is absent.
	#[error("Not found: {0}")]
	NotFound(String),
	/// The operation collides with existing state, e.g. a duplicate
	/// application or exhausted worker capacity.
	#[error("Conflict: {0}")]
	Conflict(String),
	/// The operation is not allowed from the entity's current status.
	#[error("Invalid state: {0}")]
	InvalidState(String),
	/// The identity provider failed to resolve the current user.
	#[error("Identity error: {0}")]
	Identity(String),
	/// Transaction or IO failure from the underlying store.
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for OrdersError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound => OrdersError::NotFound("Row not found".into()),
			other => OrdersError::Storage(other.to_string()),
		}
	}
}

impl From<StateError> for OrdersError {
	fn from(err: StateError) -> Self {
		OrdersError::InvalidState(err.to_string())
	}
}

/// The lifecycle engine over orders, applications and assignments.
pub struct OrdersRepository {
	db: Arc<Database>,
	orders: OrderStore,
	applications: ApplicationStore,
	assignments: AssignmentStore,
	identity: Arc<IdentityService>,
	engine: EngineConfig,
}

impl OrdersRepository {
	pub fn new(db: Arc<Database>, identity: Arc<IdentityService>, engine: EngineConfig) -> Self {
		Self {
			orders: OrderStore::new(db.clone()),
			applications: ApplicationStore::new(db.clone()),
			assignments: AssignmentStore::new(db.clone()),
			db,
			identity,
			engine,
		}
	}

	/// Typed read access to the orders table.
	pub fn orders(&self) -> &OrderStore {
		&self.orders
	}

	/// Typed read access to the applications table.
	pub fn applications(&self) -> &ApplicationStore {
		&self.applications
	}

	/// Typed read access to the assignments table.
	pub fn assignments(&self) -> &AssignmentStore {
		&self.assignments
	}

	async fn snapshot(db: &Database) -> Vec<Order> {
		let (orders, applications, assignments) = db
			.read(|t| {
				(
					t.orders().to_vec(),
					t.applications().to_vec(),
					t.assignments().to_vec(),
				)
			})
			.await;
		to_domain_orders(orders, applications, assignments)
	}

	/// Live sequence of full order-aggregate snapshots.
	///
	/// Re-derives the graph on every committed write. Emits the current
	/// snapshot immediately; a slow consumer coalesces to the latest
	/// snapshot rather than replaying history. Ends when the database is
	/// dropped.
	pub fn observe_orders(&self) -> impl Stream<Item = Vec<Order>> + Send {
		let db = self.db.clone();
		let mut rx = db.subscribe();
		async_stream::stream! {
			yield Self::snapshot(&db).await;
			loop {
				match rx.recv().await {
					// Every commit touches at least one of the three tables.
					Ok(_) | Err(RecvError::Lagged(_)) => yield Self::snapshot(&db).await,
					Err(RecvError::Closed) => break,
				}
			}
		}
	}

	/// Live sequence of the orders the current user may see.
	///
	/// Re-emits on every commit and on every sign-in state change. While
	/// nobody is signed in the stream yields empty snapshots.
	pub fn observe_visible_orders(&self) -> impl Stream<Item = Vec<Order>> + Send {
		let db = self.db.clone();
		let mut commits = db.subscribe();
		let mut user_rx = self.identity.observe_current_user();
		async_stream::stream! {
			loop {
				let user = user_rx.borrow_and_update().clone();
				let visible = match &user {
					Some(user) => filter_for_user(&Self::snapshot(&db).await, user),
					None => Vec::new(),
				};
				yield visible;

				tokio::select! {
					changed = user_rx.changed() => {
						if changed.is_err() {
							break;
						}
					}
					notice = commits.recv() => {
						match notice {
							Ok(_) | Err(RecvError::Lagged(_)) => {}
							Err(RecvError::Closed) => break,
						}
					}
				}
			}
		}
	}

	/// Point lookup returning the full aggregate.
	pub async fn get_order_by_id(&self, order_id: i64) -> Result<Order, OrdersError> {
		self.db
			.read(|t| {
				t.order(order_id).map(|row| {
					let mut order = Order::from_row(row.clone());
					order.applications = t.applications_by_order(order_id).cloned().collect();
					order.assignments = t.assignments_by_order(order_id).cloned().collect();
					order
				})
			})
			.await
			.ok_or_else(|| OrdersError::NotFound(format!("Order {}", order_id)))
	}

	/// Creates a new order. Status is forced to `Staffing` and the worker
	/// count starts at zero regardless of what the draft carries.
	pub async fn create_order(&self, mut draft: OrderRow) -> Result<Order, OrdersError> {
		if draft.workers_total == 0 {
			return Err(OrdersError::Validation(
				"workers_total must be positive".into(),
			));
		}
		if draft.price_per_hour < 0 {
			return Err(OrdersError::Validation(
				"price_per_hour cannot be negative".into(),
			));
		}

		draft.status = OrderStatus::Staffing;
		draft.workers_current = 0;
		let id = self
			.db
			.write(|tx| Ok::<_, OrdersError>(tx.insert_order(draft)))
			.await?;

		tracing::info!(order_id = id, "Created order");
		self.get_order_by_id(id).await
	}

	/// Counts the loader's open applications on orders still in a live
	/// status. This is the number the active-application limit compares
	/// against.
	pub async fn count_active_applied_applications(&self, loader_id: i64) -> usize {
		self.db
			.read(|t| Self::count_open_on_active(t, loader_id))
			.await
	}

	fn count_open_on_active(tables: &Tables, loader_id: i64) -> usize {
		tables
			.applications()
			.iter()
			.filter(|a| {
				a.loader_id == loader_id
					&& a.status.is_open()
					&& tables
						.order(a.order_id)
						.is_some_and(|o| o.status.is_active())
			})
			.count()
	}

	/// True if the loader currently holds an active assignment on any
	/// order.
	pub async fn has_active_assignment(&self, loader_id: i64) -> bool {
		self.assignments
			.count_by_loader_and_status(loader_id, AssignmentStatus::Active)
			.await > 0
	}

	fn apply_tx(
		tx: &mut TxTables,
		order_id: i64,
		loader_id: i64,
		now_millis: i64,
		rating_snapshot: Option<f32>,
	) -> Result<(), OrdersError> {
		// A non-staffing order is as good as absent for applicants.
		match tx.order(order_id) {
			Some(order) if order.status == OrderStatus::Staffing => {}
			_ => return Err(OrdersError::NotFound(format!("Staffing order {}", order_id))),
		}

		if tx
			.application(order_id, loader_id)
			.is_some_and(|a| a.status != ApplicationStatus::Withdrawn)
		{
			return Err(OrdersError::Conflict(format!(
				"Loader {} already applied to order {}",
				loader_id, order_id
			)));
		}
		if tx.has_assignment_in_status(loader_id, AssignmentStatus::Active) {
			return Err(OrdersError::Conflict(format!(
				"Loader {} already holds an active assignment",
				loader_id
			)));
		}

		tx.upsert_application(OrderApplication {
			order_id,
			loader_id,
			status: ApplicationStatus::Applied,
			applied_at_millis: now_millis,
			rating_snapshot,
		});
		Ok(())
	}

	/// Applies a loader to a staffing order.
	///
	/// A withdrawn application may re-apply; any other existing
	/// application, or an active assignment elsewhere, conflicts. The
	/// rating snapshot is taken once at application time and never
	/// updated.
	pub async fn apply_to_order(
		&self,
		order_id: i64,
		loader_id: i64,
		now_millis: i64,
		rating_snapshot: Option<f32>,
	) -> Result<(), OrdersError> {
		self.db
			.write(|tx| Self::apply_tx(tx, order_id, loader_id, now_millis, rating_snapshot))
			.await
	}

	/// Applies the signed-in loader to a staffing order, enforcing the
	/// open-application limit inside the same transaction.
	pub async fn apply_as_current_user(
		&self,
		order_id: i64,
		now_millis: i64,
		rating_snapshot: Option<f32>,
	) -> Result<(), OrdersError> {
		let user = self
			.identity
			.current_user()
			.await
			.map_err(|e| OrdersError::Identity(e.to_string()))?
			.ok_or_else(|| OrdersError::Validation("No user is signed in".into()))?;
		if user.role != market_types::UserRole::Loader {
			return Err(OrdersError::Validation(
				"Only loaders can apply to orders".into(),
			));
		}

		let limit = self.engine.max_active_applications as usize;
		self.db
			.write(|tx| {
				if Self::count_open_on_active(tx, user.id) >= limit {
					return Err(OrdersError::Conflict(format!(
						"Loader {} reached the limit of {} open applications",
						user.id, limit
					)));
				}
				Self::apply_tx(tx, order_id, user.id, now_millis, rating_snapshot)
			})
			.await
	}

	/// Withdraws a loader's application. Terminal applications cannot be
	/// withdrawn again.
	pub async fn withdraw_application(
		&self,
		order_id: i64,
		loader_id: i64,
	) -> Result<(), OrdersError> {
		self.db
			.write(|tx| {
				let status = tx
					.application(order_id, loader_id)
					.ok_or_else(|| {
						OrdersError::NotFound(format!(
							"Application of loader {} on order {}",
							loader_id, order_id
						))
					})?
					.status;
				ensure_application_transition(status, ApplicationStatus::Withdrawn)?;
				tx.update_application(order_id, loader_id, |a| {
					a.status = ApplicationStatus::Withdrawn;
				});
				Ok(())
			})
			.await
	}

	/// Marks an application as selected for assignment at start.
	///
	/// Fails with `Conflict` when the order already has as many selected
	/// applications as it needs workers.
	pub async fn select_applicant(&self, order_id: i64, loader_id: i64) -> Result<(), OrdersError> {
		self.db
			.write(|tx| {
				let order = tx
					.order(order_id)
					.ok_or_else(|| OrdersError::NotFound(format!("Order {}", order_id)))?;
				if order.status != OrderStatus::Staffing {
					return Err(OrdersError::InvalidState(format!(
						"Cannot select applicants on a {} order",
						order.status
					)));
				}
				let workers_total = order.workers_total;

				let status = tx
					.application(order_id, loader_id)
					.ok_or_else(|| {
						OrdersError::NotFound(format!(
							"Application of loader {} on order {}",
							loader_id, order_id
						))
					})?
					.status;
				ensure_application_transition(status, ApplicationStatus::Selected)?;

				let selected = tx
					.applications_by_order(order_id)
					.filter(|a| a.status == ApplicationStatus::Selected)
					.count();
				if selected as u32 >= workers_total {
					return Err(OrdersError::Conflict(format!(
						"Order {} already has {} selected applicants",
						order_id, selected
					)));
				}

				tx.update_application(order_id, loader_id, |a| {
					a.status = ApplicationStatus::Selected;
				});
				Ok(())
			})
			.await
	}

	/// Returns a selected application to `Applied`. Only possible while
	/// the order is still staffing.
	pub async fn unselect_applicant(
		&self,
		order_id: i64,
		loader_id: i64,
	) -> Result<(), OrdersError> {
		self.db
			.write(|tx| {
				let order_status = tx
					.order(order_id)
					.ok_or_else(|| OrdersError::NotFound(format!("Order {}", order_id)))?
					.status;
				if order_status != OrderStatus::Staffing {
					return Err(OrdersError::InvalidState(format!(
						"Cannot unselect applicants on a {} order",
						order_status
					)));
				}

				let status = tx
					.application(order_id, loader_id)
					.ok_or_else(|| {
						OrdersError::NotFound(format!(
							"Application of loader {} on order {}",
							loader_id, order_id
						))
					})?
					.status;
				ensure_application_transition(status, ApplicationStatus::Applied)?;
				tx.update_application(order_id, loader_id, |a| {
					a.status = ApplicationStatus::Applied;
				});
				Ok(())
			})
			.await
	}

	/// Starts a staffing order.
	///
	/// In one transaction: every selected application becomes an active
	/// assignment with `started_at_millis` stamped, every application
	/// still merely applied is rejected, and the order moves to
	/// `InProgress` with its worker count set to the assignment count.
	/// A second start observes the committed `InProgress` status and fails
	/// with `InvalidState`.
	pub async fn start_order(
		&self,
		order_id: i64,
		started_at_millis: i64,
	) -> Result<(), OrdersError> {
		let (assigned, rejected) = self
			.db
			.write(|tx| {
				let status = tx
					.order(order_id)
					.ok_or_else(|| OrdersError::NotFound(format!("Order {}", order_id)))?
					.status;
				ensure_order_transition(status, OrderStatus::InProgress)?;

				let selected: Vec<i64> = tx
					.applications_by_order(order_id)
					.filter(|a| a.status == ApplicationStatus::Selected)
					.map(|a| a.loader_id)
					.collect();
				for &loader_id in &selected {
					tx.upsert_assignment(OrderAssignment {
						order_id,
						loader_id,
						status: AssignmentStatus::Active,
						assigned_at_millis: started_at_millis,
						started_at_millis: Some(started_at_millis),
					});
				}
				let rejected = tx.update_application_status_by_order(
					order_id,
					&[ApplicationStatus::Applied],
					ApplicationStatus::Rejected,
				);

				let assigned = selected.len() as u32;
				tx.update_order(order_id, |o| {
					o.status = OrderStatus::InProgress;
					o.workers_current = assigned;
				});
				Ok::<_, OrdersError>((assigned, rejected))
			})
			.await?;

		tracing::info!(order_id, assigned, rejected, "Started order");
		Ok(())
	}

	/// Cancels a live order, recording the reason in its metadata.
	///
	/// Active assignments are canceled and open applications rejected in
	/// the same transaction; nothing is deleted.
	pub async fn cancel_order(
		&self,
		order_id: i64,
		reason: Option<String>,
	) -> Result<(), OrdersError> {
		self.db
			.write(|tx| {
				let status = tx
					.order(order_id)
					.ok_or_else(|| OrdersError::NotFound(format!("Order {}", order_id)))?
					.status;
				ensure_order_transition(status, OrderStatus::Canceled)?;

				tx.update_order(order_id, |o| {
					o.status = OrderStatus::Canceled;
					if let Some(reason) = reason {
						o.meta.insert(meta_keys::CANCEL_REASON.to_string(), reason);
					}
				});
				tx.update_application_status_by_order(
					order_id,
					&[ApplicationStatus::Applied, ApplicationStatus::Selected],
					ApplicationStatus::Rejected,
				);
				tx.update_assignment_status_by_order(
					order_id,
					AssignmentStatus::Active,
					AssignmentStatus::Canceled,
				);
				Ok::<_, OrdersError>(())
			})
			.await?;

		tracing::info!(order_id, "Canceled order");
		Ok(())
	}

	/// Completes an in-progress order, completing its active assignments
	/// with it.
	pub async fn complete_order(&self, order_id: i64) -> Result<(), OrdersError> {
		self.db
			.write(|tx| {
				let status = tx
					.order(order_id)
					.ok_or_else(|| OrdersError::NotFound(format!("Order {}", order_id)))?
					.status;
				ensure_order_transition(status, OrderStatus::Completed)?;

				tx.update_order(order_id, |o| o.status = OrderStatus::Completed);
				tx.update_assignment_status_by_order(
					order_id,
					AssignmentStatus::Active,
					AssignmentStatus::Completed,
				);
				Ok::<_, OrdersError>(())
			})
			.await?;

		tracing::info!(order_id, "Completed order");
		Ok(())
	}

	/// Re-loads committed state from the backend and re-notifies every
	/// subscriber.
	pub async fn refresh(&self) -> Result<(), OrdersError> {
		self.db.refresh().await.map_err(OrdersError::from)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;
	use market_identity::implementations::fixed::FixedIdentity;
	use market_storage::implementations::memory::MemoryBackend;
	use market_types::{CurrentUser, ScheduleMode, UserRole};
	use std::collections::BTreeMap;

	fn draft(workers_total: u32) -> OrderRow {
		OrderRow {
			id: 0,
			title: "Unload containers".into(),
			address: "Pier 4".into(),
			price_per_hour: 1500,
			schedule: ScheduleMode::Soon,
			duration_min: 120,
			workers_current: 0,
			workers_total,
			tags: Vec::new(),
			meta: BTreeMap::new(),
			comment: None,
			status: OrderStatus::Staffing,
			created_by_user_id: 1,
		}
	}

	fn loader(id: i64) -> CurrentUser {
		CurrentUser {
			id,
			role: UserRole::Loader,
		}
	}

	async fn repo_with(identity: FixedIdentity, engine: EngineConfig) -> OrdersRepository {
		let db = Database::open(Box::new(MemoryBackend::new())).await.unwrap();
		OrdersRepository::new(
			db,
			Arc::new(IdentityService::new(Box::new(identity))),
			engine,
		)
	}

	async fn repo() -> OrdersRepository {
		repo_with(FixedIdentity::new(loader(20)), EngineConfig::default()).await
	}

	#[tokio::test]
	async fn create_order_forces_staffing_and_validates_input() {
		let repo = repo().await;

		let mut bad = draft(0);
		bad.workers_total = 0;
		assert!(matches!(
			repo.create_order(bad).await,
			Err(OrdersError::Validation(_))
		));

		let mut negative = draft(2);
		negative.price_per_hour = -1;
		assert!(matches!(
			repo.create_order(negative).await,
			Err(OrdersError::Validation(_))
		));

		let mut sneaky = draft(2);
		sneaky.status = OrderStatus::InProgress;
		sneaky.workers_current = 9;
		let order = repo.create_order(sneaky).await.unwrap();
		assert_eq!(order.status(), OrderStatus::Staffing);
		assert_eq!(order.row.workers_current, 0);
	}

	#[tokio::test]
	async fn apply_then_withdraw_leaves_nothing_active() {
		let repo = repo().await;
		let order = repo.create_order(draft(2)).await.unwrap();

		repo.apply_to_order(order.id(), 20, 1000, Some(4.2)).await.unwrap();
		repo.withdraw_application(order.id(), 20).await.unwrap();

		let order = repo.get_order_by_id(order.id()).await.unwrap();
		assert_eq!(order.applications[0].status, ApplicationStatus::Withdrawn);
		assert!(order.assignments.is_empty());
		assert_eq!(repo.count_active_applied_applications(20).await, 0);

		// A withdrawn loader may apply again.
		repo.apply_to_order(order.id(), 20, 2000, None).await.unwrap();
	}

	#[tokio::test]
	async fn duplicate_application_conflicts() {
		let repo = repo().await;
		let order = repo.create_order(draft(2)).await.unwrap();

		repo.apply_to_order(order.id(), 20, 1000, None).await.unwrap();
		assert!(matches!(
			repo.apply_to_order(order.id(), 20, 2000, None).await,
			Err(OrdersError::Conflict(_))
		));
	}

	#[tokio::test]
	async fn applying_to_missing_or_started_order_is_not_found() {
		let repo = repo().await;
		assert!(matches!(
			repo.apply_to_order(99, 20, 0, None).await,
			Err(OrdersError::NotFound(_))
		));

		let order = repo.create_order(draft(1)).await.unwrap();
		repo.apply_to_order(order.id(), 20, 0, None).await.unwrap();
		repo.select_applicant(order.id(), 20).await.unwrap();
		repo.start_order(order.id(), 5000).await.unwrap();

		assert!(matches!(
			repo.apply_to_order(order.id(), 21, 0, None).await,
			Err(OrdersError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn start_assigns_selected_and_rejects_applied() {
		// Staffing scenario: capacity 2, three applicants, two selected.
		let repo = repo().await;
		let order = repo.create_order(draft(2)).await.unwrap();
		for loader_id in [20, 21, 22] {
			repo.apply_to_order(order.id(), loader_id, 0, None).await.unwrap();
		}
		repo.select_applicant(order.id(), 20).await.unwrap();
		repo.select_applicant(order.id(), 21).await.unwrap();

		repo.start_order(order.id(), 9000).await.unwrap();

		let order = repo.get_order_by_id(order.id()).await.unwrap();
		assert_eq!(order.status(), OrderStatus::InProgress);
		assert_eq!(order.row.workers_current, 2);
		assert_eq!(order.assignments.len(), 2);
		assert!(order
			.assignments
			.iter()
			.all(|a| a.status == AssignmentStatus::Active
				&& a.started_at_millis == Some(9000)));

		let rejected: Vec<i64> = order
			.applications
			.iter()
			.filter(|a| a.status == ApplicationStatus::Rejected)
			.map(|a| a.loader_id)
			.collect();
		assert_eq!(rejected, vec![22]);
		assert!(order.row.workers_current <= order.row.workers_total);
		assert_eq!(order.derived_workers_current(), order.row.workers_current);
	}

	#[tokio::test]
	async fn start_order_fails_the_second_time() {
		let repo = repo().await;
		let order = repo.create_order(draft(1)).await.unwrap();
		repo.apply_to_order(order.id(), 20, 0, None).await.unwrap();
		repo.select_applicant(order.id(), 20).await.unwrap();

		repo.start_order(order.id(), 100).await.unwrap();
		assert!(matches!(
			repo.start_order(order.id(), 200).await,
			Err(OrdersError::InvalidState(_))
		));

		// Still exactly one set of assignments.
		let order = repo.get_order_by_id(order.id()).await.unwrap();
		assert_eq!(order.assignments.len(), 1);
	}

	#[tokio::test]
	async fn selection_respects_worker_capacity() {
		let repo = repo().await;
		let order = repo.create_order(draft(2)).await.unwrap();
		for loader_id in [20, 21, 22] {
			repo.apply_to_order(order.id(), loader_id, 0, None).await.unwrap();
		}
		repo.select_applicant(order.id(), 20).await.unwrap();
		repo.select_applicant(order.id(), 21).await.unwrap();

		assert!(matches!(
			repo.select_applicant(order.id(), 22).await,
			Err(OrdersError::Conflict(_))
		));

		// Unselecting frees a slot.
		repo.unselect_applicant(order.id(), 20).await.unwrap();
		repo.select_applicant(order.id(), 22).await.unwrap();
	}

	#[tokio::test]
	async fn assigned_loader_cannot_apply_elsewhere() {
		let repo = repo().await;
		let first = repo.create_order(draft(1)).await.unwrap();
		repo.apply_to_order(first.id(), 20, 0, None).await.unwrap();
		repo.select_applicant(first.id(), 20).await.unwrap();
		repo.start_order(first.id(), 100).await.unwrap();

		let second = repo.create_order(draft(1)).await.unwrap();
		assert!(matches!(
			repo.apply_to_order(second.id(), 20, 0, None).await,
			Err(OrdersError::Conflict(_))
		));
		assert!(repo.has_active_assignment(20).await);

		// Completing the first order frees the loader.
		repo.complete_order(first.id()).await.unwrap();
		repo.apply_to_order(second.id(), 20, 0, None).await.unwrap();
	}

	#[tokio::test]
	async fn cancel_records_reason_and_settles_rows() {
		let repo = repo().await;
		let order = repo.create_order(draft(2)).await.unwrap();
		repo.apply_to_order(order.id(), 20, 0, None).await.unwrap();
		repo.apply_to_order(order.id(), 21, 0, None).await.unwrap();
		repo.select_applicant(order.id(), 20).await.unwrap();
		repo.start_order(order.id(), 100).await.unwrap();

		repo.cancel_order(order.id(), Some("rained out".into()))
			.await
			.unwrap();

		let order = repo.get_order_by_id(order.id()).await.unwrap();
		assert_eq!(order.status(), OrderStatus::Canceled);
		assert_eq!(
			order.row.meta.get(meta_keys::CANCEL_REASON).map(String::as_str),
			Some("rained out")
		);
		assert!(order
			.assignments
			.iter()
			.all(|a| a.status == AssignmentStatus::Canceled));

		assert!(matches!(
			repo.cancel_order(order.id(), None).await,
			Err(OrdersError::InvalidState(_))
		));
	}

	#[tokio::test]
	async fn complete_order_completes_active_assignments() {
		let repo = repo().await;
		let order = repo.create_order(draft(1)).await.unwrap();
		repo.apply_to_order(order.id(), 20, 0, None).await.unwrap();
		repo.select_applicant(order.id(), 20).await.unwrap();
		repo.start_order(order.id(), 100).await.unwrap();

		// Cannot complete a staffing order.
		let other = repo.create_order(draft(1)).await.unwrap();
		assert!(matches!(
			repo.complete_order(other.id()).await,
			Err(OrdersError::InvalidState(_))
		));

		repo.complete_order(order.id()).await.unwrap();
		let order = repo.get_order_by_id(order.id()).await.unwrap();
		assert_eq!(order.status(), OrderStatus::Completed);
		assert_eq!(order.assignments[0].status, AssignmentStatus::Completed);
		// Completed assignments still count toward the worker tally.
		assert_eq!(order.derived_workers_current(), 1);
	}

	#[tokio::test]
	async fn apply_as_current_user_enforces_open_application_limit() {
		let engine = EngineConfig {
			max_active_applications: 1,
		};
		let repo = repo_with(FixedIdentity::new(loader(20)), engine).await;
		let first = repo.create_order(draft(1)).await.unwrap();
		let second = repo.create_order(draft(1)).await.unwrap();

		repo.apply_as_current_user(first.id(), 0, None).await.unwrap();
		assert!(matches!(
			repo.apply_as_current_user(second.id(), 0, None).await,
			Err(OrdersError::Conflict(_))
		));

		// Withdrawing frees the slot.
		repo.withdraw_application(first.id(), 20).await.unwrap();
		repo.apply_as_current_user(second.id(), 0, None).await.unwrap();
	}

	#[tokio::test]
	async fn apply_as_current_user_requires_a_signed_in_loader() {
		let repo = repo_with(FixedIdentity::signed_out(), EngineConfig::default()).await;
		let order = repo.create_order(draft(1)).await.unwrap();
		assert!(matches!(
			repo.apply_as_current_user(order.id(), 0, None).await,
			Err(OrdersError::Validation(_))
		));

		let dispatcher = CurrentUser {
			id: 1,
			role: UserRole::Dispatcher,
		};
		let repo = repo_with(FixedIdentity::new(dispatcher), EngineConfig::default()).await;
		let order = repo.create_order(draft(1)).await.unwrap();
		assert!(matches!(
			repo.apply_as_current_user(order.id(), 0, None).await,
			Err(OrdersError::Validation(_))
		));
	}

	#[tokio::test]
	async fn observe_orders_rederives_the_graph_per_commit() {
		let repo = repo().await;
		let mut stream = Box::pin(repo.observe_orders());
		assert!(stream.next().await.unwrap().is_empty());

		let order = repo.create_order(draft(2)).await.unwrap();
		assert_eq!(stream.next().await.unwrap().len(), 1);

		repo.apply_to_order(order.id(), 20, 0, None).await.unwrap();
		let snapshot = stream.next().await.unwrap();
		assert_eq!(snapshot[0].applications.len(), 1);
	}

	#[tokio::test]
	async fn observe_visible_orders_is_empty_when_signed_out() {
		let repo = repo_with(FixedIdentity::signed_out(), EngineConfig::default()).await;
		repo.create_order(draft(1)).await.unwrap();

		let mut stream = Box::pin(repo.observe_visible_orders());
		assert!(stream.next().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn observe_visible_orders_filters_for_the_loader() {
		let repo = repo().await;
		let staffing = repo.create_order(draft(2)).await.unwrap();
		let started = repo.create_order(draft(1)).await.unwrap();
		repo.apply_to_order(started.id(), 99, 0, None).await.unwrap();
		repo.select_applicant(started.id(), 99).await.unwrap();
		repo.start_order(started.id(), 100).await.unwrap();

		// Loader 20: sees the staffing order, not loader 99's job.
		let mut stream = Box::pin(repo.observe_visible_orders());
		let visible = stream.next().await.unwrap();
		let ids: Vec<i64> = visible.iter().map(Order::id).collect();
		assert_eq!(ids, vec![staffing.id()]);
	}
}
