//! Transactional database over the marketplace tables.
//!
//! The [`Database`] owns the committed tables behind a read-write lock and
//! is the single transaction boundary of the system: every mutation runs
//! inside [`Database::write`], which stages a copy of the tables, applies
//! the caller's changes, persists the document through the backend and
//! only then swaps the staged tables in and notifies subscribers. A
//! failure at any point leaves committed state untouched.

use crate::{DocumentBackend, MigrationRegistry, StorageError, SCHEMA_VERSION};
use market_types::{
	ApplicationStatus, AssignmentStatus, OrderApplication, OrderAssignment, OrderRow, StoreTable,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Capacity of the commit notification channel. Slow subscribers that fall
/// further behind than this coalesce to the latest snapshot.
const COMMIT_CHANNEL_CAPACITY: usize = 64;

/// The three persisted tables plus the document header.
///
/// Row order is insertion order and is preserved across commits; the
/// graph mapper's determinism relies on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tables {
	schema_version: u32,
	next_order_id: i64,
	orders: Vec<OrderRow>,
	applications: Vec<OrderApplication>,
	assignments: Vec<OrderAssignment>,
}

impl Tables {
	/// An empty store at the current schema version.
	pub fn fresh() -> Self {
		Self {
			schema_version: SCHEMA_VERSION,
			next_order_id: 1,
			orders: Vec::new(),
			applications: Vec::new(),
			assignments: Vec::new(),
		}
	}

	pub fn schema_version(&self) -> u32 {
		self.schema_version
	}

	pub fn orders(&self) -> &[OrderRow] {
		&self.orders
	}

	pub fn applications(&self) -> &[OrderApplication] {
		&self.applications
	}

	pub fn assignments(&self) -> &[OrderAssignment] {
		&self.assignments
	}

	pub fn order(&self, id: i64) -> Option<&OrderRow> {
		self.orders.iter().find(|o| o.id == id)
	}

	pub fn application(&self, order_id: i64, loader_id: i64) -> Option<&OrderApplication> {
		self.applications
			.iter()
			.find(|a| a.order_id == order_id && a.loader_id == loader_id)
	}

	pub fn assignment(&self, order_id: i64, loader_id: i64) -> Option<&OrderAssignment> {
		self.assignments
			.iter()
			.find(|a| a.order_id == order_id && a.loader_id == loader_id)
	}

	pub fn applications_by_order(
		&self,
		order_id: i64,
	) -> impl Iterator<Item = &OrderApplication> {
		self.applications.iter().filter(move |a| a.order_id == order_id)
	}

	pub fn assignments_by_order(
		&self,
		order_id: i64,
	) -> impl Iterator<Item = &OrderAssignment> {
		self.assignments.iter().filter(move |a| a.order_id == order_id)
	}

	/// True if the loader holds any assignment in the given status.
	pub fn has_assignment_in_status(&self, loader_id: i64, status: AssignmentStatus) -> bool {
		self.assignments
			.iter()
			.any(|a| a.loader_id == loader_id && a.status == status)
	}

	pub fn count_applications_by_loader_and_status(
		&self,
		loader_id: i64,
		status: ApplicationStatus,
	) -> usize {
		self.applications
			.iter()
			.filter(|a| a.loader_id == loader_id && a.status == status)
			.count()
	}

	pub fn count_assignments_by_loader_and_status(
		&self,
		loader_id: i64,
		status: AssignmentStatus,
	) -> usize {
		self.assignments
			.iter()
			.filter(|a| a.loader_id == loader_id && a.status == status)
			.count()
	}
}

/// Notification broadcast after every committed write, naming the tables
/// the transaction touched.
#[derive(Debug, Clone)]
pub struct CommitNotice {
	touched: Vec<StoreTable>,
}

impl CommitNotice {
	fn new(touched: Vec<StoreTable>) -> Self {
		Self { touched }
	}

	/// A notice claiming every table changed; used after a full re-sync.
	pub fn all_tables() -> Self {
		Self::new(StoreTable::all().collect())
	}

	pub fn touches(&self, table: StoreTable) -> bool {
		self.touched.contains(&table)
	}
}

/// Mutable view of the staged tables handed to a `write` closure.
///
/// Reads go through `Deref<Target = Tables>`; every mutation goes through
/// a named method so the transaction records which tables it touched.
pub struct TxTables<'a> {
	tables: &'a mut Tables,
	touched: HashSet<StoreTable>,
}

impl Deref for TxTables<'_> {
	type Target = Tables;

	fn deref(&self) -> &Tables {
		self.tables
	}
}

impl<'a> TxTables<'a> {
	fn new(tables: &'a mut Tables) -> Self {
		Self {
			tables,
			touched: HashSet::new(),
		}
	}

	fn into_touched(self) -> Vec<StoreTable> {
		let mut touched: Vec<StoreTable> =
			StoreTable::all().filter(|t| self.touched.contains(t)).collect();
		touched.shrink_to_fit();
		touched
	}

	/// Inserts a new order row, assigning the next store id. Returns the
	/// assigned id.
	pub fn insert_order(&mut self, mut row: OrderRow) -> i64 {
		let id = self.tables.next_order_id;
		self.tables.next_order_id += 1;
		row.id = id;
		self.tables.orders.push(row);
		self.touched.insert(StoreTable::Orders);
		id
	}

	/// Insert-or-replace keyed by the order id.
	pub fn upsert_order(&mut self, row: OrderRow) {
		self.touched.insert(StoreTable::Orders);
		match self.tables.orders.iter_mut().find(|o| o.id == row.id) {
			Some(existing) => *existing = row,
			None => self.tables.orders.push(row),
		}
	}

	/// Applies an in-place update to an order row. Returns false when the
	/// order does not exist.
	pub fn update_order<F>(&mut self, id: i64, f: F) -> bool
	where
		F: FnOnce(&mut OrderRow),
	{
		match self.tables.orders.iter_mut().find(|o| o.id == id) {
			Some(row) => {
				f(row);
				self.touched.insert(StoreTable::Orders);
				true
			}
			None => false,
		}
	}

	/// Insert-or-replace keyed by `(order_id, loader_id)`.
	pub fn upsert_application(&mut self, app: OrderApplication) {
		self.touched.insert(StoreTable::Applications);
		match self
			.tables
			.applications
			.iter_mut()
			.find(|a| a.order_id == app.order_id && a.loader_id == app.loader_id)
		{
			Some(existing) => *existing = app,
			None => self.tables.applications.push(app),
		}
	}

	/// Applies an in-place update to one application. Returns false when
	/// absent.
	pub fn update_application<F>(&mut self, order_id: i64, loader_id: i64, f: F) -> bool
	where
		F: FnOnce(&mut OrderApplication),
	{
		match self
			.tables
			.applications
			.iter_mut()
			.find(|a| a.order_id == order_id && a.loader_id == loader_id)
		{
			Some(app) => {
				f(app);
				self.touched.insert(StoreTable::Applications);
				true
			}
			None => false,
		}
	}

	/// Bulk status transition scoped to one order: every application
	/// currently in one of `from` moves to `to`. Returns the number of
	/// rows changed.
	pub fn update_application_status_by_order(
		&mut self,
		order_id: i64,
		from: &[ApplicationStatus],
		to: ApplicationStatus,
	) -> usize {
		let mut changed = 0;
		for app in self
			.tables
			.applications
			.iter_mut()
			.filter(|a| a.order_id == order_id && from.contains(&a.status))
		{
			app.status = to;
			changed += 1;
		}
		if changed > 0 {
			self.touched.insert(StoreTable::Applications);
		}
		changed
	}

	/// Insert-or-replace keyed by `(order_id, loader_id)`.
	pub fn upsert_assignment(&mut self, assignment: OrderAssignment) {
		self.touched.insert(StoreTable::Assignments);
		match self
			.tables
			.assignments
			.iter_mut()
			.find(|a| a.order_id == assignment.order_id && a.loader_id == assignment.loader_id)
		{
			Some(existing) => *existing = assignment,
			None => self.tables.assignments.push(assignment),
		}
	}

	/// Bulk status transition scoped to one order: every assignment
	/// currently in `from` moves to `to`. Returns the number of rows
	/// changed.
	pub fn update_assignment_status_by_order(
		&mut self,
		order_id: i64,
		from: AssignmentStatus,
		to: AssignmentStatus,
	) -> usize {
		let mut changed = 0;
		for assignment in self
			.tables
			.assignments
			.iter_mut()
			.filter(|a| a.order_id == order_id && a.status == from)
		{
			assignment.status = to;
			changed += 1;
		}
		if changed > 0 {
			self.touched.insert(StoreTable::Assignments);
		}
		changed
	}
}

/// The shared database: committed tables, the document backend and the
/// publish-on-commit channel.
pub struct Database {
	backend: Box<dyn DocumentBackend>,
	tables: RwLock<Tables>,
	commits: broadcast::Sender<CommitNotice>,
}

impl Database {
	/// Opens a database over the given backend, running the standard
	/// migration registry against whatever document is persisted.
	pub async fn open(backend: Box<dyn DocumentBackend>) -> Result<Arc<Self>, StorageError> {
		Self::open_with(backend, &MigrationRegistry::standard()).await
	}

	/// Opens a database with an explicit migration registry.
	pub async fn open_with(
		backend: Box<dyn DocumentBackend>,
		registry: &MigrationRegistry,
	) -> Result<Arc<Self>, StorageError> {
		let tables = match backend.load().await? {
			Some(bytes) => {
				let (tables, migrated) = Self::decode(&bytes, registry)?;
				if migrated {
					// Persist the migrated document so the step runs once.
					let bytes = encode(&tables)?;
					backend.save(bytes).await?;
					tracing::info!(
						schema_version = tables.schema_version(),
						"Migrated persisted store"
					);
				}
				tables
			}
			None => Tables::fresh(),
		};

		let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
		Ok(Arc::new(Self {
			backend,
			tables: RwLock::new(tables),
			commits,
		}))
	}

	fn decode(
		bytes: &[u8],
		registry: &MigrationRegistry,
	) -> Result<(Tables, bool), StorageError> {
		let mut doc: serde_json::Value = serde_json::from_slice(bytes)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		let migrated = registry.apply(&mut doc)?;
		let tables: Tables = serde_json::from_value(doc)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok((tables, migrated))
	}

	/// Runs a read-only closure over a consistent snapshot of committed
	/// state. Reads never observe a partially applied transaction.
	pub async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
		let guard = self.tables.read().await;
		f(&guard)
	}

	/// Runs a transaction. The closure sees a staged copy of committed
	/// state; on success the document is persisted, the staged tables are
	/// swapped in and subscribers are notified with the touched tables.
	/// On any error, from the closure or from persistence, committed
	/// state is left exactly as it was.
	///
	/// Writers serialize on the write lock, so two conflicting
	/// transactions always observe each other's committed effects.
	pub async fn write<T, E, F>(&self, f: F) -> Result<T, E>
	where
		E: From<StorageError>,
		F: FnOnce(&mut TxTables) -> Result<T, E>,
	{
		let mut guard = self.tables.write().await;
		let mut staged = guard.clone();
		let mut tx = TxTables::new(&mut staged);
		let out = f(&mut tx)?;
		let touched = tx.into_touched();

		// Read-only transactions commit nothing.
		if touched.is_empty() {
			return Ok(out);
		}

		let bytes = encode(&staged).map_err(E::from)?;
		self.backend.save(bytes).await.map_err(E::from)?;
		*guard = staged;

		tracing::debug!(tables = ?touched, "Committed transaction");
		// No receivers is fine; streams subscribe lazily.
		let _ = self.commits.send(CommitNotice::new(touched));
		Ok(out)
	}

	/// Re-loads committed state from the backend, e.g. after a reconnect,
	/// and notifies subscribers that every table may have changed. A
	/// backend with no document resets the store to fresh.
	pub async fn refresh(&self) -> Result<(), StorageError> {
		let mut guard = self.tables.write().await;
		let tables = match self.backend.load().await? {
			Some(bytes) => {
				let (tables, _) = Self::decode(&bytes, &MigrationRegistry::standard())?;
				tables
			}
			None => Tables::fresh(),
		};
		*guard = tables;
		let _ = self.commits.send(CommitNotice::all_tables());
		Ok(())
	}

	/// Subscribes to commit notifications.
	pub fn subscribe(&self) -> broadcast::Receiver<CommitNotice> {
		self.commits.subscribe()
	}
}

fn encode(tables: &Tables) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec_pretty(tables).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryBackend;
	use market_types::{OrderStatus, ScheduleMode};
	use std::collections::BTreeMap;

	fn draft(title: &str) -> OrderRow {
		OrderRow {
			id: 0,
			title: title.into(),
			address: "somewhere".into(),
			price_per_hour: 1000,
			schedule: ScheduleMode::Soon,
			duration_min: 60,
			workers_current: 0,
			workers_total: 1,
			tags: Vec::new(),
			meta: BTreeMap::new(),
			comment: None,
			status: OrderStatus::Staffing,
			created_by_user_id: 1,
		}
	}

	#[tokio::test]
	async fn write_commits_and_assigns_ids() {
		let db = Database::open(Box::new(MemoryBackend::new())).await.unwrap();
		let id_a = db
			.write::<_, StorageError, _>(|tx| Ok(tx.insert_order(draft("a"))))
			.await
			.unwrap();
		let id_b = db
			.write::<_, StorageError, _>(|tx| Ok(tx.insert_order(draft("b"))))
			.await
			.unwrap();
		assert_eq!((id_a, id_b), (1, 2));
		assert_eq!(db.read(|t| t.orders().len()).await, 2);
	}

	#[tokio::test]
	async fn failed_transaction_rolls_back() {
		let db = Database::open(Box::new(MemoryBackend::new())).await.unwrap();
		let result: Result<(), StorageError> = db
			.write(|tx| {
				tx.insert_order(draft("doomed"));
				Err(StorageError::Backend("boom".into()))
			})
			.await;
		assert!(result.is_err());
		assert_eq!(db.read(|t| t.orders().len()).await, 0);
	}

	#[tokio::test]
	async fn commit_notifies_touched_tables_only() {
		let db = Database::open(Box::new(MemoryBackend::new())).await.unwrap();
		let mut rx = db.subscribe();
		db.write::<_, StorageError, _>(|tx| Ok(tx.insert_order(draft("a"))))
			.await
			.unwrap();
		let notice = rx.recv().await.unwrap();
		assert!(notice.touches(StoreTable::Orders));
		assert!(!notice.touches(StoreTable::Applications));
	}

	#[tokio::test]
	async fn read_only_write_does_not_notify() {
		let db = Database::open(Box::new(MemoryBackend::new())).await.unwrap();
		let mut rx = db.subscribe();
		db.write::<_, StorageError, _>(|tx| Ok(tx.order(99).is_some()))
			.await
			.unwrap();
		assert!(matches!(
			rx.try_recv(),
			Err(broadcast::error::TryRecvError::Empty)
		));
	}

	#[tokio::test]
	async fn persisted_state_survives_reopen() {
		let backend = MemoryBackend::new();
		let shared = backend.share();
		let db = Database::open(Box::new(backend)).await.unwrap();
		db.write::<_, StorageError, _>(|tx| Ok(tx.insert_order(draft("kept"))))
			.await
			.unwrap();
		drop(db);

		let db = Database::open(Box::new(shared)).await.unwrap();
		assert_eq!(db.read(|t| t.orders()[0].title.clone()).await, "kept");
		// Auto-increment continues past reloaded rows.
		let id = db
			.write::<_, StorageError, _>(|tx| Ok(tx.insert_order(draft("next"))))
			.await
			.unwrap();
		assert_eq!(id, 2);
	}
}
