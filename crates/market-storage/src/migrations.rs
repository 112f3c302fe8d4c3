//! Schema migrations for the persisted document.
//!
//! The document carries an integer `schemaVersion`. A statically known,
//! ordered registry of migrations transforms version N into N+1 until the
//! current [`SCHEMA_VERSION`] is reached. The registry must cover every
//! gap between the persisted version and the target; a missing link is a
//! configuration error that fails the open, never a runtime retry.

use crate::StorageError;
use market_types::meta_keys;

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: u32 = 3;

/// One migration step, transforming a document from `start_version` into
/// `end_version`.
pub struct Migration {
	pub start_version: u32,
	pub end_version: u32,
	/// Transforms the raw JSON document in place. The registry bumps
	/// `schemaVersion` afterwards.
	pub apply: fn(&mut serde_json::Value) -> Result<(), StorageError>,
}

/// Ordered set of migration steps walked at open time.
pub struct MigrationRegistry {
	steps: Vec<Migration>,
}

impl MigrationRegistry {
	pub fn new(steps: Vec<Migration>) -> Self {
		Self { steps }
	}

	/// The registry this build ships with: a single step 2 → 3.
	pub fn standard() -> Self {
		Self::new(vec![Migration {
			start_version: 2,
			end_version: 3,
			apply: migrate_v2_to_v3,
		}])
	}

	/// Walks the chain from the document's stored version up to
	/// [`SCHEMA_VERSION`]. Returns whether any step ran.
	///
	/// Errors with `Configuration` when the stored version is missing,
	/// newer than this build, or when no registered step starts at the
	/// current version.
	pub fn apply(&self, doc: &mut serde_json::Value) -> Result<bool, StorageError> {
		let mut version = doc
			.get("schemaVersion")
			.and_then(|v| v.as_u64())
			.map(|v| v as u32)
			.ok_or_else(|| {
				StorageError::Configuration("Persisted document has no schemaVersion".into())
			})?;

		if version > SCHEMA_VERSION {
			return Err(StorageError::Configuration(format!(
				"Persisted schema version {} is newer than supported version {}",
				version, SCHEMA_VERSION
			)));
		}

		let start = version;
		while version < SCHEMA_VERSION {
			let step = self
				.steps
				.iter()
				.find(|m| m.start_version == version)
				.ok_or_else(|| {
					StorageError::Configuration(format!(
						"No migration registered from schema version {} toward {}",
						version, SCHEMA_VERSION
					))
				})?;

			tracing::info!(
				from = step.start_version,
				to = step.end_version,
				"Applying schema migration"
			);
			(step.apply)(doc)?;
			version = step.end_version;
			doc["schemaVersion"] = version.into();
		}

		Ok(version != start)
	}
}

/// Version 2 stored `minWorkerRating` as a nullable order column and
/// `tags` as one comma-joined string. Version 3 folds the rating into the
/// `meta` bag and splits tags into an array.
fn migrate_v2_to_v3(doc: &mut serde_json::Value) -> Result<(), StorageError> {
	let orders = match doc.get_mut("orders").and_then(|o| o.as_array_mut()) {
		Some(orders) => orders,
		None => return Ok(()), // nothing to rewrite in an empty document
	};

	for order in orders {
		let obj = order.as_object_mut().ok_or_else(|| {
			StorageError::Serialization("Order row is not an object".into())
		})?;

		if let Some(rating) = obj.remove("minWorkerRating") {
			if !rating.is_null() {
				let meta = obj
					.entry("meta")
					.or_insert_with(|| serde_json::Value::Object(Default::default()));
				if let Some(meta) = meta.as_object_mut() {
					meta.entry(meta_keys::MIN_WORKER_RATING)
						.or_insert_with(|| rating.to_string().trim_matches('"').into());
				}
			}
		}

		if let Some(tags) = obj.get("tags").and_then(|t| t.as_str()) {
			let split: Vec<serde_json::Value> = tags
				.split(',')
				.map(str::trim)
				.filter(|t| !t.is_empty())
				.map(|t| t.into())
				.collect();
			obj.insert("tags".into(), split.into());
		}
	}

	Ok(())
}
