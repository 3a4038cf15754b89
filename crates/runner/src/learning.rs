//! Launch-count learning.
//!
//! Every executed match bumps a counter keyed by match id. Counts feed back
//! as a relevance boost when the same id shows up again, and persist to the
//! config store as `"<count> <id>"` rows.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use quarry_config::{ConfigStore, ConfigStoreExt};

/// Key holding the persisted rows inside the manager group.
pub const LAUNCH_COUNTS_KEY: &str = "launch_counts";

/// Boost applied to matches added in bulk: saturates towards `0.5`.
pub fn bulk_boost(count: u32) -> f64 {
	0.5 * (1.0 - (-0.3 * f64::from(count)).exp())
}

/// Boost applied to matches added one at a time: linear in the count.
pub fn single_boost(count: u32) -> f64 {
	0.05 * f64::from(count)
}

/// Launch counters shared by every session of one manager.
#[derive(Default)]
pub struct LaunchCounts {
	counts: RwLock<HashMap<String, u32>>,
	store: Option<(Arc<dyn ConfigStore>, String)>,
	/// Held across snapshot and write so saves land in snapshot order.
	save_lock: Mutex<()>,
}

impl std::fmt::Debug for LaunchCounts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LaunchCounts")
			.field("entries", &self.counts.read().len())
			.field("persistent", &self.store.is_some())
			.finish()
	}
}

impl LaunchCounts {
	/// In-memory counters that are never persisted.
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads counters from `group` in `store` and persists updates back there.
	///
	/// Rows that are not `"<count> <id>"` with a non-negative integer count
	/// are skipped.
	pub fn restore(store: Arc<dyn ConfigStore>, group: &str) -> Self {
		let mut counts = HashMap::new();
		for row in store.read_list(group, LAUNCH_COUNTS_KEY) {
			match parse_row(&row) {
				Some((count, id)) => {
					counts.insert(id.to_string(), count);
				}
				None => tracing::debug!(row = row.as_str(), "learning.skip_malformed_row"),
			}
		}
		tracing::debug!(entries = counts.len(), "learning.restore");
		Self {
			counts: RwLock::new(counts),
			store: Some((store, group.to_string())),
			save_lock: Mutex::new(()),
		}
	}

	pub fn count(&self, id: &str) -> u32 {
		self.counts.read().get(id).copied().unwrap_or(0)
	}

	/// Increments the counter for `id`, persists, and returns the new count.
	pub fn record_launch(&self, id: &str) -> u32 {
		let count = {
			let mut counts = self.counts.write();
			let slot = counts.entry(id.to_string()).or_insert(0);
			*slot = slot.saturating_add(1);
			*slot
		};
		tracing::trace!(id, count, "learning.record_launch");
		self.save();
		count
	}

	/// Persisted form, sorted by id.
	pub fn rows(&self) -> Vec<String> {
		let counts = self.counts.read();
		let mut entries: Vec<(&String, &u32)> = counts.iter().collect();
		entries.sort_by(|a, b| a.0.cmp(b.0));
		entries.into_iter().map(|(id, count)| format!("{count} {id}")).collect()
	}

	/// Writes all counters to the backing store, if any. Failures are logged.
	pub fn save(&self) {
		let Some((store, group)) = &self.store else {
			return;
		};
		let _serial = self.save_lock.lock();
		let rows = self.rows();
		if let Err(error) = store.write_list(group, LAUNCH_COUNTS_KEY, &rows).and_then(|()| store.sync()) {
			tracing::warn!(%error, "learning.save_failed");
		}
	}
}

fn parse_row(row: &str) -> Option<(u32, &str)> {
	let (count, id) = row.trim().split_once(' ')?;
	let count = count.parse().ok()?;
	let id = id.trim();
	(!id.is_empty()).then_some((count, id))
}
