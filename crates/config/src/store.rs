use serde::de::DeserializeOwned;
use toml::{Table, Value};

use crate::error::{ConfigError, Result};

/// Grouped key/value configuration backend.
///
/// Entries are addressed by `(group, key)`. Writes are buffered by the
/// backend until [`ConfigStore::sync`] is called.
pub trait ConfigStore: Send + Sync {
	/// Returns one entry, or `None` if the group or key is absent.
	fn read_entry(&self, group: &str, key: &str) -> Option<Value>;

	/// Returns a snapshot of a whole group.
	fn read_group(&self, group: &str) -> Option<Table>;

	/// Stores one entry, creating the group if needed.
	fn write_entry(&self, group: &str, key: &str, value: Value) -> Result<()>;

	/// Flushes buffered writes to the backing medium.
	fn sync(&self) -> Result<()>;
}

/// Typed helpers available on every [`ConfigStore`], including trait objects.
pub trait ConfigStoreExt: ConfigStore {
	/// Reads a list of strings. Missing entries yield an empty list and
	/// non-string items are skipped.
	fn read_list(&self, group: &str, key: &str) -> Vec<String> {
		match self.read_entry(group, key) {
			Some(Value::Array(items)) => items
				.into_iter()
				.filter_map(|item| match item {
					Value::String(s) => Some(s),
					other => {
						tracing::warn!(group, key, kind = other.type_str(), "config.read_list: skipping non-string item");
						None
					}
				})
				.collect(),
			Some(other) => {
				tracing::warn!(group, key, kind = other.type_str(), "config.read_list: entry is not an array");
				Vec::new()
			}
			None => Vec::new(),
		}
	}

	/// Writes a list of strings.
	fn write_list(&self, group: &str, key: &str, items: &[String]) -> Result<()> {
		let value = Value::Array(items.iter().cloned().map(Value::String).collect());
		self.write_entry(group, key, value)
	}

	/// Deserializes a whole group into `T`. Returns `Ok(None)` when the group is absent.
	fn read_group_as<T: DeserializeOwned>(&self, group: &str) -> Result<Option<T>> {
		let Some(table) = self.read_group(group) else {
			return Ok(None);
		};
		Value::Table(table).try_into::<T>().map(Some).map_err(|e| ConfigError::InvalidEntry {
			group: group.to_string(),
			key: String::new(),
			reason: e.to_string(),
		})
	}
}

impl<S: ConfigStore + ?Sized> ConfigStoreExt for S {}
