use parking_lot::RwLock;
use toml::{Table, Value};

use crate::error::{ConfigError, Result};
use crate::store::ConfigStore;

/// Volatile store, useful for tests and embedders without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
	root: RwLock<Table>,
}

impl MemoryStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a store pre-populated from a TOML table.
	pub fn from_table(root: Table) -> Self {
		Self { root: RwLock::new(root) }
	}
}

impl ConfigStore for MemoryStore {
	fn read_entry(&self, group: &str, key: &str) -> Option<Value> {
		self.root.read().get(group).and_then(Value::as_table).and_then(|t| t.get(key)).cloned()
	}

	fn read_group(&self, group: &str) -> Option<Table> {
		self.root.read().get(group).and_then(Value::as_table).cloned()
	}

	fn write_entry(&self, group: &str, key: &str, value: Value) -> Result<()> {
		let mut root = self.root.write();
		let slot = root.entry(group.to_string()).or_insert_with(|| Value::Table(Table::new()));
		let Value::Table(table) = slot else {
			return Err(ConfigError::InvalidEntry {
				group: group.to_string(),
				key: key.to_string(),
				reason: "group is not a table".to_string(),
			});
		};
		table.insert(key.to_string(), value);
		Ok(())
	}

	fn sync(&self) -> Result<()> {
		Ok(())
	}
}
