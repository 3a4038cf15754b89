use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use toml::{Table, Value};

use crate::error::{ConfigError, Result};
use crate::store::ConfigStore;

struct TomlDocument {
	root: Table,
	dirty: bool,
	/// Bumped on every write; a sync only marks the document clean if no
	/// write slipped in after its snapshot.
	revision: u64,
}

/// File-backed store holding one TOML document; groups are top-level tables.
pub struct TomlStore {
	path: PathBuf,
	doc: RwLock<TomlDocument>,
	file: Mutex<()>,
}

impl TomlStore {
	/// Opens the document at `path`. A missing file yields an empty store
	/// that is created on the first [`ConfigStore::sync`].
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let root = match std::fs::read_to_string(&path) {
			Ok(content) => toml::from_str::<Table>(&content)?,
			Err(error) if error.kind() == std::io::ErrorKind::NotFound => Table::new(),
			Err(error) => return Err(ConfigError::Io { path, error }),
		};
		tracing::debug!(path = %path.display(), groups = root.len(), "config.open");
		Ok(Self {
			path,
			doc: RwLock::new(TomlDocument {
				root,
				dirty: false,
				revision: 0,
			}),
			file: Mutex::new(()),
		})
	}

	/// Returns the backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl ConfigStore for TomlStore {
	fn read_entry(&self, group: &str, key: &str) -> Option<Value> {
		self.doc.read().root.get(group).and_then(Value::as_table).and_then(|t| t.get(key)).cloned()
	}

	fn read_group(&self, group: &str) -> Option<Table> {
		self.doc.read().root.get(group).and_then(Value::as_table).cloned()
	}

	fn write_entry(&self, group: &str, key: &str, value: Value) -> Result<()> {
		let mut doc = self.doc.write();
		let slot = doc.root.entry(group.to_string()).or_insert_with(|| Value::Table(Table::new()));
		let Value::Table(table) = slot else {
			return Err(ConfigError::InvalidEntry {
				group: group.to_string(),
				key: key.to_string(),
				reason: "group is not a table".to_string(),
			});
		};
		table.insert(key.to_string(), value);
		doc.dirty = true;
		doc.revision = doc.revision.wrapping_add(1);
		Ok(())
	}

	fn sync(&self) -> Result<()> {
		let _file = self.file.lock();
		let (serialized, revision) = {
			let doc = self.doc.read();
			if !doc.dirty {
				return Ok(());
			}
			(toml::to_string(&doc.root)?, doc.revision)
		};

		if let Some(parent) = self.path.parent()
			&& !parent.as_os_str().is_empty()
		{
			std::fs::create_dir_all(parent).map_err(|error| ConfigError::Io {
				path: parent.to_path_buf(),
				error,
			})?;
		}
		std::fs::write(&self.path, serialized).map_err(|error| ConfigError::Io {
			path: self.path.clone(),
			error,
		})?;

		let mut doc = self.doc.write();
		if doc.revision == revision {
			doc.dirty = false;
		}
		drop(doc);
		tracing::trace!(path = %self.path.display(), "config.sync");
		Ok(())
	}
}
