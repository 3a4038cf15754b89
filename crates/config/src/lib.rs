//! Configuration storage for quarry.
//!
//! Configuration is a set of named groups, each holding key/value entries.
//! The dispatch engine reads its tuning knobs from one group and persists
//! small amounts of learned state (launch counters) back into it.
//!
//! # Backends
//!
//! - [`TomlStore`]: one TOML document on disk; groups are top-level tables.
//! - [`MemoryStore`]: volatile, for tests and embedders that do not persist.
//!
//! ```toml
//! [runner_manager]
//! max_threads = 8
//! allowed_runners = ["calculator", "files"]
//! launch_counts = ["3 files_/etc/hosts", "1 calculator"]
//! ```
//!
//! Writes are buffered until [`ConfigStore::sync`] is called.

pub mod error;
mod memory;
mod store;
mod toml_store;

pub use error::{ConfigError, Result};
pub use memory::MemoryStore;
pub use store::{ConfigStore, ConfigStoreExt};
pub use toml::{Table, Value};
pub use toml_store::TomlStore;
