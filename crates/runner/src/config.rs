//! Manager configuration, read from the `runner_manager` group.

use std::collections::HashMap;
use std::time::Duration;

use quarry_config::{ConfigStore, ConfigStoreExt};
use quarry_worker::PoolConfig;
use serde::Deserialize;

use crate::registry::RunnerOffer;

/// Config group holding manager settings and learned state.
pub const MANAGER_GROUP: &str = "runner_manager";

/// Key of the runner whitelist inside [`MANAGER_GROUP`].
pub const ALLOWED_RUNNERS_KEY: &str = "allowed_runners";

/// Tuning knobs and runner selection.
///
/// Unknown keys are ignored so the group can also carry learned state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
	/// Upper bound for pool threads; the actual size also depends on CPU count.
	pub max_threads: usize,
	/// How long slow runners wait after each query.
	pub slow_run_delay_ms: u64,
	/// Quiet interval before a burst of match changes is announced.
	pub match_debounce_ms: u64,
	/// Load every offered runner, ignoring the whitelist and enable flags.
	pub load_all: bool,
	/// If non-empty, only these runner ids are loaded.
	pub allowed_runners: Vec<String>,
	/// Per-runner enable overrides, keyed by runner id.
	pub plugins: HashMap<String, bool>,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			max_threads: 16,
			slow_run_delay_ms: 400,
			match_debounce_ms: 100,
			load_all: false,
			allowed_runners: Vec::new(),
			plugins: HashMap::new(),
		}
	}
}

impl ManagerConfig {
	/// Reads the manager group, falling back to defaults when it is missing
	/// or malformed.
	pub fn load(store: &dyn ConfigStore) -> Self {
		match store.read_group_as::<Self>(MANAGER_GROUP) {
			Ok(Some(config)) => config,
			Ok(None) => Self::default(),
			Err(error) => {
				tracing::warn!(%error, "manager.config_invalid");
				Self::default()
			}
		}
	}

	/// Pool sizing for this host.
	pub fn pool_config(&self) -> PoolConfig {
		PoolConfig::from_processors(self.max_threads)
	}

	/// Per-runner concurrency cap for a pool of `threads`.
	pub fn rate_cap(threads: usize) -> usize {
		(threads / 2).max(2)
	}

	pub fn slow_run_delay(&self) -> Duration {
		Duration::from_millis(self.slow_run_delay_ms)
	}

	pub fn match_debounce(&self) -> Duration {
		Duration::from_millis(self.match_debounce_ms)
	}

	/// Whether `offer` belongs in the runnable set.
	pub fn is_selected(&self, offer: &RunnerOffer) -> bool {
		if self.load_all {
			return true;
		}
		let enabled = self.plugins.get(&offer.id).copied().unwrap_or(offer.enabled_by_default);
		enabled && (self.allowed_runners.is_empty() || self.allowed_runners.contains(&offer.id))
	}
}
