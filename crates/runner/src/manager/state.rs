use std::collections::BTreeMap;
use std::sync::Arc;

use quarry_worker::JobId;

use crate::config::ManagerConfig;
use crate::jobs::FindMatchesJob;
use crate::query_match::Match;
use crate::runner::{RunnerRef, same_runner};
use crate::session::QuerySession;

/// A submitted job of the current session.
pub(super) struct TrackedJob {
	pub id: JobId,
	pub job: Arc<FindMatchesJob>,
}

pub(super) struct RunnerSlot {
	pub runner: RunnerRef,
	pub suspended: bool,
}

impl RunnerSlot {
	pub fn new(runner: RunnerRef) -> Self {
		Self { runner, suspended: false }
	}
}

/// Runners to tear down once a match session fully drained.
#[must_use]
#[derive(Default)]
pub(super) struct Teardown {
	pub runners: Vec<RunnerRef>,
	pub finished: bool,
}

/// Everything behind the manager lock.
pub(super) struct ManagerState {
	pub config: ManagerConfig,
	pub session: QuerySession,
	/// Loaded runners keyed by offer id.
	pub runners: BTreeMap<String, RunnerSlot>,
	/// Offer id to display name for runners offered in single-runner mode.
	pub advertised_single: BTreeMap<String, String>,
	pub single_mode: bool,
	pub single_runner_id: Option<String>,
	pub current_single: Option<RunnerRef>,
	/// `current_single` was instantiated for single mode, not borrowed from `runners`.
	pub single_runner_owned: bool,
	pub search_jobs: Vec<TrackedJob>,
	pub old_jobs: Vec<Arc<FindMatchesJob>>,
	pub deferred_run: Option<Match>,
	pub prepped: bool,
	pub all_prepped: bool,
	pub single_prepped: bool,
	pub teardown_requested: bool,
}

impl ManagerState {
	pub fn new(config: ManagerConfig, session: QuerySession) -> Self {
		Self {
			config,
			session,
			runners: BTreeMap::new(),
			advertised_single: BTreeMap::new(),
			single_mode: false,
			single_runner_id: None,
			current_single: None,
			single_runner_owned: false,
			search_jobs: Vec::new(),
			old_jobs: Vec::new(),
			deferred_run: None,
			prepped: false,
			all_prepped: false,
			single_prepped: false,
			teardown_requested: false,
		}
	}

	/// Runners a new query fans out to.
	pub fn runnable(&self) -> Vec<RunnerRef> {
		if self.single_mode {
			return self.current_single.iter().cloned().collect();
		}
		self.runners.values().filter(|slot| !slot.suspended).map(|slot| Arc::clone(&slot.runner)).collect()
	}

	pub fn all_runners(&self) -> Vec<RunnerRef> {
		self.runners.values().map(|slot| Arc::clone(&slot.runner)).collect()
	}

	pub fn forget_job(&mut self, job: &Arc<FindMatchesJob>) {
		self.search_jobs.retain(|tracked| !Arc::ptr_eq(&tracked.job, job));
		self.old_jobs.retain(|old| !Arc::ptr_eq(old, job));
	}

	/// Whether `runner` still has an unfinished job in the current session.
	pub fn has_active_job(&self, runner: &RunnerRef) -> bool {
		self.search_jobs.iter().any(|tracked| same_runner(tracked.job.runner(), runner) && !tracked.job.is_finished())
	}

	pub fn clear_single_runner(&mut self) {
		if self.single_runner_owned {
			tracing::debug!(runner = self.current_single.as_ref().map(|r| r.id()), "manager.single_runner_unload");
		}
		self.current_single = None;
		self.single_runner_owned = false;
	}

	/// Collects runners to tear down if teardown was requested and no job of
	/// this manager is outstanding.
	pub fn take_teardown(&mut self, pool_idle: bool) -> Teardown {
		if !self.prepped || !self.teardown_requested {
			return Teardown::default();
		}
		if pool_idle {
			self.search_jobs.clear();
			self.old_jobs.clear();
		}
		if !self.search_jobs.is_empty() || !self.old_jobs.is_empty() {
			tracing::trace!(search = self.search_jobs.len(), old = self.old_jobs.len(), "manager.teardown_deferred");
			return Teardown::default();
		}

		let mut runners = Vec::new();
		if self.all_prepped {
			runners.extend(self.all_runners());
			self.all_prepped = false;
		}
		if self.single_prepped {
			if let Some(single) = &self.current_single
				&& !runners.iter().any(|r| same_runner(r, single))
			{
				runners.push(Arc::clone(single));
			}
			self.single_prepped = false;
		}
		self.prepped = false;
		self.teardown_requested = false;
		Teardown { runners, finished: true }
	}
}
