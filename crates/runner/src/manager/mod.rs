//! Query dispatch across runners.
//!
//! # Mental model
//!
//! * [`RunnerManager::launch_query`] resets the shared [`QuerySession`],
//!   classifies the new term and fans one [`FindMatchesJob`] per eligible
//!   runner out to the [`WorkerPool`].
//! * Normal runners start right away, bounded per runner by the rate cap.
//!   Slow runners wait for the shared slow-runner delay, which every launch
//!   restarts, so fast typing only ever pays for the last term.
//! * Jobs of a superseded query are dequeued if they have not started, or
//!   moved to the *old* set and left to finish against their now-invalid
//!   session instance, which drops whatever they add.
//! * Match-list changes are coalesced by a debouncer and published as
//!   [`ManagerEvent::MatchesChanged`]; the end of a match session is
//!   published as [`ManagerEvent::QueryFinished`] once every job drained.
//!
//! # Invariants
//!
//! * Runner hooks (`prepare`, `teardown`, `run`, `find_matches`) are never
//!   called with the manager lock held.
//! * Runners are prepared at most once per match session and torn down only
//!   after both the search and old job sets are empty.
//! * A match is never executed while its runner still has an unfinished job
//!   in the current session; the most recent such request runs exactly once
//!   when that job finishes or the session resets.
//! * The pool's completion hooks hold the manager weakly, so dropping the
//!   manager never waits on jobs. Outstanding jobs and runners are handed to
//!   a background cleaner instead.
//!
//! A tokio runtime must be reachable when the manager is built; without one
//! the worker crate's global fallback runtime is used.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use quarry_config::{ConfigStore, ConfigStoreExt};
use quarry_worker::{Debouncer, DoneHook, WorkerPool};
use tokio::sync::broadcast;

use crate::config::{ALLOWED_RUNNERS_KEY, MANAGER_GROUP, ManagerConfig};
use crate::jobs::{AdmissionController, FindMatchesJob};
use crate::kind::classify;
use crate::learning::LaunchCounts;
use crate::query_match::{Match, MatchAction};
use crate::registry::RunnerRegistry;
use crate::runner::{RunnerRef, same_runner};
use crate::session::{MatchContext, QuerySession};

mod cleaner;
mod state;
#[cfg(test)]
mod tests;

use cleaner::DelayedJobCleaner;
use state::{ManagerState, RunnerSlot, Teardown, TrackedJob};

const EVENT_CAPACITY: usize = 64;

/// Notifications published by a [`RunnerManager`].
#[derive(Debug, Clone)]
pub enum ManagerEvent {
	/// The match list changed; carries the sorted snapshot.
	MatchesChanged(Arc<[Match]>),
	/// A match session ended and its runners were torn down.
	QueryFinished,
}

/// Owns the runners, the query session and the dispatch of search jobs.
pub struct RunnerManager {
	inner: Arc<ManagerInner>,
}

struct ManagerInner {
	state: Mutex<ManagerState>,
	pool: WorkerPool<FindMatchesJob>,
	admission: AdmissionController,
	registry: Arc<dyn RunnerRegistry>,
	store: Arc<dyn ConfigStore>,
	launch_counts: Arc<LaunchCounts>,
	events: broadcast::Sender<ManagerEvent>,
	debouncer: Debouncer,
}

impl std::fmt::Debug for RunnerManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("RunnerManager")
			.field("runners", &state.runners.keys().collect::<Vec<_>>())
			.field("single_mode", &state.single_mode)
			.field("search_jobs", &state.search_jobs.len())
			.field("old_jobs", &state.old_jobs.len())
			.field("pool", &self.inner.pool)
			.finish()
	}
}

impl RunnerManager {
	/// Builds a manager with its own pool, sized from the `runner_manager`
	/// config group.
	pub fn new(registry: Arc<dyn RunnerRegistry>, store: Arc<dyn ConfigStore>) -> Self {
		let pool = WorkerPool::new(ManagerConfig::load(store.as_ref()).pool_config());
		Self::with_pool(registry, store, pool)
	}

	/// Builds a manager on a shared pool.
	pub fn with_pool(registry: Arc<dyn RunnerRegistry>, store: Arc<dyn ConfigStore>, pool: WorkerPool<FindMatchesJob>) -> Self {
		let config = ManagerConfig::load(store.as_ref());
		let launch_counts = Arc::new(LaunchCounts::restore(Arc::clone(&store), MANAGER_GROUP));
		let cap = ManagerConfig::rate_cap(pool.max_threads());
		let admission = AdmissionController::new(cap, config.slow_run_delay());
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		tracing::debug!(threads = pool.max_threads(), cap, slow_delay_ms = config.slow_run_delay_ms, "manager.new");

		let inner = Arc::new_cyclic(|weak: &Weak<ManagerInner>| {
			let weak = weak.clone();
			let debouncer = Debouncer::new(config.match_debounce(), move || {
				if let Some(inner) = weak.upgrade() {
					inner.publish_matches();
				}
			});
			let session = QuerySession::with_launch_counts(Arc::clone(&launch_counts));
			let trigger = debouncer.clone();
			session.set_change_notifier(Some(Arc::new(move || trigger.trigger())));
			ManagerInner {
				state: Mutex::new(ManagerState::new(config, session)),
				pool,
				admission,
				registry,
				store,
				launch_counts,
				events,
				debouncer,
			}
		});
		Self { inner }
	}

	/// Subscribes to match and session notifications.
	pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
		self.inner.events.subscribe()
	}

	pub fn pool(&self) -> &WorkerPool<FindMatchesJob> {
		&self.inner.pool
	}

	pub fn config(&self) -> ManagerConfig {
		self.inner.state.lock().config.clone()
	}

	pub fn launch_counts(&self) -> &Arc<LaunchCounts> {
		&self.inner.launch_counts
	}

	/// Handle to the current session instance.
	pub fn session(&self) -> QuerySession {
		self.inner.state.lock().session.clone()
	}

	/// Current matches, best first.
	pub fn matches(&self) -> Vec<Match> {
		self.session().matches()
	}

	pub fn query(&self) -> String {
		self.session().query()
	}

	/// Jobs of the current session that have not reported completion.
	pub fn search_job_count(&self) -> usize {
		self.inner.state.lock().search_jobs.len()
	}

	/// Jobs of superseded sessions still running.
	pub fn old_job_count(&self) -> usize {
		self.inner.state.lock().old_jobs.len()
	}

	/// Re-reads the config group and reconciles the loaded runner set.
	///
	/// Pool size, slow-runner delay and debounce interval are fixed at
	/// construction.
	pub fn reload_configuration(&self) {
		let config = ManagerConfig::load(self.inner.store.as_ref());
		let mut state = self.inner.state.lock();
		state.config = config;
		self.inner.load_runners(&mut state);
	}

	/// Replaces the runner whitelist, persists it, and unloads every runner
	/// so the next query reloads against the new list.
	pub fn set_allowed_runners(&self, ids: &[String]) {
		{
			let mut state = self.inner.state.lock();
			state.runners.clear();
			state.config.allowed_runners = ids.to_vec();
		}
		let store = &self.inner.store;
		if let Err(error) = store.write_list(MANAGER_GROUP, ALLOWED_RUNNERS_KEY, ids).and_then(|()| store.sync()) {
			tracing::warn!(%error, "manager.allowed_runners_save_failed");
		}
	}

	pub fn allowed_runners(&self) -> Vec<String> {
		self.inner.state.lock().config.allowed_runners.clone()
	}

	/// Loaded runner by id, loading the runner set first if needed.
	pub fn runner(&self, id: &str) -> Option<RunnerRef> {
		let mut state = self.inner.state.lock();
		if state.runners.is_empty() {
			self.inner.load_runners(&mut state);
		}
		state.runners.get(id).map(|slot| Arc::clone(&slot.runner))
	}

	pub fn runners(&self) -> Vec<RunnerRef> {
		let mut state = self.inner.state.lock();
		if state.runners.is_empty() {
			self.inner.load_runners(&mut state);
		}
		state.all_runners()
	}

	/// Display name of a loaded or offered runner.
	pub fn runner_name(&self, id: &str) -> Option<String> {
		{
			let state = self.inner.state.lock();
			if let Some(single) = state.current_single.as_ref().filter(|r| r.id() == id) {
				return Some(single.name().to_string());
			}
			if let Some(slot) = state.runners.get(id) {
				return Some(slot.runner.name().to_string());
			}
		}
		self.inner.registry.offers().into_iter().find(|offer| offer.id == id).map(|offer| offer.name)
	}

	/// Excludes a loaded runner from future queries without unloading it.
	/// Returns `false` for unknown ids.
	pub fn set_runner_suspended(&self, id: &str, suspended: bool) -> bool {
		let mut state = self.inner.state.lock();
		match state.runners.get_mut(id) {
			Some(slot) => {
				slot.suspended = suspended;
				tracing::debug!(runner = id, suspended, "manager.runner_suspended");
				true
			}
			None => false,
		}
	}

	pub fn is_runner_suspended(&self, id: &str) -> bool {
		self.inner.state.lock().runners.get(id).is_some_and(|slot| slot.suspended)
	}

	/// Ids of runners offered for single-runner mode.
	pub fn single_mode_advertised_runner_ids(&self) -> Vec<String> {
		let mut state = self.inner.state.lock();
		if state.advertised_single.is_empty() {
			self.inner.load_runners(&mut state);
		}
		state.advertised_single.keys().cloned().collect()
	}

	pub fn single_mode(&self) -> bool {
		self.inner.state.lock().single_mode
	}

	pub fn single_mode_runner_id(&self) -> Option<String> {
		self.inner.state.lock().single_runner_id.clone()
	}

	/// Runner serving single-runner mode, if that mode is active.
	pub fn single_mode_runner(&self) -> Option<RunnerRef> {
		let state = self.inner.state.lock();
		if state.single_mode { state.current_single.clone() } else { None }
	}

	/// Selects the runner for single-runner mode. Takes effect immediately if
	/// the mode is on.
	pub fn set_single_mode_runner_id(&self, id: Option<&str>) {
		let mut state = self.inner.state.lock();
		state.single_runner_id = id.filter(|id| !id.is_empty()).map(str::to_string);
		self.inner.load_single_runner(&mut state);
	}

	/// Turns single-runner mode on or off.
	///
	/// The mode only stays on if the selected runner could be loaded. When
	/// the effective runner changes mid-session, the session is completed and
	/// (in single mode) set up again for the new runner.
	pub fn set_single_mode(&self, enabled: bool) {
		let (changed, prepped, single) = {
			let mut state = self.inner.state.lock();
			if state.single_mode == enabled {
				return;
			}
			let previous = state.current_single.clone();
			state.single_mode = enabled;
			self.inner.load_single_runner(&mut state);
			state.single_mode = state.current_single.is_some();
			let changed = match (&previous, &state.current_single) {
				(Some(a), Some(b)) => !same_runner(a, b),
				(None, None) => false,
				_ => true,
			};
			(changed, state.prepped, state.single_mode)
		};
		if changed && prepped {
			self.match_session_complete();
			if single {
				self.setup_match_session();
			}
		}
	}

	/// Starts a match session, preparing every runner (or just the single-mode
	/// runner) once.
	pub fn setup_match_session(&self) {
		let to_prepare = {
			let mut state = self.inner.state.lock();
			state.teardown_requested = false;
			if state.prepped {
				return;
			}
			if !state.single_mode && state.runners.is_empty() {
				self.inner.load_runners(&mut state);
			}
			state.prepped = true;
			if state.single_mode {
				state.single_prepped = state.current_single.is_some();
				state.current_single.iter().cloned().collect::<Vec<_>>()
			} else {
				state.all_prepped = true;
				state.all_runners()
			}
		};
		tracing::debug!(runners = to_prepare.len(), "manager.setup_match_session");
		for runner in &to_prepare {
			runner.prepare();
		}
	}

	/// Ends the match session. Teardown runs now if no job is outstanding,
	/// otherwise when the last one finishes.
	pub fn match_session_complete(&self) {
		let teardown = {
			let mut state = self.inner.state.lock();
			if !state.prepped {
				return;
			}
			state.teardown_requested = true;
			state.take_teardown(self.inner.pool.is_idle())
		};
		self.inner.finish_teardown(teardown);
	}

	/// Launches `term` against every eligible runner, or only against
	/// `runner_id` in single-runner mode.
	///
	/// Relaunching the current term is a no-op. An empty term resets,
	/// except in single-runner mode where the runner's default syntax
	/// supplies the query.
	pub fn launch_query(&self, term: &str, runner_id: Option<&str>) {
		self.setup_match_session();
		let runner_id = runner_id.filter(|id| !id.is_empty());
		self.set_single_mode_runner_id(runner_id);
		self.set_single_mode(runner_id.is_some());
		self.inner.launch(term.trim(), runner_id.is_some());
	}

	/// Runs `runner_id` synchronously on the calling thread against `term`.
	///
	/// Returns `false` without searching if the term is empty or unchanged,
	/// the runner is not loaded, or it ignores the term's kind.
	pub fn exec_query(&self, term: &str, runner_id: &str) -> bool {
		let term = term.trim();
		if term.is_empty() {
			self.reset();
			return false;
		}

		let class = classify(term);
		let mut state = self.inner.state.lock();
		if state.runners.is_empty() {
			self.inner.load_runners(&mut state);
		}
		if state.session.query() == term {
			drop(state);
			self.inner.publish_matches();
			return false;
		}

		let deferred = self.inner.reset_locked(&mut state);
		state.session.set_query_classified(term, class);
		let kind = state.session.kind();
		let runner = state.runners.get(runner_id).map(|slot| Arc::clone(&slot.runner)).filter(|runner| !runner.ignored_kinds().intersects(kind));
		let session = state.session.clone();
		drop(state);
		self.inner.run_deferred(deferred);

		let Some(runner) = runner else {
			tracing::debug!(runner = runner_id, term, "manager.exec_query_skipped");
			return false;
		};
		tracing::debug!(runner = runner_id, term, "manager.exec_query");
		runner.find_matches(&MatchContext::new(&session, &runner));
		self.inner.publish_matches();
		true
	}

	/// Abandons the current query.
	///
	/// Unstarted jobs are dequeued, running ones move to the old set, the
	/// session resets and any deferred run executes.
	pub fn reset(&self) {
		let (deferred, teardown) = {
			let mut state = self.inner.state.lock();
			let deferred = self.inner.reset_locked(&mut state);
			let teardown = state.take_teardown(self.inner.pool.is_idle());
			(deferred, teardown)
		};
		self.inner.run_deferred(deferred);
		self.inner.finish_teardown(teardown);
	}

	/// Executes `m`, or defers it while its runner is still searching.
	pub fn run(&self, m: &Match) {
		if !m.is_enabled() {
			tracing::debug!(id = m.id(), "manager.run_disabled");
			return;
		}
		let Some(runner) = m.runner() else {
			return;
		};
		let session = {
			let mut state = self.inner.state.lock();
			if state.has_active_job(&runner) {
				tracing::debug!(id = m.id(), "manager.run_deferred");
				state.deferred_run = Some(m.clone());
				return;
			}
			state.deferred_run = None;
			state.session.clone()
		};
		tracing::debug!(id = m.id(), "manager.run");
		session.run(m);
	}

	/// Looks up a current match by id and runs it. Returns whether it exists.
	pub fn run_id(&self, id: &str) -> bool {
		match self.session().match_by_id(id) {
			Some(m) => {
				self.run(&m);
				true
			}
			None => false,
		}
	}

	pub fn actions_for_match(&self, m: &Match) -> Vec<MatchAction> {
		m.runner().map(|runner| runner.actions_for_match(m)).unwrap_or_default()
	}
}

impl ManagerInner {
	fn launch(self: &Arc<Self>, term: &str, single_requested: bool) {
		let term = {
			let state = self.state.lock();
			if single_requested && state.current_single.is_none() {
				tracing::debug!(term, "manager.launch_without_single_runner");
				drop(state);
				self.reset_and_finish();
				return;
			}

			let term = if term.is_empty() {
				let seed = state
					.single_mode
					.then(|| state.current_single.as_ref().and_then(|runner| runner.default_syntax()))
					.flatten()
					.and_then(|syntax| syntax.seed_query())
					.filter(|seed| !seed.is_empty());
				match seed {
					Some(seed) => seed,
					None => {
						drop(state);
						self.reset_and_finish();
						return;
					}
				}
			} else {
				term.to_string()
			};

			if state.session.query() == term {
				tracing::trace!(term = term.as_str(), "manager.launch_unchanged");
				return;
			}
			term
		};

		// classify probes PATH and the filesystem: never under the state lock.
		let class = classify(&term);

		let mut state = self.state.lock();
		if state.session.query() == term {
			tracing::trace!(term = term.as_str(), "manager.launch_unchanged");
			return;
		}

		if state.runners.is_empty() {
			self.load_runners(&mut state);
		}

		let deferred = self.reset_locked(&mut state);
		state.session.set_query_classified(&term, class);
		state.session.set_single_runner_query_mode(state.single_mode);

		let weak = Arc::downgrade(self);
		self.admission.arm_delay(move || {
			if let Some(inner) = weak.upgrade() {
				inner.unblock_jobs();
			}
		});

		let kind = state.session.kind();
		for runner in state.runnable() {
			if !state.single_mode && runner.ignored_kinds().intersects(kind) {
				tracing::trace!(runner = runner.id(), ?kind, "manager.runner_ignores_kind");
				continue;
			}
			let (policies, delay) = self.admission.policies_for(&runner);
			let job = Arc::new(FindMatchesJob::new(runner, state.session.clone(), delay));
			let id = self.pool.enqueue(Arc::clone(&job), policies, Some(self.done_hook()));
			state.search_jobs.push(TrackedJob { id, job });
		}
		tracing::debug!(term = term.as_str(), ?kind, jobs = state.search_jobs.len(), single = state.single_mode, "manager.launch_query");
		drop(state);

		self.run_deferred(deferred);
	}

	fn done_hook(self: &Arc<Self>) -> DoneHook<FindMatchesJob> {
		let weak = Arc::downgrade(self);
		Box::new(move |job| {
			if let Some(inner) = weak.upgrade() {
				inner.job_done(&job);
			}
		})
	}

	fn job_done(&self, job: &Arc<FindMatchesJob>) {
		let mut state = self.state.lock();
		let deferred = if state.deferred_run.as_ref().is_some_and(|m| m.is_from(job.runner())) {
			state.deferred_run.take()
		} else {
			None
		};
		state.forget_job(job);
		let session = state.session.clone();
		let exhausted = state.search_jobs.is_empty() && job.session().same_instance(&session) && session.is_empty();
		let teardown = state.take_teardown(self.pool.is_idle());
		drop(state);

		tracing::trace!(runner = job.runner().id(), exhausted, "manager.job_done");
		if let Some(m) = deferred {
			tracing::debug!(id = m.id(), "manager.run_deferred_now");
			session.run(&m);
		}
		if exhausted {
			let _ = self.events.send(ManagerEvent::MatchesChanged(Arc::from(Vec::new())));
		}
		self.finish_teardown(teardown);
	}

	/// Delay timer expiry: lets slow jobs through, or finishes an idle session.
	fn unblock_jobs(&self) {
		let mut state = self.state.lock();
		if state.search_jobs.is_empty() && self.pool.is_idle() {
			state.old_jobs.clear();
			let teardown = state.take_teardown(true);
			drop(state);
			self.finish_teardown(teardown);
			return;
		}
		drop(state);
		tracing::trace!("manager.unblock_jobs");
		self.pool.reschedule();
	}

	/// Retires the current jobs and resets the session. Returns the deferred
	/// run to execute once the lock is released.
	fn reset_locked(&self, state: &mut ManagerState) -> Option<(Match, QuerySession)> {
		let mut dequeued = 0usize;
		for tracked in std::mem::take(&mut state.search_jobs) {
			if self.pool.dequeue_job(tracked.id) {
				dequeued += 1;
			} else {
				state.old_jobs.push(tracked.job);
			}
		}
		if self.pool.is_idle() {
			state.old_jobs.clear();
		}
		let deferred = state.deferred_run.take().filter(Match::is_enabled).map(|m| (m, state.session.clone()));
		state.session.reset();
		tracing::trace!(dequeued, old = state.old_jobs.len(), "manager.reset");
		deferred
	}

	fn reset_and_finish(&self) {
		let (deferred, teardown) = {
			let mut state = self.state.lock();
			let deferred = self.reset_locked(&mut state);
			(deferred, state.take_teardown(self.pool.is_idle()))
		};
		self.run_deferred(deferred);
		self.finish_teardown(teardown);
	}

	fn run_deferred(&self, deferred: Option<(Match, QuerySession)>) {
		if let Some((m, session)) = deferred {
			tracing::debug!(id = m.id(), "manager.run_deferred_on_reset");
			session.run(&m);
		}
	}

	fn finish_teardown(&self, teardown: Teardown) {
		if !teardown.finished {
			return;
		}
		for runner in &teardown.runners {
			runner.teardown();
		}
		tracing::debug!(runners = teardown.runners.len(), "manager.query_finished");
		let _ = self.events.send(ManagerEvent::QueryFinished);
	}

	fn publish_matches(&self) {
		let session = self.state.lock().session.clone();
		let matches: Arc<[Match]> = Arc::from(session.matches());
		tracing::trace!(count = matches.len(), "manager.matches_changed");
		let _ = self.events.send(ManagerEvent::MatchesChanged(matches));
	}

	/// Reconciles loaded runners with the registry's offers and the config.
	fn load_runners(&self, state: &mut ManagerState) {
		state.advertised_single.clear();
		for offer in self.registry.offers() {
			if let Some(exe) = offer.try_exec.as_deref()
				&& which::which(exe).is_err()
			{
				tracing::debug!(runner = offer.id.as_str(), exe, "manager.try_exec_missing");
				continue;
			}
			if offer.advertises_single_runner {
				state.advertised_single.insert(offer.id.clone(), offer.name.clone());
			}

			let selected = state.config.is_selected(&offer);
			let loaded = state.runners.contains_key(&offer.id);
			if selected && !loaded {
				match self.registry.instantiate(&offer) {
					Ok(runner) => {
						tracing::info!(runner = offer.id.as_str(), "manager.runner_loaded");
						state.runners.insert(offer.id.clone(), RunnerSlot::new(runner));
					}
					Err(error) => tracing::warn!(runner = offer.id.as_str(), %error, "manager.runner_load_failed"),
				}
			} else if !selected && loaded {
				tracing::debug!(runner = offer.id.as_str(), "manager.runner_unloaded");
				state.runners.remove(&offer.id);
			}
		}
		tracing::debug!(loaded = state.runners.len(), advertised = state.advertised_single.len(), "manager.load_runners");
	}

	/// Resolves `single_runner_id` into `current_single`, borrowing a loaded
	/// runner when possible and instantiating it otherwise.
	fn load_single_runner(&self, state: &mut ManagerState) {
		let Some(id) = state.single_runner_id.clone().filter(|_| state.single_mode) else {
			state.clear_single_runner();
			return;
		};
		if let Some(current) = &state.current_single {
			if current.id() == id {
				return;
			}
			state.clear_single_runner();
		}

		if state.runners.is_empty() {
			self.load_runners(state);
		}
		if let Some(slot) = state.runners.get(&id) {
			state.current_single = Some(Arc::clone(&slot.runner));
			state.single_runner_owned = false;
			return;
		}

		let Some(offer) = self.registry.offers().into_iter().find(|offer| offer.id == id) else {
			tracing::warn!(runner = id.as_str(), "manager.single_runner_unknown");
			return;
		};
		match self.registry.instantiate(&offer) {
			Ok(runner) => {
				tracing::info!(runner = id.as_str(), "manager.single_runner_loaded");
				state.current_single = Some(runner);
				state.single_runner_owned = true;
			}
			Err(error) => tracing::warn!(runner = id.as_str(), %error, "manager.single_runner_load_failed"),
		}
	}
}

impl Drop for RunnerManager {
	fn drop(&mut self) {
		let inner = &self.inner;
		inner.debouncer.cancel();
		inner.admission.delay_timer().stop();

		let (mut jobs, runners) = {
			let mut state = inner.state.lock();
			let mut jobs = std::mem::take(&mut state.old_jobs);
			for tracked in std::mem::take(&mut state.search_jobs) {
				if !inner.pool.dequeue_job(tracked.id) {
					jobs.push(tracked.job);
				}
			}
			let mut runners: Vec<RunnerRef> = std::mem::take(&mut state.runners).into_values().map(|slot| slot.runner).collect();
			runners.extend(state.current_single.take());
			state.deferred_run = None;
			(jobs, runners)
		};
		inner.launch_counts.save();

		jobs.retain(|job| !job.is_finished());
		if !jobs.is_empty() {
			DelayedJobCleaner::new(jobs, runners, inner.pool.clone()).spawn();
		}
	}
}
