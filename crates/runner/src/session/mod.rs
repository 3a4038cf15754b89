//! Query sessions.
//!
//! # Mental model
//!
//! * A [`QuerySession`] is a cheap handle. Clones share one *session
//!   instance*: the query term, its classification and the match list.
//! * [`QuerySession::reset`] swaps a fresh instance into *this* handle and
//!   invalidates the old one. Jobs still holding clones of the old instance
//!   keep working against it, but every mutation they attempt is dropped.
//! * Launch counters and the change notifier live outside the instance and
//!   survive resets.
//!
//! # Invariants
//!
//! * Once invalid, an instance never becomes valid again and its match list
//!   never changes again. Validity is checked under the instance write lock,
//!   and invalidation takes the same lock.
//! * `by_id` always maps each id to the index of its most recent match.
//! * Observers always see matches sorted best-first.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use quarry_worker::GenerationClock;

use crate::kind::{self, Classification, QueryKind};
use crate::learning::{self, LaunchCounts};
use crate::query_match::{self, Match};
use crate::runner::RunnerRef;


/// Callback fired after every match-list change of a valid instance.
pub type ChangeNotifier = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SessionState {
	term: String,
	kind: QueryKind,
	mime_type: Option<String>,
	matches: Vec<Match>,
	by_id: HashMap<String, usize>,
	single_runner: bool,
}

impl SessionState {
	fn reindex(&mut self) {
		self.by_id.clear();
		for (idx, m) in self.matches.iter().enumerate() {
			self.by_id.insert(m.id().to_string(), idx);
		}
	}
}

struct SessionData {
	generation: u64,
	valid: AtomicBool,
	state: RwLock<SessionState>,
}

impl SessionData {
	fn new(generation: u64) -> Self {
		Self {
			generation,
			valid: AtomicBool::new(true),
			state: RwLock::new(SessionState::default()),
		}
	}
}

struct SessionShared {
	launch_counts: Arc<LaunchCounts>,
	notifier: RwLock<Option<ChangeNotifier>>,
	generations: GenerationClock,
}

/// Shared, resettable container for one query and its matches.
#[derive(Clone)]
pub struct QuerySession {
	data: Arc<SessionData>,
	shared: Arc<SessionShared>,
}

impl fmt::Debug for QuerySession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.data.state.read();
		f.debug_struct("QuerySession")
			.field("generation", &self.data.generation)
			.field("valid", &self.is_valid())
			.field("term", &state.term)
			.field("kind", &state.kind)
			.field("matches", &state.matches.len())
			.finish()
	}
}

impl Default for QuerySession {
	fn default() -> Self {
		Self::new()
	}
}

impl QuerySession {
	/// Creates a session with in-memory launch counters.
	pub fn new() -> Self {
		Self::with_launch_counts(Arc::new(LaunchCounts::new()))
	}

	pub fn with_launch_counts(launch_counts: Arc<LaunchCounts>) -> Self {
		let generations = GenerationClock::new();
		let data = Arc::new(SessionData::new(generations.next()));
		Self {
			data,
			shared: Arc::new(SessionShared {
				launch_counts,
				notifier: RwLock::new(None),
				generations,
			}),
		}
	}

	/// Installs the callback fired after match-list changes.
	pub fn set_change_notifier(&self, notifier: Option<ChangeNotifier>) {
		*self.shared.notifier.write() = notifier;
	}

	pub fn launch_counts(&self) -> &Arc<LaunchCounts> {
		&self.shared.launch_counts
	}

	/// Whether this handle still refers to the live instance.
	pub fn is_valid(&self) -> bool {
		self.data.valid.load(Ordering::Acquire)
	}

	/// Instance generation; bumps on every reset.
	pub fn generation(&self) -> u64 {
		self.data.generation
	}

	/// Whether two handles share one instance.
	pub fn same_instance(&self, other: &QuerySession) -> bool {
		Arc::ptr_eq(&self.data, &other.data)
	}

	/// Invalidates the current instance and starts a fresh, empty one.
	pub fn reset(&mut self) {
		let had_matches = {
			let state = self.data.state.write();
			self.data.valid.store(false, Ordering::Release);
			!state.matches.is_empty()
		};
		self.data = Arc::new(SessionData::new(self.shared.generations.next()));
		tracing::trace!(generation = self.data.generation, had_matches, "session.reset");
		if had_matches {
			self.notify_changed();
		}
	}

	/// Resets, then stores and classifies `term`.
	///
	/// An empty term leaves the fresh instance without a query.
	pub fn set_query(&mut self, term: &str) {
		let class = if term.is_empty() { Classification::default() } else { kind::classify(term) };
		self.set_query_classified(term, class);
	}

	/// Like [`set_query`](Self::set_query) with a classification computed
	/// beforehand, so callers holding locks skip the filesystem probes.
	pub fn set_query_classified(&mut self, term: &str, class: Classification) {
		self.reset();
		if term.is_empty() {
			return;
		}
		let mut state = self.data.state.write();
		state.term = term.to_string();
		state.kind = class.kind;
		state.mime_type = class.mime_type;
		tracing::debug!(term, kind = ?state.kind, "session.set_query");
	}

	pub fn query(&self) -> String {
		self.data.state.read().term.clone()
	}

	pub fn kind(&self) -> QueryKind {
		self.data.state.read().kind
	}

	pub fn mime_type(&self) -> Option<String> {
		self.data.state.read().mime_type.clone()
	}

	pub fn set_single_runner_query_mode(&self, enabled: bool) {
		self.data.state.write().single_runner = enabled;
	}

	pub fn single_runner_query_mode(&self) -> bool {
		self.data.state.read().single_runner
	}

	/// Adds a batch of matches, boosting each by `0.5 * (1 - e^(-0.3 n))` for
	/// `n` past launches of its id.
	///
	/// Returns `false` when the batch is empty or the instance is stale.
	pub fn add_matches(&self, matches: Vec<Match>) -> bool {
		if matches.is_empty() {
			return false;
		}
		self.insert(matches, learning::bulk_boost)
	}

	/// Adds one match, boosting it by `0.05 * n` for `n` past launches of its id.
	///
	/// Returns `false` when the instance is stale.
	pub fn add_match(&self, m: Match) -> bool {
		self.insert(vec![m], learning::single_boost)
	}

	fn insert(&self, matches: Vec<Match>, boost: fn(u32) -> f64) -> bool {
		let added = {
			let mut state = self.data.state.write();
			if !self.is_valid() {
				tracing::trace!(generation = self.data.generation, "session.add_stale");
				return false;
			}
			let added = matches.len();
			for mut m in matches {
				let count = self.shared.launch_counts.count(m.id());
				if count > 0 {
					m.set_relevance(m.relevance() + boost(count));
				}
				let idx = state.matches.len();
				if state.by_id.insert(m.id().to_string(), idx).is_some() {
					tracing::debug!(id = m.id(), "session.duplicate_match_id");
				}
				state.matches.push(m);
			}
			added
		};
		tracing::trace!(added, "session.add_matches");
		self.notify_changed();
		true
	}

	/// Removes every match with `id`. Returns whether anything was removed.
	pub fn remove_match(&self, id: &str) -> bool {
		self.remove_matches(&[id])
	}

	/// Removes every match whose id is in `ids`. Returns whether anything was removed.
	pub fn remove_matches(&self, ids: &[&str]) -> bool {
		let removed = {
			let mut state = self.data.state.write();
			if !self.is_valid() {
				return false;
			}
			let before = state.matches.len();
			state.matches.retain(|m| !ids.contains(&m.id()));
			let removed = before - state.matches.len();
			if removed > 0 {
				state.reindex();
			}
			removed
		};
		if removed == 0 {
			return false;
		}
		tracing::trace!(removed, "session.remove_matches");
		self.notify_changed();
		true
	}

	/// Snapshot of all matches, best first.
	pub fn matches(&self) -> Vec<Match> {
		let mut matches = self.data.state.read().matches.clone();
		query_match::sort_matches(&mut matches);
		matches
	}

	/// Most recently added match with `id`.
	pub fn match_by_id(&self, id: &str) -> Option<Match> {
		let state = self.data.state.read();
		state.by_id.get(id).and_then(|&idx| state.matches.get(idx)).cloned()
	}

	pub fn len(&self) -> usize {
		self.data.state.read().matches.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Records a launch of `m` and hands it to its runner.
	///
	/// Must be called without manager locks held; the runner may call back.
	pub fn run(&self, m: &Match) {
		self.shared.launch_counts.record_launch(m.id());
		match m.runner() {
			Some(runner) => runner.run(self, m),
			None => tracing::debug!(id = m.id(), "session.run_unloaded_runner"),
		}
	}

	fn notify_changed(&self) {
		let notifier = self.shared.notifier.read().clone();
		if let Some(notifier) = notifier {
			notifier();
		}
	}
}

/// What a runner sees while producing matches.
///
/// Binds a session handle to the runner doing the work so that new matches
/// carry their owner.
pub struct MatchContext<'a> {
	session: &'a QuerySession,
	runner: &'a RunnerRef,
}

impl<'a> MatchContext<'a> {
	pub fn new(session: &'a QuerySession, runner: &'a RunnerRef) -> Self {
		Self { session, runner }
	}

	pub fn session(&self) -> &QuerySession {
		self.session
	}

	pub fn query(&self) -> String {
		self.session.query()
	}

	pub fn kind(&self) -> QueryKind {
		self.session.kind()
	}

	pub fn mime_type(&self) -> Option<String> {
		self.session.mime_type()
	}

	pub fn single_runner_query_mode(&self) -> bool {
		self.session.single_runner_query_mode()
	}

	/// `false` once the session moved on; runners should stop early.
	pub fn is_valid(&self) -> bool {
		self.session.is_valid()
	}

	/// Fresh match owned by the current runner.
	pub fn new_match(&self) -> Match {
		Match::new(self.runner)
	}

	pub fn add_match(&self, m: Match) -> bool {
		self.session.add_match(m)
	}

	pub fn add_matches(&self, matches: Vec<Match>) -> bool {
		self.session.add_matches(matches)
	}
}
