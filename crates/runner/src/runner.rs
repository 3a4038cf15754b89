//! Runner plugin contract.

use std::sync::Arc;

use crate::kind::QueryKind;
use crate::query_match::{Match, MatchAction};
use crate::session::{MatchContext, QuerySession};

/// Placeholder standing for the user's query inside syntax examples.
pub const QUERY_PLACEHOLDER: &str = ":q:";

/// Shared handle to a loaded runner.
pub type RunnerRef = Arc<dyn Runner>;

/// Scheduling speed class of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunnerSpeed {
	/// Admitted only after the shared slow-runner delay elapses.
	Slow,
	/// Admitted immediately, subject to the per-runner rate cap.
	#[default]
	Normal,
}

/// Queue priority of a runner's jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RunnerPriority {
	Lowest = 0,
	Low = 1,
	#[default]
	Normal = 2,
	High = 3,
	Highest = 4,
}

/// Describes a query form a runner understands, e.g. `define :q:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSyntax {
	example_queries: Vec<String>,
	description: String,
}

impl RunnerSyntax {
	pub fn new(example: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			example_queries: vec![example.into()],
			description: description.into(),
		}
	}

	pub fn add_example_query(&mut self, example: impl Into<String>) {
		self.example_queries.push(example.into());
	}

	/// Example queries; [`QUERY_PLACEHOLDER`] marks where the user's term goes.
	pub fn example_queries(&self) -> &[String] {
		&self.example_queries
	}

	pub fn description(&self) -> &str {
		&self.description
	}

	/// First example with the placeholder removed, used to seed an empty
	/// single-runner query.
	pub fn seed_query(&self) -> Option<String> {
		self.example_queries.first().map(|example| example.replace(QUERY_PLACEHOLDER, "").trim().to_string())
	}
}

/// A query plugin.
///
/// `find_matches` runs on pool threads and may run concurrently for
/// different sessions; implementations must check
/// [`MatchContext::is_valid`] before doing expensive work and must not block
/// indefinitely. Lifecycle hooks and `run` are always called without any
/// manager lock held, so they may call back into the manager.
pub trait Runner: Send + Sync + 'static {
	/// Stable identifier, used for match ids, whitelists and launch counts.
	fn id(&self) -> &str;

	/// Display name. Rate caps are keyed by this.
	fn name(&self) -> &str {
		self.id()
	}

	fn speed(&self) -> RunnerSpeed {
		RunnerSpeed::Normal
	}

	fn priority(&self) -> RunnerPriority {
		RunnerPriority::Normal
	}

	/// Query kinds this runner skips outside single-runner mode.
	fn ignored_kinds(&self) -> QueryKind {
		QueryKind::empty()
	}

	fn syntaxes(&self) -> Vec<RunnerSyntax> {
		Vec::new()
	}

	fn default_syntax(&self) -> Option<RunnerSyntax> {
		self.syntaxes().into_iter().next()
	}

	/// Called once per match session before the first query.
	fn prepare(&self) {}

	/// Called once the match session ended and no job of it is running.
	fn teardown(&self) {}

	/// Produces matches for the context's query.
	fn find_matches(&self, ctx: &MatchContext<'_>);

	/// Executes a match this runner produced.
	fn run(&self, session: &QuerySession, m: &Match) {
		let _ = (session, m);
	}

	/// Secondary actions offered for `m`.
	fn actions_for_match(&self, m: &Match) -> Vec<MatchAction> {
		let _ = m;
		Vec::new()
	}
}

/// Identity comparison for runner handles, ignoring vtable metadata.
pub fn same_runner(a: &RunnerRef, b: &RunnerRef) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
