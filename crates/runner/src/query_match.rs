//! Match values produced by runners.
//!
//! A [`Match`] is a plain value: clones are independent. It refers back to
//! its runner weakly, so a match outliving an unloaded runner simply reports
//! itself disabled instead of keeping the plugin alive.

use std::cmp::Ordering;
use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::runner::{Runner, RunnerRef};

/// Match category. Declaration order is rank order: later variants sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MatchType {
	/// Partial completion of the query.
	Completion,
	/// Plausible but unconfirmed result.
	Possible,
	/// Informational result; not meant to be run.
	Informational,
	/// Hint about how to phrase a query.
	Helper,
	/// Exact answer to the query.
	#[default]
	Exact,
}

/// Secondary action a runner offers for one of its matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAction {
	pub id: String,
	pub text: String,
	pub icon: Option<String>,
}

impl MatchAction {
	pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			text: text.into(),
			icon: None,
		}
	}
}

/// Relevance assigned to fresh matches.
pub const DEFAULT_RELEVANCE: f64 = 0.7;

/// One result produced by a runner.
#[derive(Debug, Clone)]
pub struct Match {
	runner: Option<Weak<dyn Runner>>,
	runner_id: Arc<str>,
	match_type: MatchType,
	relevance: f64,
	id: String,
	id_from_data: bool,
	text: String,
	subtext: String,
	icon: Option<String>,
	data: Value,
	enabled: bool,
	selected_action: Option<String>,
}

impl Match {
	/// Creates an [`Exact`](MatchType::Exact) match owned by `runner`.
	pub fn new(runner: &RunnerRef) -> Self {
		let runner_id: Arc<str> = Arc::from(runner.id());
		Self {
			runner: Some(Arc::downgrade(runner)),
			id: runner_id.to_string(),
			runner_id,
			match_type: MatchType::default(),
			relevance: DEFAULT_RELEVANCE,
			id_from_data: false,
			text: String::new(),
			subtext: String::new(),
			icon: None,
			data: Value::Null,
			enabled: true,
			selected_action: None,
		}
	}

	/// Creates a match bound to no runner. It is never valid or enabled.
	pub fn detached() -> Self {
		Self {
			runner: None,
			runner_id: Arc::from(""),
			match_type: MatchType::default(),
			relevance: DEFAULT_RELEVANCE,
			id: String::new(),
			id_from_data: false,
			text: String::new(),
			subtext: String::new(),
			icon: None,
			data: Value::Null,
			enabled: false,
			selected_action: None,
		}
	}

	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.text = text.into();
		self
	}

	pub fn with_type(mut self, match_type: MatchType) -> Self {
		self.match_type = match_type;
		self
	}

	pub fn with_relevance(mut self, relevance: f64) -> Self {
		self.set_relevance(relevance);
		self
	}

	pub fn with_id(mut self, id: &str) -> Self {
		self.set_id(id);
		self
	}

	/// Live runner handle, if the runner is still loaded.
	pub fn runner(&self) -> Option<RunnerRef> {
		self.runner.as_ref()?.upgrade()
	}

	/// Whether this match was produced by `runner`.
	pub fn is_from(&self, runner: &RunnerRef) -> bool {
		self.runner.as_ref().is_some_and(|weak| std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(runner)))
	}

	pub fn runner_id(&self) -> &str {
		&self.runner_id
	}

	/// Caller-visible id, `<runner id>_<suffix>` once [`set_id`](Self::set_id) ran.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Scopes `suffix` under the runner id. An empty suffix leaves the bare runner id.
	pub fn set_id(&mut self, suffix: &str) {
		self.id_from_data = false;
		self.id = if suffix.is_empty() {
			self.runner_id.to_string()
		} else {
			format!("{}_{suffix}", self.runner_id)
		};
	}

	pub fn match_type(&self) -> MatchType {
		self.match_type
	}

	pub fn set_match_type(&mut self, match_type: MatchType) {
		self.match_type = match_type;
	}

	pub fn relevance(&self) -> f64 {
		self.relevance
	}

	/// Sets relevance clamped to `[0, 1]`. `NaN` becomes `0`.
	pub fn set_relevance(&mut self, relevance: f64) {
		self.relevance = if relevance.is_nan() { 0.0 } else { relevance.clamp(0.0, 1.0) };
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn set_text(&mut self, text: impl Into<String>) {
		self.text = text.into();
	}

	pub fn subtext(&self) -> &str {
		&self.subtext
	}

	pub fn set_subtext(&mut self, subtext: impl Into<String>) {
		self.subtext = subtext.into();
	}

	pub fn icon(&self) -> Option<&str> {
		self.icon.as_deref()
	}

	pub fn set_icon(&mut self, icon: impl Into<String>) {
		self.icon = Some(icon.into());
	}

	pub fn data(&self) -> &Value {
		&self.data
	}

	/// Stores a payload. Scalar payloads also become the id suffix unless an
	/// explicit id was set.
	pub fn set_data(&mut self, data: Value) {
		if self.id == *self.runner_id || self.id_from_data {
			let suffix = match &data {
				Value::String(s) => Some(s.clone()),
				Value::Number(n) => Some(n.to_string()),
				Value::Bool(b) => Some(b.to_string()),
				_ => None,
			};
			if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
				self.set_id(&suffix);
				self.id_from_data = true;
			}
		}
		self.data = data;
	}

	/// Enabled and still backed by a loaded runner.
	pub fn is_enabled(&self) -> bool {
		self.enabled && self.runner().is_some()
	}

	pub fn set_enabled(&mut self, enabled: bool) {
		self.enabled = enabled;
	}

	/// Bound to a runner at construction.
	pub fn is_valid(&self) -> bool {
		self.runner.is_some()
	}

	pub fn selected_action(&self) -> Option<&str> {
		self.selected_action.as_deref()
	}

	pub fn set_selected_action(&mut self, action: Option<String>) {
		self.selected_action = action;
	}
}

/// Best-first ordering: type, then enabled, then relevance, then text in
/// reverse lexical order.
pub fn compare_rank(a: &Match, b: &Match) -> Ordering {
	b.match_type
		.cmp(&a.match_type)
		.then_with(|| b.is_enabled().cmp(&a.is_enabled()))
		.then_with(|| b.relevance.total_cmp(&a.relevance))
		.then_with(|| b.text.cmp(&a.text))
}

/// Sorts `matches` best-first. Stable, so equal matches keep insertion order.
pub fn sort_matches(matches: &mut [Match]) {
	matches.sort_by(compare_rank);
}
