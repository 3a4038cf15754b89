//! Runner discovery.
//!
//! A [`RunnerRegistry`] advertises [`RunnerOffer`]s and turns the selected
//! ones into live runners. The manager owns selection (whitelist, enable
//! flags, `TryExec` probing); registries only describe and build.

use std::fmt;
use std::sync::Arc;

use crate::error::RunnerLoadError;
use crate::runner::RunnerRef;

/// Metadata describing a loadable runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOffer {
	pub id: String,
	pub name: String,
	/// Loaded unless the config says otherwise.
	pub enabled_by_default: bool,
	/// Listed among runners selectable for single-runner mode.
	pub advertises_single_runner: bool,
	/// Executable that must exist on `PATH` for the runner to be offered.
	pub try_exec: Option<String>,
}

impl RunnerOffer {
	pub fn new(id: impl Into<String>) -> Self {
		let id = id.into();
		Self {
			name: id.clone(),
			id,
			enabled_by_default: true,
			advertises_single_runner: false,
			try_exec: None,
		}
	}
}

/// Source of runner offers and instances.
pub trait RunnerRegistry: Send + Sync {
	fn offers(&self) -> Vec<RunnerOffer>;

	fn instantiate(&self, offer: &RunnerOffer) -> Result<RunnerRef, RunnerLoadError>;
}

type Factory = Arc<dyn Fn() -> Result<RunnerRef, RunnerLoadError> + Send + Sync>;

/// In-process registry backed by factory closures.
#[derive(Default, Clone)]
pub struct StaticRegistry {
	entries: Vec<(RunnerOffer, Factory)>,
}

impl fmt::Debug for StaticRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.entries.iter().map(|(offer, _)| &offer.id)).finish()
	}
}

impl StaticRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Offers an already built runner under its own id.
	pub fn with_runner(self, runner: RunnerRef) -> Self {
		let offer = RunnerOffer {
			name: runner.name().to_string(),
			..RunnerOffer::new(runner.id())
		};
		self.with_factory(offer, move || Ok(Arc::clone(&runner)))
	}

	pub fn with_factory<F>(mut self, offer: RunnerOffer, factory: F) -> Self
	where
		F: Fn() -> Result<RunnerRef, RunnerLoadError> + Send + Sync + 'static,
	{
		self.entries.push((offer, Arc::new(factory)));
		self
	}
}

impl RunnerRegistry for StaticRegistry {
	fn offers(&self) -> Vec<RunnerOffer> {
		self.entries.iter().map(|(offer, _)| offer.clone()).collect()
	}

	fn instantiate(&self, offer: &RunnerOffer) -> Result<RunnerRef, RunnerLoadError> {
		let (_, factory) = self
			.entries
			.iter()
			.find(|(known, _)| known.id == offer.id)
			.ok_or_else(|| RunnerLoadError::Unknown(offer.id.clone()))?;
		factory()
	}
}
