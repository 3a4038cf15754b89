//! Error types for runner loading.

use thiserror::Error;

/// Errors raised while turning a registry offer into a live runner.
///
/// These never escape query dispatch: the manager logs them and leaves the
/// runner out of the runnable set.
#[derive(Debug, Error)]
pub enum RunnerLoadError {
	/// The plugin factory failed.
	#[error("runner {id} failed to initialize: {reason}")]
	Instantiation {
		/// Offer id.
		id: String,
		/// Factory-provided reason.
		reason: String,
	},

	/// The plugin was built against an interface version this host does not speak.
	#[error("runner {id} targets incompatible plugin interface version {version}")]
	Incompatible {
		/// Offer id.
		id: String,
		/// Interface version the plugin reported.
		version: u32,
	},

	/// No offer exists under this id.
	#[error("unknown runner: {0}")]
	Unknown(String),
}
