//! Error types for configuration storage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// Error serializing a value back to TOML.
	#[error("TOML serialize error: {0}")]
	Serialize(#[from] toml::ser::Error),

	/// Error reading or writing a configuration file.
	#[error("I/O error on {path}: {error}")]
	Io {
		/// Path to the file that failed.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// An entry exists but holds a value of the wrong shape.
	#[error("invalid entry {group}.{key}: {reason}")]
	InvalidEntry {
		/// Group the entry lives in.
		group: String,
		/// Entry key.
		key: String,
		/// What was wrong with it.
		reason: String,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
