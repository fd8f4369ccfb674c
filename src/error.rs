use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the relink crate.
///
/// Variants map to the failure domains the tool crosses: watching the
/// filesystem, correlating events, persisting the move log, and patching
/// container files. Container-level corruption is kept separate from plain
/// I/O so callers can skip a bad file without aborting a whole update run.
#[derive(Error, Debug)]
pub enum RelinkError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Notify error: {0}")]
	Notify(#[from] notify::Error),

	#[error("JSON serialization error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Config parse error: {0}")]
	ConfigParse(#[from] toml::de::Error),

	#[error("Invalid ignore pattern '{pattern}': {source}")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},

	#[error("Invalid path: {path}")]
	InvalidPath { path: String },

	#[error("Channel send error")]
	ChannelSend,

	#[error("Watcher not initialized")]
	NotInitialized,

	#[error("Failed to send stop signal to watcher")]
	StopSignal,

	#[error(
		"Configuration error: {parameter} - {reason} (expected: {expected}, actual: {actual})"
	)]
	Configuration {
		parameter: String,
		reason: String,
		expected: String,
		actual: String,
	},

	#[error("Malformed container {path}: {detail}")]
	MalformedContainer { path: PathBuf, detail: String },

	#[error("Move log error at {path}: {detail}")]
	MoveLog { path: PathBuf, detail: String },
}

impl RelinkError {
	/// Whether the error poisons only a single container file.
	///
	/// Per-file errors are logged and counted; the update run continues with
	/// the remaining files. Everything else aborts the run.
	pub fn is_per_file(&self) -> bool {
		matches!(self, RelinkError::MalformedContainer { .. })
	}

	/// Error category for logging and counters.
	pub fn category(&self) -> &'static str {
		match self {
			RelinkError::Io(_) => "io",
			RelinkError::Notify(_) => "notify",
			RelinkError::Json(_) => "serialization",
			RelinkError::ConfigParse(_) => "configuration",
			RelinkError::InvalidPattern { .. } => "configuration",
			RelinkError::InvalidPath { .. } => "configuration",
			RelinkError::ChannelSend => "channel",
			RelinkError::NotInitialized => "initialization",
			RelinkError::StopSignal => "shutdown",
			RelinkError::Configuration { .. } => "configuration",
			RelinkError::MalformedContainer { .. } => "container",
			RelinkError::MoveLog { .. } => "move_log",
		}
	}

	/// Create a configuration error.
	pub fn configuration(parameter: &str, reason: &str, expected: &str, actual: &str) -> Self {
		RelinkError::Configuration {
			parameter: parameter.to_string(),
			reason: reason.to_string(),
			expected: expected.to_string(),
			actual: actual.to_string(),
		}
	}

	/// Create a malformed-container error.
	pub fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
		RelinkError::MalformedContainer { path: path.into(), detail: detail.into() }
	}

	/// Create a move-log error.
	pub fn move_log(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
		RelinkError::MoveLog { path: path.into(), detail: detail.into() }
	}
}

pub type Result<T> = std::result::Result<T, RelinkError>;
