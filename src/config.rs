use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelinkError, Result};

/// Tool configuration, loadable from a TOML file.
///
/// The file may either hold the fields at the top level or nest them under a
/// `[relink]` table; both forms parse to the same struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
	/// File extensions that are tracked (with leading dot, e.g. ".pack").
	pub extensions: Vec<String>,
	/// Regex patterns for directory names to skip during watching and scanning.
	pub ignore_dirs: Vec<String>,
	/// Seconds a deletion stays pending before it is flushed as unmatched.
	pub debounce_delay: f64,
	/// Move log location used when the CLI does not override it.
	pub log_path: PathBuf,
	/// Log verbosity (trace, debug, info, warn, error).
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			extensions: vec![".pack".to_string()],
			ignore_dirs: vec![
				r"^\.git$".to_string(),
				r"^\.svn$".to_string(),
				r"^node_modules$".to_string(),
				r"^target$".to_string(),
			],
			debounce_delay: 2.0,
			log_path: PathBuf::from("relink-moves.jsonl"),
			log_level: "info".to_string(),
		}
	}
}

/// Wrapper used to accept the nested `[relink]` table form.
#[derive(Debug, Deserialize)]
struct NestedConfig {
	relink: Config,
}

impl Config {
	/// Load configuration from a TOML file, accepting flat or `[relink]`-nested
	/// layouts. Missing file is an error; callers that want defaults should use
	/// `Config::load_or_default`.
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		let config = match toml::from_str::<NestedConfig>(&raw) {
			Ok(nested) => nested.relink,
			Err(_) => toml::from_str::<Config>(&raw)?,
		};
		config.validate()?;
		Ok(config)
	}

	/// Load from `path` if given and present, otherwise fall back to defaults.
	pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
		match path {
			Some(p) if p.exists() => Self::load(p),
			Some(p) => Err(RelinkError::InvalidPath { path: p.display().to_string() }),
			None => Ok(Self::default()),
		}
	}

	/// Validate field ranges and compile-check the ignore patterns.
	pub fn validate(&self) -> Result<()> {
		if self.debounce_delay <= 0.0 {
			return Err(RelinkError::configuration(
				"debounce_delay",
				"must be positive",
				"> 0.0",
				&self.debounce_delay.to_string(),
			));
		}

		if self.extensions.is_empty() {
			return Err(RelinkError::configuration(
				"extensions",
				"at least one extension is required",
				"non-empty list",
				"[]",
			));
		}

		for ext in &self.extensions {
			if !ext.starts_with('.') {
				return Err(RelinkError::configuration(
					"extensions",
					"extensions must include the leading dot",
					".pack",
					ext,
				));
			}
		}

		for pattern in &self.ignore_dirs {
			Regex::new(pattern).map_err(|source| RelinkError::InvalidPattern {
				pattern: pattern.clone(),
				source,
			})?;
		}

		Ok(())
	}

	/// Compile the ignore patterns. `validate` has already checked them, so
	/// this only fails if called on an unvalidated config.
	pub fn compiled_ignores(&self) -> Result<Vec<Regex>> {
		self.ignore_dirs
			.iter()
			.map(|pattern| {
				Regex::new(pattern).map_err(|source| RelinkError::InvalidPattern {
					pattern: pattern.clone(),
					source,
				})
			})
			.collect()
	}

	/// Whether `path` has one of the tracked extensions.
	pub fn matches_extension(&self, path: &Path) -> bool {
		let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
			return false;
		};
		let dotted = format!(".{}", ext.to_lowercase());
		self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&dotted))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write as _;

	#[test]
	fn test_default_config_is_valid() {
		let config = Config::default();
		assert!(config.validate().is_ok());
		assert!(config.matches_extension(Path::new("scene.pack")));
		assert!(!config.matches_extension(Path::new("notes.txt")));
		assert!(!config.matches_extension(Path::new("Makefile")));
	}

	#[test]
	fn test_load_flat_toml() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
extensions = [".pack", ".bundle"]
ignore_dirs = ["^\\.git$"]
debounce_delay = 1.5
"#
		)
		.unwrap();

		let config = Config::load(file.path()).unwrap();
		assert_eq!(config.extensions, vec![".pack", ".bundle"]);
		assert_eq!(config.debounce_delay, 1.5);
		// Unset fields fall back to defaults
		assert_eq!(config.log_level, "info");
	}

	#[test]
	fn test_load_nested_toml() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[relink]
extensions = [".pack"]
debounce_delay = 3.0
"#
		)
		.unwrap();

		let config = Config::load(file.path()).unwrap();
		assert_eq!(config.debounce_delay, 3.0);
	}

	#[test]
	fn test_invalid_debounce_rejected() {
		let config = Config { debounce_delay: 0.0, ..Config::default() };
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_extension_without_dot_rejected() {
		let config = Config { extensions: vec!["pack".to_string()], ..Config::default() };
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_bad_ignore_pattern_rejected() {
		let config = Config { ignore_dirs: vec!["[unclosed".to_string()], ..Config::default() };
		let err = config.validate().unwrap_err();
		assert!(matches!(err, RelinkError::InvalidPattern { .. }));
	}

	#[test]
	fn test_missing_explicit_config_is_error() {
		let result = Config::load_or_default(Some(Path::new("/nonexistent/relink.toml")));
		assert!(result.is_err());
	}

	#[test]
	fn test_case_insensitive_extension_match() {
		let config = Config::default();
		assert!(config.matches_extension(Path::new("SCENE.PACK")));
	}
}
