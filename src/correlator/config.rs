use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RelinkError, Result};

fn default_debounce() -> Duration {
	Duration::from_secs(2)
}

/// Tuning for delete/create correlation.
///
/// The weights feed the default `MetadataScorer`; they should sum to
/// approximately 1.0 so the confidence score stays interpretable against the
/// threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorrelatorConfig {
	/// How long a deletion stays pending before it is dropped as a plain
	/// deletion. Set from the top-level `debounce_delay`, not from TOML.
	#[serde(skip, default = "default_debounce")]
	pub debounce: Duration,
	/// Minimum confidence for a delete/create pair to become a move.
	pub confidence_threshold: f32,
	/// Weight for exact size equality.
	pub weight_size_match: f32,
	/// Weight for modification-time equality.
	pub weight_mtime_match: f32,
	/// Weight for temporal proximity of the two events.
	pub weight_time_factor: f32,
	/// Weight for content hash (files) or child fingerprint (directories).
	pub weight_content_hash: f32,
	/// Weight for file name similarity.
	pub weight_name_similarity: f32,
	/// Cap on simultaneously pending deletions.
	pub max_pending: usize,
	/// Files larger than this are not content-hashed.
	pub content_hash_max_file_size: u64,
}

impl Default for CorrelatorConfig {
	fn default() -> Self {
		Self {
			debounce: default_debounce(),
			confidence_threshold: 0.7,
			weight_size_match: 0.2,
			weight_mtime_match: 0.15,
			weight_time_factor: 0.15,
			weight_content_hash: 0.35,
			weight_name_similarity: 0.15,
			max_pending: 1000,
			content_hash_max_file_size: 1024 * 1024,
		}
	}
}

impl CorrelatorConfig {
	pub fn with_debounce(debounce: Duration) -> Self {
		Self { debounce, ..Default::default() }
	}

	pub fn validate(&self) -> Result<()> {
		if !(0.0..=1.0).contains(&self.confidence_threshold) {
			return Err(RelinkError::configuration(
				"confidence_threshold",
				"must be between 0.0 and 1.0",
				"0.0..=1.0",
				&self.confidence_threshold.to_string(),
			));
		}

		if self.max_pending == 0 {
			return Err(RelinkError::configuration(
				"max_pending",
				"must be greater than 0",
				"> 0",
				"0",
			));
		}

		if self.debounce.is_zero() {
			return Err(RelinkError::configuration(
				"debounce",
				"must be positive",
				"> 0",
				"0",
			));
		}

		let total_weight = self.weight_size_match
			+ self.weight_mtime_match
			+ self.weight_time_factor
			+ self.weight_content_hash
			+ self.weight_name_similarity;

		if (total_weight - 1.0).abs() > 0.1 {
			return Err(RelinkError::configuration(
				"weights",
				"signal weights should sum to approximately 1.0",
				"~1.0",
				&format!("{total_weight:.2}"),
			));
		}

		Ok(())
	}
}
