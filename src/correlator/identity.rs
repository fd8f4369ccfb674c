use std::collections::HashMap;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::time::Instant;
use twox_hash::XxHash64;

use crate::correlator::config::CorrelatorConfig;
use crate::correlator::pending::PendingDeletion;

/// Identity evidence for one filesystem entry.
///
/// Captured while the entry is still reachable; for the deleted half of a
/// move the evidence comes from the metadata cache, not the filesystem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentitySignals {
	/// File size in bytes; `None` for directories and unreadable entries.
	pub size: Option<u64>,
	/// Modification time, seconds since the Unix epoch.
	pub mtime_unix: Option<u64>,
	/// XxHash64 of the file contents, when the file fits under the cap.
	pub content_hash: Option<u64>,
	/// XxHash64 over the sorted child names, for directories.
	pub child_fingerprint: Option<u64>,
}

impl IdentitySignals {
	/// Capture signals from a live filesystem entry. Missing or unreadable
	/// entries yield empty signals rather than errors.
	pub fn capture(path: &Path, content_hash_max_file_size: u64) -> Self {
		let Ok(metadata) = std::fs::metadata(path) else {
			return Self::default();
		};

		let mtime_unix = metadata
			.modified()
			.ok()
			.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
			.map(|d| d.as_secs());

		if metadata.is_dir() {
			return Self {
				size: None,
				mtime_unix,
				content_hash: None,
				child_fingerprint: fingerprint_directory(path),
			};
		}

		let size = Some(metadata.len());
		let content_hash = if metadata.len() <= content_hash_max_file_size {
			hash_file(path)
		} else {
			None
		};

		Self { size, mtime_unix, content_hash, child_fingerprint: None }
	}
}

fn hash_file(path: &Path) -> Option<u64> {
	let bytes = std::fs::read(path).ok()?;
	let mut hasher = XxHash64::default();
	hasher.write(&bytes);
	Some(hasher.finish())
}

/// Fingerprint a live directory by its child names.
fn fingerprint_directory(path: &Path) -> Option<u64> {
	let entries = std::fs::read_dir(path).ok()?;
	let names = entries
		.filter_map(|e| e.ok())
		.map(|e| e.file_name().to_string_lossy().into_owned());
	Some(fingerprint_child_names(names))
}

/// Fingerprint a set of child names, order-independent.
pub fn fingerprint_child_names(names: impl IntoIterator<Item = String>) -> u64 {
	let mut sorted: Vec<String> = names.into_iter().collect();
	sorted.sort();
	sorted.dedup();
	let mut hasher = XxHash64::default();
	for name in &sorted {
		hasher.write(name.as_bytes());
		hasher.write_u8(0);
	}
	hasher.finish()
}

/// One cached sighting of a filesystem entry, kept so its identity survives
/// the entry's deletion.
#[derive(Debug, Clone)]
pub struct CachedIdentity {
	pub signals: IdentitySignals,
	pub is_directory: bool,
	pub last_seen: Instant,
}

/// Cache of identity signals for recently seen entries.
#[derive(Debug, Default)]
pub struct MetadataCache {
	cache: HashMap<PathBuf, CachedIdentity>,
}

impl MetadataCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, path: PathBuf, signals: IdentitySignals, is_directory: bool) {
		self.cache
			.insert(path, CachedIdentity { signals, is_directory, last_seen: Instant::now() });
	}

	pub fn get(&self, path: &Path) -> Option<&CachedIdentity> {
		self.cache.get(path)
	}

	pub fn remove(&mut self, path: &Path) -> Option<CachedIdentity> {
		self.cache.remove(path)
	}

	pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
		self.cache.keys()
	}

	/// Fingerprint a deleted directory from the children this cache has seen
	/// under it. Returns `None` when no child was ever cached.
	pub fn fingerprint_children_of(&self, dir: &Path) -> Option<u64> {
		let names: Vec<String> = self
			.cache
			.keys()
			.filter(|p| p.parent() == Some(dir))
			.filter_map(|p| p.file_name())
			.map(|n| n.to_string_lossy().into_owned())
			.collect();
		if names.is_empty() {
			None
		} else {
			Some(fingerprint_child_names(names))
		}
	}

	/// Move a cached entry to a new key, keeping its signals.
	pub fn rename(&mut self, old: &Path, new: PathBuf) {
		if let Some(entry) = self.cache.remove(old) {
			self.cache.insert(new, entry);
		}
	}

	pub fn cleanup_old_entries(&mut self, max_age: Duration) {
		let cutoff = Instant::now() - max_age;
		self.cache.retain(|_, entry| entry.last_seen > cutoff);
	}

	pub fn len(&self) -> usize {
		self.cache.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cache.is_empty()
	}
}

/// The created half of a candidate pair, with freshly captured signals.
#[derive(Debug, Clone)]
pub struct NewEntry {
	pub path: PathBuf,
	pub is_directory: bool,
	pub created_at: Instant,
	pub signals: IdentitySignals,
}

/// Pluggable identity-scoring strategy.
///
/// Implementations return a confidence in [0, 1] that `deleted` and `created`
/// are the same entry at two paths. Path proximity alone must never be
/// sufficient evidence.
pub trait IdentityScorer: Send {
	fn score(&self, deleted: &PendingDeletion, created: &NewEntry) -> f32;
}

/// Default scorer: weighted sum over size, mtime, content identity, name
/// similarity, and temporal proximity, clamped to [0, 1].
pub struct MetadataScorer {
	config: CorrelatorConfig,
}

impl MetadataScorer {
	pub fn new(config: CorrelatorConfig) -> Self {
		Self { config }
	}
}

impl IdentityScorer for MetadataScorer {
	fn score(&self, deleted: &PendingDeletion, created: &NewEntry) -> f32 {
		let config = &self.config;
		let mut confidence = 0.0;

		let size_match = match (deleted.signals.size, created.signals.size) {
			(Some(a), Some(b)) if a == b => 1.0,
			(None, None) => 0.8,
			(None, Some(_)) | (Some(_), None) => 0.6,
			_ => 0.0,
		};
		confidence += size_match * config.weight_size_match;

		// Renames and moves preserve mtime; allow a little slack for
		// filesystems with coarse timestamps.
		let mtime_match = match (deleted.signals.mtime_unix, created.signals.mtime_unix) {
			(Some(a), Some(b)) if a.abs_diff(b) <= 2 => 1.0,
			(None, None) => 0.5,
			(None, Some(_)) | (Some(_), None) => 0.3,
			_ => 0.0,
		};
		confidence += mtime_match * config.weight_mtime_match;

		let time_diff = created.created_at.saturating_duration_since(deleted.deleted_at);
		let time_factor = if time_diff <= config.debounce {
			1.0 - (time_diff.as_millis() as f32 / config.debounce.as_millis().max(1) as f32)
		} else {
			0.0
		};
		confidence += time_factor * config.weight_time_factor;

		// Content identity: hash for files, child fingerprint for directories.
		let content_match = if deleted.is_directory {
			match (deleted.signals.child_fingerprint, created.signals.child_fingerprint) {
				(Some(a), Some(b)) if a == b => 1.0,
				(None, None) => 0.5,
				_ => 0.0,
			}
		} else {
			match (deleted.signals.content_hash, created.signals.content_hash) {
				(Some(a), Some(b)) if a == b => 1.0,
				(None, None) => 0.5,
				_ => 0.0,
			}
		};
		confidence += content_match * config.weight_content_hash;

		let name_similarity = calculate_name_similarity(&deleted.path, &created.path);
		confidence += name_similarity * config.weight_name_similarity;

		confidence.clamp(0.0, 1.0)
	}
}

/// Levenshtein edit distance over characters.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
	let s1_chars: Vec<char> = s1.chars().collect();
	let s2_chars: Vec<char> = s2.chars().collect();
	let len1 = s1_chars.len();
	let len2 = s2_chars.len();

	if len1 == 0 {
		return len2;
	}
	if len2 == 0 {
		return len1;
	}

	let mut prev: Vec<usize> = (0..=len2).collect();
	let mut current = vec![0; len2 + 1];

	for i in 1..=len1 {
		current[0] = i;
		for j in 1..=len2 {
			let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
			current[j] = std::cmp::min(
				std::cmp::min(prev[j] + 1, current[j - 1] + 1),
				prev[j - 1] + cost,
			);
		}
		std::mem::swap(&mut prev, &mut current);
	}

	prev[len2]
}

/// Similarity of two file names in [0, 1].
pub fn calculate_name_similarity(path1: &Path, path2: &Path) -> f32 {
	let name1 = path1.file_name().and_then(|n| n.to_str()).unwrap_or("");
	let name2 = path2.file_name().and_then(|n| n.to_str()).unwrap_or("");

	if name1.is_empty() || name2.is_empty() {
		return 0.0;
	}

	let distance = levenshtein_distance(name1, name2);
	let max_len = std::cmp::max(name1.chars().count(), name2.chars().count());

	if max_len == 0 {
		1.0
	} else {
		1.0 - (distance as f32 / max_len as f32)
	}
}
