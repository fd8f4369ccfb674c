use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::correlator::config::CorrelatorConfig;
use crate::correlator::identity::{
	IdentityScorer, IdentitySignals, MetadataCache, MetadataScorer, NewEntry,
};
use crate::correlator::pending::PendingDeletions;
use crate::events::{EventKind, MoveRecord, WatchEvent};
use crate::path_norm;

/// Counters exposed for telemetry and shutdown reporting.
#[derive(Debug, Clone, Default)]
pub struct CorrelatorStats {
	pub events_processed: u64,
	pub moves_emitted: u64,
	pub renames_emitted: u64,
	pub ambiguous_matches: u64,
	pub expired_deletions: u64,
	pub dropped_events: u64,
}

/// Per-root correlation state machine.
///
/// Consumes one ordered event stream and emits `MoveRecord`s. Native move
/// notifications pass through immediately; delete/create pairs are matched
/// through the pluggable `IdentityScorer` within the debounce window.
pub struct Correlator {
	pending: PendingDeletions,
	cache: MetadataCache,
	scorer: Box<dyn IdentityScorer>,
	config: CorrelatorConfig,
	stats: CorrelatorStats,
	pending_rename_from: Option<(WatchEvent, Instant)>,
}

impl Correlator {
	pub fn new(config: CorrelatorConfig) -> Self {
		let scorer = Box::new(MetadataScorer::new(config.clone()));
		Self::with_scorer(config, scorer)
	}

	pub fn with_scorer(config: CorrelatorConfig, scorer: Box<dyn IdentityScorer>) -> Self {
		Self {
			pending: PendingDeletions::new(),
			cache: MetadataCache::new(),
			scorer,
			config,
			stats: CorrelatorStats::default(),
			pending_rename_from: None,
		}
	}

	/// Process one event, returning any move records it completes.
	pub fn process_event(&mut self, event: WatchEvent) -> Vec<MoveRecord> {
		self.stats.events_processed += 1;
		self.sweep_expired();

		let path = path_norm::normalize(&event.path);
		match event.kind {
			EventKind::Created => self.handle_created(path, event.is_directory),
			EventKind::Deleted => self.handle_deleted(path, event.is_directory),
			EventKind::Modified => {
				self.refresh_cache(path, event.is_directory);
				Vec::new()
			}
			EventKind::MovedTo { ref from } => {
				let from = path_norm::normalize(from);
				self.emit_native_move(from, path, event.is_directory)
			}
			EventKind::RenameFrom => {
				self.pending_rename_from = Some((event, Instant::now()));
				Vec::new()
			}
			EventKind::RenameTo => self.handle_rename_to(path, event.is_directory),
			EventKind::Other(ref detail) => {
				debug!("Dropping uncorrelatable event {detail} for {:?}", path);
				self.stats.dropped_events += 1;
				Vec::new()
			}
		}
	}

	/// Drop pending deletions older than the debounce window. Called lazily on
	/// every event and periodically from the watch loop's timer tick.
	pub fn sweep_expired(&mut self) {
		let now = Instant::now();
		if let Some(cutoff) = now.checked_sub(self.config.debounce) {
			let expired = self.pending.expire_before(cutoff);
			if expired > 0 {
				debug!("Expired {expired} pending deletions as plain deletions");
				self.stats.expired_deletions += expired as u64;
			}
		}

		if let Some((_, at)) = &self.pending_rename_from {
			if now.duration_since(*at) > self.config.debounce {
				self.pending_rename_from = None;
			}
		}

		// Metadata outlives pending deletions so a file seen well before its
		// deletion still carries signals.
		self.cache.cleanup_old_entries(self.config.debounce * 2);
	}

	/// Drop every pending deletion, for shutdown. Returns how many were
	/// flushed as plain deletions.
	pub fn flush_pending(&mut self) -> usize {
		let drained = self.pending.drain_all();
		for entry in &drained {
			debug!("Flushing unmatched deletion for {:?}", entry.path);
		}
		self.stats.expired_deletions += drained.len() as u64;
		drained.len()
	}

	pub fn stats(&self) -> &CorrelatorStats {
		&self.stats
	}

	pub fn pending_count(&self) -> usize {
		self.pending.len()
	}

	fn refresh_cache(&mut self, path: PathBuf, is_directory: bool) {
		let signals = IdentitySignals::capture(&path, self.config.content_hash_max_file_size);
		self.cache.insert(path, signals, is_directory);
	}

	fn handle_deleted(&mut self, path: PathBuf, is_directory: bool) -> Vec<MoveRecord> {
		// Reconstruct the directory fingerprint from cached children before
		// the directory's own cache entry goes away.
		let reconstructed_fingerprint = if is_directory {
			self.cache.fingerprint_children_of(&path)
		} else {
			None
		};

		let cached = self.cache.remove(&path);
		let is_directory = is_directory || cached.as_ref().is_some_and(|c| c.is_directory);
		let mut signals = cached.map(|c| c.signals).unwrap_or_default();
		if is_directory && signals.child_fingerprint.is_none() {
			signals.child_fingerprint = reconstructed_fingerprint;
		}

		if self.pending.len() >= self.config.max_pending {
			warn!("Too many pending deletions, dropping event for {:?}", path);
			self.stats.dropped_events += 1;
			return Vec::new();
		}

		if !self.pending.insert(path.clone(), is_directory, Instant::now(), signals) {
			debug!("Deletion already pending for {:?}", path);
		}
		Vec::new()
	}

	fn handle_created(&mut self, path: PathBuf, is_directory: bool) -> Vec<MoveRecord> {
		let signals = IdentitySignals::capture(&path, self.config.content_hash_max_file_size);
		self.cache.insert(path.clone(), signals.clone(), is_directory);

		let entry = NewEntry { path, is_directory, created_at: Instant::now(), signals };

		let Some(matched_seq) = self.best_pending_match(&entry) else {
			return Vec::new();
		};
		let Some(deleted) = self.pending.remove_seq(matched_seq) else {
			return Vec::new();
		};

		self.emit_record(deleted.path, entry.path, entry.is_directory)
	}

	/// Score the new entry against every pending deletion and return the
	/// sequence number of the winner, if any clears the threshold.
	fn best_pending_match(&mut self, entry: &NewEntry) -> Option<u64> {
		let mut best: Option<(f32, u64)> = None;
		let mut tied = 0usize;

		for pending in self.pending.iter() {
			if pending.is_directory != entry.is_directory || pending.path == entry.path {
				continue;
			}
			let score = self.scorer.score(pending, entry);
			if score < self.config.confidence_threshold {
				continue;
			}
			debug!(
				"Candidate {:?} -> {:?} scored {score:.2}",
				pending.path, entry.path
			);
			match best {
				None => {
					best = Some((score, pending.seq));
					tied = 1;
				}
				Some((best_score, best_seq)) => {
					if (score - best_score).abs() < 1e-6 {
						tied += 1;
						// Ties resolve to the most recent deletion.
						if pending.seq > best_seq {
							best = Some((score, pending.seq));
						}
					} else if score > best_score {
						best = Some((score, pending.seq));
						tied = 1;
					}
				}
			}
		}

		if tied > 1 {
			warn!(
				"Ambiguous pairing for {:?}: {tied} pending deletions tied, picking the most recent",
				entry.path
			);
			self.stats.ambiguous_matches += 1;
		}

		best.map(|(_, seq)| seq)
	}

	fn handle_rename_to(&mut self, path: PathBuf, is_directory: bool) -> Vec<MoveRecord> {
		match self.pending_rename_from.take() {
			Some((from_event, _)) => {
				let from = path_norm::normalize(&from_event.path);
				self.emit_native_move(from, path, is_directory)
			}
			None => {
				warn!("Rename 'to' without matching 'from' for {:?}, treating as create", path);
				self.handle_created(path, is_directory)
			}
		}
	}

	fn emit_native_move(
		&mut self, from: PathBuf, to: PathBuf, is_directory: bool,
	) -> Vec<MoveRecord> {
		if from == to {
			self.stats.dropped_events += 1;
			return Vec::new();
		}
		// A native move may trail a speculative delete for the same path.
		self.pending.remove_path(&from);
		self.cache.rename(&from, to.clone());
		self.emit_record(from, to, is_directory)
	}

	fn emit_record(
		&mut self, old_path: PathBuf, new_path: PathBuf, is_directory: bool,
	) -> Vec<MoveRecord> {
		if old_path == new_path {
			self.stats.dropped_events += 1;
			return Vec::new();
		}
		let record = MoveRecord::new(old_path, new_path, is_directory);
		if record.is_rename() {
			debug!("Detected rename: {:?} -> {:?}", record.old_path, record.new_path);
			self.stats.renames_emitted += 1;
		} else {
			debug!("Detected move: {:?} -> {:?}", record.old_path, record.new_path);
			self.stats.moves_emitted += 1;
		}
		vec![record]
	}
}
