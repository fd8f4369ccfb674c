use std::path::{Path, PathBuf};
use tokio::time::Instant;

use crate::correlator::identity::IdentitySignals;

/// A deletion waiting for a matching creation.
///
/// Destroyed either by a successful match or by debounce expiry. `seq` is the
/// insertion order, used to break confidence ties in favor of the most recent
/// deletion.
#[derive(Debug, Clone)]
pub struct PendingDeletion {
	pub path: PathBuf,
	pub is_directory: bool,
	pub deleted_at: Instant,
	pub signals: IdentitySignals,
	pub seq: u64,
}

/// Insert-ordered store of pending deletions.
///
/// A plain vector: every creation must be scored against all pending
/// deletions anyway, so there is nothing to gain from bucketed indexes.
#[derive(Debug, Default)]
pub struct PendingDeletions {
	entries: Vec<PendingDeletion>,
	next_seq: u64,
}

impl PendingDeletions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a pending deletion unless one for the same path already exists.
	/// Returns false on duplicate.
	pub fn insert(
		&mut self, path: PathBuf, is_directory: bool, deleted_at: Instant,
		signals: IdentitySignals,
	) -> bool {
		if self.entries.iter().any(|e| e.path == path) {
			return false;
		}
		let seq = self.next_seq;
		self.next_seq += 1;
		self.entries.push(PendingDeletion { path, is_directory, deleted_at, signals, seq });
		true
	}

	pub fn iter(&self) -> impl Iterator<Item = &PendingDeletion> {
		self.entries.iter()
	}

	/// Remove and return the entry with the given sequence number.
	pub fn remove_seq(&mut self, seq: u64) -> Option<PendingDeletion> {
		let idx = self.entries.iter().position(|e| e.seq == seq)?;
		Some(self.entries.remove(idx))
	}

	/// Remove and return the entry for a path, if pending.
	pub fn remove_path(&mut self, path: &Path) -> Option<PendingDeletion> {
		let idx = self.entries.iter().position(|e| e.path == path)?;
		Some(self.entries.remove(idx))
	}

	/// Drop entries older than the cutoff, returning how many expired.
	pub fn expire_before(&mut self, cutoff: Instant) -> usize {
		let before = self.entries.len();
		self.entries.retain(|e| e.deleted_at > cutoff);
		before - self.entries.len()
	}

	/// Drain every entry, for shutdown flushing.
	pub fn drain_all(&mut self) -> Vec<PendingDeletion> {
		std::mem::take(&mut self.entries)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
