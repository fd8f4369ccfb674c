//! Append-only JSONL move log.
//!
//! One `MoveRecord` per line. The writer syncs after every record so an
//! acknowledged event is on disk even across a crash. Readers tolerate
//! malformed lines (counted, skipped) so a torn final line from a killed
//! watcher never poisons an update run.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::MoveRecord;

pub struct MoveLogWriter {
	file: File,
	path: PathBuf,
	records_written: u64,
}

impl MoveLogWriter {
	/// Open the log for appending, creating it if missing.
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new().create(true).append(true).open(path)?;
		Ok(Self { file, path: path.to_path_buf(), records_written: 0 })
	}

	/// Append one record durably. Returns only after the bytes have been
	/// written, flushed, and synced; callers may acknowledge the event
	/// afterwards.
	pub fn append(&mut self, record: &MoveRecord) -> Result<()> {
		let line = serde_json::to_string(record)?;
		writeln!(self.file, "{line}")?;
		self.file.flush()?;
		self.file.sync_data()?;
		self.records_written += 1;
		debug!("Logged move {:?} -> {:?}", record.old_path, record.new_path);
		Ok(())
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn records_written(&self) -> u64 {
		self.records_written
	}
}

/// Result of reading a move log from disk.
#[derive(Debug)]
pub struct ParsedMoveLog {
	pub records: Vec<MoveRecord>,
	pub malformed_lines: usize,
}

/// Read every record from a JSONL move log in order. Malformed lines are
/// skipped and counted; blank lines are ignored.
pub fn read_move_log(path: &Path) -> Result<ParsedMoveLog> {
	let file = File::open(path)?;
	let reader = BufReader::new(file);

	let mut records = Vec::new();
	let mut malformed_lines = 0;

	for (line_number, line) in reader.lines().enumerate() {
		let line = line?;
		if line.trim().is_empty() {
			continue;
		}
		match serde_json::from_str::<MoveRecord>(&line) {
			Ok(record) => records.push(record),
			Err(err) => {
				warn!(
					"Skipping malformed move-log line {} in {:?}: {err}",
					line_number + 1,
					path
				);
				malformed_lines += 1;
			}
		}
	}

	Ok(ParsedMoveLog { records, malformed_lines })
}

/// The terminal old-path to new-path mapping distilled from an ordered log.
///
/// Chains collapse (`a->b` then `b->c` becomes `a->c`), later records for the
/// same old path supersede earlier ones, and mappings that resolve back to
/// their own origin are dropped.
#[derive(Debug, Default)]
pub struct MoveSet {
	entries: HashMap<PathBuf, MoveTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveTarget {
	pub new_path: PathBuf,
	pub is_directory: bool,
}

impl MoveSet {
	pub fn from_records(records: &[MoveRecord]) -> Self {
		let mut entries: HashMap<PathBuf, MoveTarget> = HashMap::new();

		for record in records {
			// Extend chains whose current terminal is this record's origin.
			for target in entries.values_mut() {
				if target.new_path == record.old_path {
					target.new_path = record.new_path.clone();
				}
			}

			entries.insert(
				record.old_path.clone(),
				MoveTarget { new_path: record.new_path.clone(), is_directory: record.is_directory },
			);

			// A chain that returned to its origin is not a move at all.
			entries.retain(|old, target| *old != target.new_path);
		}

		Self { entries }
	}

	/// Exact terminal target for an old path.
	pub fn get(&self, old_path: &Path) -> Option<&MoveTarget> {
		self.entries.get(old_path)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &MoveTarget)> {
		self.entries.iter()
	}

	/// Directory entries only, for prefix matching.
	pub fn directories(&self) -> impl Iterator<Item = (&PathBuf, &MoveTarget)> {
		self.entries.iter().filter(|(_, target)| target.is_directory)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Aggregate counts for the `report` subcommand.
#[derive(Debug, Default, PartialEq)]
pub struct MoveLogSummary {
	pub total_records: u64,
	pub file_moves: u64,
	pub directory_moves: u64,
	pub renames: u64,
	pub relocations: u64,
	pub terminal_mappings: u64,
	pub malformed_lines: u64,
}

pub fn summarize(parsed: &ParsedMoveLog) -> MoveLogSummary {
	let mut summary = MoveLogSummary {
		total_records: parsed.records.len() as u64,
		malformed_lines: parsed.malformed_lines as u64,
		..Default::default()
	};

	for record in &parsed.records {
		if record.is_directory {
			summary.directory_moves += 1;
		} else {
			summary.file_moves += 1;
		}
		if record.is_rename() {
			summary.renames += 1;
		} else {
			summary.relocations += 1;
		}
	}

	summary.terminal_mappings = MoveSet::from_records(&parsed.records).len() as u64;
	summary
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(old: &str, new: &str, is_directory: bool) -> MoveRecord {
		MoveRecord::new(PathBuf::from(old), PathBuf::from(new), is_directory)
	}

	#[test]
	fn test_append_then_read_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let log_path = dir.path().join("moves.jsonl");

		let mut writer = MoveLogWriter::open(&log_path).unwrap();
		writer.append(&record("/a/x.pack", "/b/x.pack", false)).unwrap();
		writer.append(&record("/a/dir", "/b/dir", true)).unwrap();
		assert_eq!(writer.records_written(), 2);

		let parsed = read_move_log(&log_path).unwrap();
		assert_eq!(parsed.records.len(), 2);
		assert_eq!(parsed.malformed_lines, 0);
		assert_eq!(parsed.records[0].old_path, PathBuf::from("/a/x.pack"));
		assert!(parsed.records[1].is_directory);
	}

	#[test]
	fn test_append_is_restartable() {
		let dir = tempfile::tempdir().unwrap();
		let log_path = dir.path().join("moves.jsonl");

		{
			let mut writer = MoveLogWriter::open(&log_path).unwrap();
			writer.append(&record("/a/x.pack", "/b/x.pack", false)).unwrap();
		}
		{
			let mut writer = MoveLogWriter::open(&log_path).unwrap();
			writer.append(&record("/b/x.pack", "/c/x.pack", false)).unwrap();
		}

		let parsed = read_move_log(&log_path).unwrap();
		assert_eq!(parsed.records.len(), 2);
	}

	#[test]
	fn test_malformed_lines_skipped_and_counted() {
		let dir = tempfile::tempdir().unwrap();
		let log_path = dir.path().join("moves.jsonl");

		let mut writer = MoveLogWriter::open(&log_path).unwrap();
		writer.append(&record("/a/x.pack", "/b/x.pack", false)).unwrap();

		// Simulate a torn write from a killed process
		let mut raw = OpenOptions::new().append(true).open(&log_path).unwrap();
		writeln!(raw, "{{\"timestamp\": \"2026-01-").unwrap();

		let parsed = read_move_log(&log_path).unwrap();
		assert_eq!(parsed.records.len(), 1);
		assert_eq!(parsed.malformed_lines, 1);
	}

	#[test]
	fn test_move_set_chain_collapses() {
		let records = vec![
			record("/a/x.pack", "/b/x.pack", false),
			record("/b/x.pack", "/c/x.pack", false),
		];
		let set = MoveSet::from_records(&records);

		assert_eq!(set.get(Path::new("/a/x.pack")).unwrap().new_path, PathBuf::from("/c/x.pack"));
		assert_eq!(set.get(Path::new("/b/x.pack")).unwrap().new_path, PathBuf::from("/c/x.pack"));
	}

	#[test]
	fn test_move_set_later_record_supersedes() {
		let records = vec![
			record("/a/x.pack", "/b/x.pack", false),
			record("/a/x.pack", "/d/x.pack", false),
		];
		let set = MoveSet::from_records(&records);
		assert_eq!(set.get(Path::new("/a/x.pack")).unwrap().new_path, PathBuf::from("/d/x.pack"));
	}

	#[test]
	fn test_move_set_move_back_drops_identity() {
		let records = vec![
			record("/a/x.pack", "/b/x.pack", false),
			record("/b/x.pack", "/a/x.pack", false),
		];
		let set = MoveSet::from_records(&records);

		assert!(set.get(Path::new("/a/x.pack")).is_none());
		assert_eq!(set.get(Path::new("/b/x.pack")).unwrap().new_path, PathBuf::from("/a/x.pack"));
	}

	#[test]
	fn test_move_set_directories_filter() {
		let records = vec![
			record("/a/x.pack", "/b/x.pack", false),
			record("/proj/old", "/proj/new", true),
		];
		let set = MoveSet::from_records(&records);
		let dirs: Vec<_> = set.directories().collect();
		assert_eq!(dirs.len(), 1);
		assert_eq!(dirs[0].0, &PathBuf::from("/proj/old"));
	}

	#[test]
	fn test_summary_counts() {
		let parsed = ParsedMoveLog {
			records: vec![
				record("/a/x.pack", "/a/y.pack", false),
				record("/a/dir", "/b/dir", true),
			],
			malformed_lines: 1,
		};
		let summary = summarize(&parsed);
		assert_eq!(summary.total_records, 2);
		assert_eq!(summary.file_moves, 1);
		assert_eq!(summary.directory_moves, 1);
		assert_eq!(summary.renames, 1);
		assert_eq!(summary.relocations, 1);
		assert_eq!(summary.terminal_mappings, 2);
		assert_eq!(summary.malformed_lines, 1);
	}
}
