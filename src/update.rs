//! The update phase: read a move log, scan for containers, and patch every
//! affected reference.
//!
//! Files are independent, so they are processed on a worker pool. Each file
//! is handled through one exclusive handle for its whole pass; a crash or
//! cancellation mid-run leaves finished files consistent and unvisited files
//! untouched, and re-running the same log is a no-op.

use rayon::prelude::*;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::container;
use crate::error::{RelinkError, Result};
use crate::events::MoveRecord;
use crate::matcher::{FieldMatch, ReferenceMatcher};
use crate::move_log::{self, MoveSet};
use crate::path_norm;
use crate::rewriter::{self, RewriteOutcome, RewriteResult, SkipReason};

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
	pub dry_run: bool,
	/// Worker pool size; `None` leaves the choice to the pool.
	pub threads: Option<usize>,
}

/// Everything that happened to one container file.
#[derive(Debug)]
pub struct FileOutcome {
	pub path: PathBuf,
	pub results: Vec<RewriteResult>,
	/// Set when the file could not be processed at all (malformed, unreadable).
	pub error: Option<String>,
	pub had_link_blocks: bool,
}

/// Complete per-file, per-field report of an update run.
#[derive(Debug, Default)]
pub struct UpdateReport {
	pub files: Vec<FileOutcome>,
	pub containers_scanned: usize,
	pub applied: usize,
	pub skipped: usize,
	pub failed: usize,
	pub files_with_errors: usize,
	pub malformed_log_lines: usize,
	pub cancelled: bool,
}

impl UpdateReport {
	fn tally(&mut self) {
		for file in &self.files {
			if file.error.is_some() {
				self.files_with_errors += 1;
			}
			for result in &file.results {
				match result.outcome {
					RewriteOutcome::Applied => self.applied += 1,
					RewriteOutcome::Skipped(_) => self.skipped += 1,
					RewriteOutcome::Failed(_) => self.failed += 1,
				}
			}
		}
	}

	/// Iterate every field-level result across all files.
	pub fn results(&self) -> impl Iterator<Item = &RewriteResult> {
		self.files.iter().flat_map(|f| f.results.iter())
	}
}

/// Apply a recorded move log to every container under `root`.
pub fn apply_move_log(
	log_path: &Path, root: &Path, config: &Config, options: &UpdateOptions,
	cancel: &AtomicBool,
) -> Result<UpdateReport> {
	let parsed = move_log::read_move_log(log_path)?;
	let normalized: Vec<MoveRecord> = parsed
		.records
		.iter()
		.map(|r| MoveRecord {
			timestamp: r.timestamp,
			old_path: path_norm::normalize(&r.old_path),
			new_path: path_norm::normalize(&r.new_path),
			is_directory: r.is_directory,
		})
		.collect();
	let move_set = MoveSet::from_records(&normalized);

	let mut report = UpdateReport {
		malformed_log_lines: parsed.malformed_lines,
		..Default::default()
	};

	if move_set.is_empty() {
		info!("Move log {:?} resolves to no terminal moves, nothing to do", log_path);
		return Ok(report);
	}

	let containers = container::scan_containers(root, config)?;
	report.containers_scanned = containers.len();
	info!(
		"Applying {} terminal moves to {} containers under {:?}{}",
		move_set.len(),
		containers.len(),
		root,
		if options.dry_run { " (dry run)" } else { "" }
	);

	let process = || {
		containers
			.par_iter()
			.filter_map(|path| {
				if cancel.load(Ordering::Relaxed) {
					return None;
				}
				Some(process_file(path, &move_set, options.dry_run))
			})
			.collect::<Vec<FileOutcome>>()
	};

	report.files = match options.threads {
		Some(threads) => rayon::ThreadPoolBuilder::new()
			.num_threads(threads)
			.build()
			.map_err(|err| {
				RelinkError::configuration(
					"update_threads",
					&err.to_string(),
					"a buildable worker pool",
					&threads.to_string(),
				)
			})?
			.install(process),
		None => process(),
	};

	report.cancelled = cancel.load(Ordering::Relaxed);
	report.tally();
	Ok(report)
}

fn process_file(path: &Path, move_set: &MoveSet, dry_run: bool) -> FileOutcome {
	match container::has_link_blocks(path) {
		Ok(true) => {}
		Ok(false) => {
			debug!("No link blocks in {:?}, skipping", path);
			return FileOutcome {
				path: path.to_path_buf(),
				results: Vec::new(),
				error: None,
				had_link_blocks: false,
			};
		}
		Err(err) => return file_error(path, err),
	}

	let open_result = if dry_run {
		File::open(path)
	} else {
		OpenOptions::new().read(true).write(true).open(path)
	};
	let mut file = match open_result {
		Ok(file) => file,
		Err(err) => return file_error(path, err.into()),
	};

	let fields = match container::extract_fields_from(path, &mut file) {
		Ok(fields) => fields,
		Err(err) => return file_error(path, err),
	};

	let matcher = ReferenceMatcher::new(move_set, path);
	let mut results = Vec::new();

	for field in &fields {
		match matcher.match_field(&field.current_value()) {
			FieldMatch::Unchanged => {}
			FieldMatch::NoRelativePath => {
				results.push(rewriter::skip_field(path, field, SkipReason::NoRelativePath));
			}
			FieldMatch::Rewrite { new_value } => {
				let result = rewriter::rewrite_field(&mut file, path, field, &new_value, dry_run);
				let failed = matches!(result.outcome, RewriteOutcome::Failed(_));
				results.push(result);
				if failed {
					warn!("Aborting remaining rewrites in {:?} after I/O failure", path);
					break;
				}
			}
		}
	}

	FileOutcome { path: path.to_path_buf(), results, error: None, had_link_blocks: true }
}

fn file_error(path: &Path, err: RelinkError) -> FileOutcome {
	warn!("Skipping container {:?}: {err}", path);
	FileOutcome {
		path: path.to_path_buf(),
		results: Vec::new(),
		error: Some(err.to_string()),
		had_link_blocks: false,
	}
}
