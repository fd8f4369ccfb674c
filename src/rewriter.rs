//! In-place patching of located path fields.
//!
//! A field is always written as one capacity-sized buffer (new value, NUL
//! sentinel, zero padding) in a single `write_all`, so a field on disk is
//! either fully old or fully new. The rewriter never grows a field: that
//! would shift every later block in the container.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::container::ContainerField;

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
	Applied,
	Skipped(SkipReason),
	Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
	/// New value plus sentinel does not fit in the slot.
	CapacityExceeded,
	/// Relative convention, but the target shares no root with the container.
	NoRelativePath,
}

impl std::fmt::Display for SkipReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SkipReason::CapacityExceeded => write!(f, "capacity-exceeded"),
			SkipReason::NoRelativePath => write!(f, "no-relative-path"),
		}
	}
}

/// One field-level decision from an update run.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
	pub container_path: PathBuf,
	pub field_offset: u64,
	pub byte_capacity: u32,
	pub old_value: String,
	pub new_value: Option<String>,
	pub outcome: RewriteOutcome,
}

/// Patch one field to `new_value`, or report why not. With `dry_run` the
/// decision is computed identically but nothing is written.
pub fn rewrite_field(
	file: &mut File, container_path: &Path, field: &ContainerField, new_value: &str,
	dry_run: bool,
) -> RewriteResult {
	let old_value = field.current_value();

	let Some(encoded) = field.encode_value(new_value) else {
		warn!(
			"Skipping field at {:#x} in {:?}: new value needs {} bytes, capacity is {}",
			field.file_offset,
			container_path,
			new_value.len() + 1,
			field.byte_capacity
		);
		return RewriteResult {
			container_path: container_path.to_path_buf(),
			field_offset: field.file_offset,
			byte_capacity: field.byte_capacity,
			old_value,
			new_value: Some(new_value.to_string()),
			outcome: RewriteOutcome::Skipped(SkipReason::CapacityExceeded),
		};
	};

	let outcome = if dry_run {
		RewriteOutcome::Applied
	} else {
		match write_field(file, field.file_offset, &encoded) {
			Ok(()) => RewriteOutcome::Applied,
			Err(err) => RewriteOutcome::Failed(err.to_string()),
		}
	};

	match &outcome {
		RewriteOutcome::Applied => {
			debug!(
				"{}field at {:#x} in {:?}: {:?} -> {:?}",
				if dry_run { "[dry-run] " } else { "" },
				field.file_offset,
				container_path,
				old_value,
				new_value
			);
		}
		RewriteOutcome::Failed(err) => {
			warn!(
				"Write failed for field at {:#x} in {:?}: {err}",
				field.file_offset, container_path
			);
		}
		RewriteOutcome::Skipped(_) => {}
	}

	RewriteResult {
		container_path: container_path.to_path_buf(),
		field_offset: field.file_offset,
		byte_capacity: field.byte_capacity,
		old_value,
		new_value: Some(new_value.to_string()),
		outcome,
	}
}

/// A field-level skip that never reaches the write stage.
pub fn skip_field(
	container_path: &Path, field: &ContainerField, reason: SkipReason,
) -> RewriteResult {
	warn!(
		"Skipping field at {:#x} in {:?}: {reason}",
		field.file_offset, container_path
	);
	RewriteResult {
		container_path: container_path.to_path_buf(),
		field_offset: field.file_offset,
		byte_capacity: field.byte_capacity,
		old_value: field.current_value(),
		new_value: None,
		outcome: RewriteOutcome::Skipped(reason),
	}
}

fn write_field(file: &mut File, offset: u64, encoded: &[u8]) -> std::io::Result<()> {
	file.seek(SeekFrom::Start(offset))?;
	file.write_all(encoded)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::OpenOptions;

	fn fixture(dir: &Path, raw: &[u8]) -> (PathBuf, ContainerField) {
		let path = dir.join("fixture.pack");
		let mut bytes = vec![0xEEu8; 32];
		bytes.extend_from_slice(raw);
		bytes.extend_from_slice(&[0xEEu8; 32]);
		std::fs::write(&path, &bytes).unwrap();
		let field = ContainerField {
			file_offset: 32,
			byte_capacity: raw.len() as u32,
			raw: raw.to_vec(),
		};
		(path, field)
	}

	#[test]
	fn test_rewrite_replaces_value_and_zero_fills() {
		let dir = tempfile::tempdir().unwrap();
		let (path, field) = fixture(dir.path(), b"//old/value.pack\0trailing-junk!!");

		let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
		let result = rewrite_field(&mut file, &path, &field, "//new.pack", false);
		assert_eq!(result.outcome, RewriteOutcome::Applied);

		let bytes = std::fs::read(&path).unwrap();
		let slot = &bytes[32..32 + field.byte_capacity as usize];
		assert_eq!(&slot[..10], b"//new.pack");
		assert!(slot[10..].iter().all(|&b| b == 0));

		// Surrounding bytes untouched
		assert!(bytes[..32].iter().all(|&b| b == 0xEE));
		assert!(bytes[32 + field.byte_capacity as usize..].iter().all(|&b| b == 0xEE));
	}

	#[test]
	fn test_capacity_exceeded_leaves_field_untouched() {
		let dir = tempfile::tempdir().unwrap();
		let (path, field) = fixture(dir.path(), b"short\0\0\0");

		let before = std::fs::read(&path).unwrap();
		let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
		let result =
			rewrite_field(&mut file, &path, &field, "a-value-longer-than-capacity", false);

		assert_eq!(
			result.outcome,
			RewriteOutcome::Skipped(SkipReason::CapacityExceeded)
		);
		assert_eq!(std::fs::read(&path).unwrap(), before);
	}

	#[test]
	fn test_dry_run_writes_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let (path, field) = fixture(dir.path(), b"//old/value.pack\0padpadpadpadpad");

		let before = std::fs::read(&path).unwrap();
		let mut file = File::open(&path).unwrap();
		let result = rewrite_field(&mut file, &path, &field, "//new.pack", true);

		assert_eq!(result.outcome, RewriteOutcome::Applied);
		assert_eq!(std::fs::read(&path).unwrap(), before);
	}

	#[test]
	fn test_write_to_readonly_handle_fails_cleanly() {
		let dir = tempfile::tempdir().unwrap();
		let (path, field) = fixture(dir.path(), b"//old/value.pack\0padpadpadpadpad");

		let mut file = File::open(&path).unwrap();
		let result = rewrite_field(&mut file, &path, &field, "//new.pack", false);
		assert!(matches!(result.outcome, RewriteOutcome::Failed(_)));
	}

	#[test]
	fn test_skip_field_reports_reason() {
		let dir = tempfile::tempdir().unwrap();
		let (path, field) = fixture(dir.path(), b"rel/value.pack\0\0");

		let result = skip_field(&path, &field, SkipReason::NoRelativePath);
		assert_eq!(result.outcome, RewriteOutcome::Skipped(SkipReason::NoRelativePath));
		assert_eq!(result.old_value, "rel/value.pack");
		assert!(result.new_value.is_none());
	}
}
