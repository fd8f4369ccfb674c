//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use relink::container::{BlockHeader, CODE_ENDB, CODE_LINK, MAGIC};
use relink::events::MoveRecord;
use relink::move_log::MoveLogWriter;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn setup_temp_dir() -> TempDir {
	TempDir::new().expect("Failed to create temp directory")
}

/// Encode a LINK payload from (value, capacity) pairs.
pub fn link_payload(values: &[(&str, u32)]) -> Vec<u8> {
	let mut payload = Vec::new();
	payload.extend_from_slice(&(values.len() as u32).to_le_bytes());
	for (value, capacity) in values {
		payload.extend_from_slice(&capacity.to_le_bytes());
		let mut data = vec![0u8; *capacity as usize];
		data[..value.len()].copy_from_slice(value.as_bytes());
		payload.extend_from_slice(&data);
	}
	payload
}

/// Write a container file from (block code, payload) pairs, terminator
/// included.
pub fn build_container(path: &Path, blocks: &[([u8; 4], Vec<u8>)]) {
	let mut file = File::create(path).expect("Failed to create container");
	file.write_all(&MAGIC).unwrap();
	for (code, payload) in blocks {
		let header =
			BlockHeader { code: *code, declared_length: payload.len() as u32, address: 0 };
		file.write_all(&header.to_bytes()).unwrap();
		file.write_all(payload).unwrap();
	}
	let end = BlockHeader { code: CODE_ENDB, declared_length: 0, address: 0 };
	file.write_all(&end.to_bytes()).unwrap();
}

/// Shorthand for a container holding a single LINK block.
pub fn build_link_container(path: &Path, values: &[(&str, u32)]) {
	build_container(path, &[(CODE_LINK, link_payload(values))]);
}

/// Record a sequence of moves into a log file.
pub fn write_move_log(path: &Path, records: &[MoveRecord]) {
	let mut writer = MoveLogWriter::open(path).expect("Failed to open move log");
	for record in records {
		writer.append(record).expect("Failed to append move record");
	}
}

pub fn file_move(old: &Path, new: &Path) -> MoveRecord {
	MoveRecord::new(old.to_path_buf(), new.to_path_buf(), false)
}

pub fn dir_move(old: &Path, new: &Path) -> MoveRecord {
	MoveRecord::new(old.to_path_buf(), new.to_path_buf(), true)
}
