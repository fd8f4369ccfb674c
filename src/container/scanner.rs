use regex::Regex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::Config;
use crate::container::block::BlockHeader;
use crate::container::field::ContainerField;
use crate::error::{RelinkError, Result};

/// Walk every block header in `file`, invoking `visit` per non-terminator
/// block with the payload's file offset. `visit` returns true to stop early;
/// it must leave the file cursor at the end of the payload.
fn walk_headers<F>(path: &Path, file: &mut File, mut visit: F) -> Result<()>
where
	F: FnMut(&mut File, &BlockHeader, u64) -> Result<bool>,
{
	let file_len = file.metadata()?.len();

	let mut magic = [0u8; 8];
	if file.read_exact(&mut magic).is_err() {
		return Err(RelinkError::malformed(path, "file shorter than magic"));
	}
	if magic != crate::container::MAGIC {
		return Err(RelinkError::malformed(path, "bad magic"));
	}

	let mut offset = 8u64;
	loop {
		if offset + BlockHeader::SIZE > file_len {
			return Err(RelinkError::malformed(path, "truncated block header"));
		}
		let header = BlockHeader::read_from(file)?;
		offset += BlockHeader::SIZE;

		if header.is_terminator() {
			return Ok(());
		}

		let payload_end = offset
			.checked_add(header.declared_length as u64)
			.filter(|end| *end <= file_len)
			.ok_or_else(|| {
				RelinkError::malformed(path, "declared block length runs past end of file")
			})?;

		if visit(file, &header, offset)? {
			return Ok(());
		}
		file.seek(SeekFrom::Start(payload_end))?;
		offset = payload_end;
	}
}

/// Extract every path field from the container's `LINK` blocks.
///
/// Reads block headers and `LINK` payloads only; other payloads are seeked
/// past, so cost scales with block count plus path-bearing payload size.
pub fn extract_fields(path: &Path) -> Result<Vec<ContainerField>> {
	let mut file = File::open(path)?;
	extract_fields_from(path, &mut file)
}

/// As `extract_fields`, but reads through an already-open handle so an update
/// pass can extract and rewrite over one exclusive descriptor.
pub fn extract_fields_from(path: &Path, file: &mut File) -> Result<Vec<ContainerField>> {
	file.seek(SeekFrom::Start(0))?;
	let mut fields = Vec::new();

	walk_headers(path, file, |file, header, payload_offset| {
		if !header.is_link() {
			return Ok(false);
		}
		let mut payload = vec![0u8; header.declared_length as usize];
		file.read_exact(&mut payload)?;
		fields.extend(parse_link_payload(path, payload_offset, &payload)?);
		Ok(false)
	})?;

	Ok(fields)
}

/// Whether the container has any `LINK` block at all. Header walk only; used
/// to skip files that cannot possibly need rewriting.
pub fn has_link_blocks(path: &Path) -> Result<bool> {
	let mut file = File::open(path)?;
	let mut found = false;

	walk_headers(path, &mut file, |_, header, _| {
		if header.is_link() {
			found = true;
			return Ok(true);
		}
		Ok(false)
	})?;

	Ok(found)
}

fn parse_link_payload(
	path: &Path, payload_offset: u64, payload: &[u8],
) -> Result<Vec<ContainerField>> {
	let mut cursor = 0usize;

	let field_count = read_u32(path, payload, &mut cursor, "field count")?;
	let mut fields = Vec::with_capacity(field_count as usize);

	for _ in 0..field_count {
		let byte_capacity = read_u32(path, payload, &mut cursor, "field capacity")?;
		let end = cursor
			.checked_add(byte_capacity as usize)
			.filter(|end| *end <= payload.len())
			.ok_or_else(|| RelinkError::malformed(path, "field overruns link payload"))?;

		fields.push(ContainerField {
			file_offset: payload_offset + cursor as u64,
			byte_capacity,
			raw: payload[cursor..end].to_vec(),
		});
		cursor = end;
	}

	Ok(fields)
}

fn read_u32(path: &Path, payload: &[u8], cursor: &mut usize, what: &str) -> Result<u32> {
	let end = *cursor + 4;
	if end > payload.len() {
		return Err(RelinkError::malformed(path, format!("truncated {what}")));
	}
	let value = u32::from_le_bytes([
		payload[*cursor],
		payload[*cursor + 1],
		payload[*cursor + 2],
		payload[*cursor + 3],
	]);
	*cursor = end;
	Ok(value)
}

/// Collect container files under `root`, pruning ignored directories from the
/// traversal entirely and filtering by tracked extension.
pub fn scan_containers(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
	let ignores = config.compiled_ignores()?;

	let mut containers: Vec<PathBuf> = WalkDir::new(root)
		.follow_links(false)
		.into_iter()
		.filter_entry(|entry| !is_ignored_dir(entry, &ignores))
		.filter_map(|entry| match entry {
			Ok(entry) => Some(entry),
			Err(err) => {
				warn!("Skipping unreadable entry during scan: {err}");
				None
			}
		})
		.filter(|entry| entry.file_type().is_file())
		.map(|entry| entry.into_path())
		.filter(|path| config.matches_extension(path))
		.collect();

	containers.sort();
	Ok(containers)
}

fn is_ignored_dir(entry: &walkdir::DirEntry, ignores: &[Regex]) -> bool {
	if !entry.file_type().is_dir() || entry.depth() == 0 {
		return false;
	}
	let name = entry.file_name().to_string_lossy();
	ignores.iter().any(|pattern| pattern.is_match(&name))
}
