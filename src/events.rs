use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventKind {
	Created,
	Deleted,
	Modified,
	/// Native move notification carrying both endpoints.
	MovedTo { from: PathBuf },
	RenameFrom, // Old name in a split rename pair
	RenameTo,   // New name in a split rename pair
	Other(String),
}

impl From<notify::EventKind> for EventKind {
	fn from(kind: notify::EventKind) -> Self {
		match kind {
			notify::EventKind::Create(_) => EventKind::Created,
			notify::EventKind::Modify(modify_kind) => match modify_kind {
				notify::event::ModifyKind::Name(name_kind) => match name_kind {
					notify::event::RenameMode::From => EventKind::RenameFrom,
					notify::event::RenameMode::To => EventKind::RenameTo,
					_ => EventKind::Other("Rename".to_string()),
				},
				_ => EventKind::Modified,
			},
			notify::EventKind::Remove(_) => EventKind::Deleted,
			notify::EventKind::Access(_) => EventKind::Other("Access".to_string()),
			notify::EventKind::Other => EventKind::Other("Unknown".to_string()),
			_ => EventKind::Other(format!("{kind:?}")),
		}
	}
}

/// A raw filesystem notification. Ephemeral; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
	pub kind: EventKind,
	pub path: PathBuf,
	pub is_directory: bool,
	pub size: Option<u64>,
	pub timestamp: DateTime<Utc>,
}

impl WatchEvent {
	pub fn new(kind: EventKind, path: PathBuf, is_directory: bool, size: Option<u64>) -> Self {
		Self {
			kind,
			path,
			is_directory,
			size,
			timestamp: Utc::now(),
		}
	}
}

/// A confirmed move, either native or synthesized from a delete/create pair.
///
/// Both paths are normalized absolute paths and `old_path != new_path`.
/// Immutable once appended to the move log; log order is significant because
/// later records for the same `old_path` supersede earlier ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveRecord {
	pub timestamp: DateTime<Utc>,
	pub old_path: PathBuf,
	pub new_path: PathBuf,
	pub is_directory: bool,
}

impl MoveRecord {
	pub fn new(old_path: PathBuf, new_path: PathBuf, is_directory: bool) -> Self {
		debug_assert_ne!(old_path, new_path);
		Self {
			timestamp: Utc::now(),
			old_path,
			new_path,
			is_directory,
		}
	}

	/// A rename keeps the entry in its original parent directory.
	pub fn is_rename(&self) -> bool {
		self.old_path.parent() == self.new_path.parent()
	}
}
