//! Decides whether a decoded field value is affected by recorded moves and
//! what its new encoded value should be.
//!
//! Field values come in three authoring conventions: absolute,
//! container-relative with a `//` prefix, and bare relative against the
//! container's directory. The convention of a value is preserved across a
//! rewrite; a relative reference is never silently upgraded to absolute.

use std::path::{Component, Path, PathBuf};

use crate::move_log::MoveSet;
use crate::path_norm;

/// How a field value spells its path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathConvention {
	Absolute,
	/// `//`-prefixed, resolved against the container's directory.
	ContainerRelative,
	/// No prefix, resolved against the container's directory.
	BareRelative,
}

/// Decision for one field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMatch {
	/// No recorded move affects this value.
	Unchanged,
	/// The value must be rewritten to this encoded string.
	Rewrite { new_value: String },
	/// A move affects the value but the new target shares no root with the
	/// container, so no relative spelling exists.
	NoRelativePath,
}

pub struct ReferenceMatcher<'a> {
	move_set: &'a MoveSet,
	container_dir: PathBuf,
}

impl<'a> ReferenceMatcher<'a> {
	pub fn new(move_set: &'a MoveSet, container_path: &Path) -> Self {
		let container_dir = path_norm::normalize(
			container_path.parent().unwrap_or_else(|| Path::new("/")),
		);
		Self { move_set, container_dir }
	}

	/// Classify, resolve, look up, and re-encode one field value.
	pub fn match_field(&self, value: &str) -> FieldMatch {
		if value.is_empty() {
			return FieldMatch::Unchanged;
		}

		let convention = classify(value);
		let resolved = self.resolve(value, convention);

		let Some(new_target) = self.lookup(&resolved) else {
			return FieldMatch::Unchanged;
		};

		match self.encode(&new_target, convention) {
			Some(new_value) if new_value == value => FieldMatch::Unchanged,
			Some(new_value) => FieldMatch::Rewrite { new_value },
			None => FieldMatch::NoRelativePath,
		}
	}

	/// Resolve a field value to a normalized absolute path.
	pub fn resolve(&self, value: &str, convention: PathConvention) -> PathBuf {
		match convention {
			PathConvention::Absolute => path_norm::normalize(Path::new(value)),
			PathConvention::ContainerRelative => {
				path_norm::normalize_against(&self.container_dir, Path::new(&value[2..]))
			}
			PathConvention::BareRelative => {
				path_norm::normalize_against(&self.container_dir, Path::new(value))
			}
		}
	}

	/// Terminal destination for a resolved path, if any recorded move covers
	/// it. An exact record wins; otherwise the longest moved-directory prefix
	/// applies by substitution. Prefix matches respect component boundaries,
	/// so `old_dir_backup/x` never matches `old_dir`.
	fn lookup(&self, resolved: &Path) -> Option<PathBuf> {
		if let Some(target) = self.move_set.get(resolved) {
			return Some(target.new_path.clone());
		}

		let mut best: Option<(&PathBuf, &Path, &PathBuf)> = None;
		for (old_dir, target) in self.move_set.directories() {
			if let Ok(rest) = resolved.strip_prefix(old_dir) {
				let longer = match best {
					None => true,
					Some((best_old, _, _)) => {
						old_dir.as_os_str().len() > best_old.as_os_str().len()
					}
				};
				if longer {
					best = Some((old_dir, rest, &target.new_path));
				}
			}
		}

		best.map(|(_, rest, new_dir)| new_dir.join(rest))
	}

	/// Re-encode an absolute target in the value's original convention.
	/// Returns `None` when a relative convention cannot reach the target.
	pub fn encode(&self, target: &Path, convention: PathConvention) -> Option<String> {
		match convention {
			PathConvention::Absolute => Some(target.to_string_lossy().into_owned()),
			PathConvention::ContainerRelative => {
				let rel = path_norm::relative_from(&self.container_dir, target)?;
				Some(format!("//{}", to_slash_string(&rel)))
			}
			PathConvention::BareRelative => {
				let rel = path_norm::relative_from(&self.container_dir, target)?;
				Some(to_slash_string(&rel))
			}
		}
	}
}

/// Classify a field value's authoring convention. The `//` prefix is checked
/// before platform absoluteness because `//x` parses as absolute on Unix.
pub fn classify(value: &str) -> PathConvention {
	if value.starts_with("//") {
		PathConvention::ContainerRelative
	} else if Path::new(value).is_absolute() {
		PathConvention::Absolute
	} else {
		PathConvention::BareRelative
	}
}

/// Join path components with forward slashes, the separator both relative
/// conventions are authored with.
fn to_slash_string(path: &Path) -> String {
	let mut out = String::new();
	for component in path.components() {
		let part: std::borrow::Cow<str> = match component {
			Component::ParentDir => "..".into(),
			Component::CurDir => ".".into(),
			Component::Normal(name) => name.to_string_lossy(),
			Component::RootDir | Component::Prefix(_) => continue,
		};
		if !out.is_empty() {
			out.push('/');
		}
		out.push_str(&part);
	}
	out
}
