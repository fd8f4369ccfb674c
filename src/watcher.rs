//! The watch phase: one notify watcher and one correlator per root, all
//! appending to a shared move log.
//!
//! Each root gets its own pipeline (notify backend, blocking bridge thread,
//! correlator task) so correlation always sees a single ordered event stream.
//! Roots run concurrently; the only shared sink is the move log writer.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::correlator::{Correlator, CorrelatorConfig, CorrelatorStats};
use crate::error::{RelinkError, Result};
use crate::events::{EventKind, WatchEvent};
use crate::move_log::MoveLogWriter;

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
	/// Overrides the configured debounce window.
	pub debounce: Option<Duration>,
}

/// Shutdown summary of a watch run.
#[derive(Debug)]
pub struct WatchReport {
	pub records_written: u64,
	pub roots: Vec<(PathBuf, CorrelatorStats)>,
}

/// A running watch over one or more roots.
///
/// `start` spawns the pipelines and returns immediately; records stream to
/// the log until `stop`, which drains every pipeline and flushes unmatched
/// pending deletions as plain deletions.
pub struct WatchSession {
	shutdown: watch::Sender<bool>,
	workers: Vec<(PathBuf, JoinHandle<Result<CorrelatorStats>>)>,
	writer: Arc<Mutex<MoveLogWriter>>,
}

impl WatchSession {
	pub async fn start(
		roots: &[PathBuf], config: &Config, log_path: &Path, options: &WatchOptions,
	) -> Result<Self> {
		if roots.is_empty() {
			return Err(RelinkError::configuration(
				"roots",
				"no watch roots given",
				"at least one directory",
				"none",
			));
		}
		for root in roots {
			if !root.is_dir() {
				return Err(RelinkError::InvalidPath {
					path: root.to_string_lossy().to_string(),
				});
			}
		}

		let debounce = options
			.debounce
			.unwrap_or_else(|| Duration::from_secs_f64(config.debounce_delay));
		let correlator_config = CorrelatorConfig::with_debounce(debounce);
		correlator_config.validate()?;

		let writer = Arc::new(Mutex::new(MoveLogWriter::open(log_path)?));
		let (shutdown, _) = watch::channel(false);

		let mut workers = Vec::with_capacity(roots.len());
		for root in roots {
			let handle = tokio::spawn(run_root(
				root.clone(),
				config.clone(),
				correlator_config.clone(),
				Arc::clone(&writer),
				shutdown.subscribe(),
			));
			workers.push((root.clone(), handle));
		}

		info!(
			"Watching {} root(s), appending moves to {:?} (debounce {:?})",
			workers.len(),
			log_path,
			debounce
		);
		Ok(Self { shutdown, workers, writer })
	}

	/// Signal every pipeline to stop, wait for them to drain, and summarize.
	pub async fn stop(self) -> Result<WatchReport> {
		let _ = self.shutdown.send(true);

		let mut roots = Vec::with_capacity(self.workers.len());
		let mut first_error = None;
		for (root, handle) in self.workers {
			match handle.await {
				Ok(Ok(stats)) => {
					info!(
						"{:?}: {} events, {} moves, {} renames, {} expired deletions",
						root,
						stats.events_processed,
						stats.moves_emitted,
						stats.renames_emitted,
						stats.expired_deletions
					);
					roots.push((root, stats));
				}
				Ok(Err(err)) => {
					error!("Watcher for {:?} failed: {err}", root);
					if first_error.is_none() {
						first_error = Some(err);
					}
				}
				Err(err) => error!("Watcher task for {:?} panicked: {err}", root),
			}
		}

		let records_written = self.writer.lock().await.records_written();
		match first_error {
			Some(err) => Err(err),
			None => Ok(WatchReport { records_written, roots }),
		}
	}
}

async fn run_root(
	root: PathBuf, config: Config, correlator_config: CorrelatorConfig,
	writer: Arc<Mutex<MoveLogWriter>>, mut shutdown: watch::Receiver<bool>,
) -> Result<CorrelatorStats> {
	let ignores = config.compiled_ignores()?;
	let debounce = correlator_config.debounce;

	let (notify_tx, notify_rx) = mpsc::channel();
	let mut fs_watcher = RecommendedWatcher::new(
		notify_tx,
		notify::Config::default().with_poll_interval(Duration::from_millis(100)),
	)?;
	fs_watcher.watch(&root, RecursiveMode::Recursive)?;
	info!("Watching {:?}", root);

	let (event_tx, mut event_rx) = tokio_mpsc::unbounded_channel();
	tokio::task::spawn_blocking(move || bridge_notify_events(notify_rx, event_tx));

	let mut correlator = Correlator::new(correlator_config);
	let mut sweep = tokio::time::interval(debounce);

	loop {
		tokio::select! {
			received = event_rx.recv() => match received {
				Some(event) => {
					if !wants_event(&event, &config, &ignores) {
						debug!("Filtered out event for {:?}", event.path);
						continue;
					}
					for record in correlator.process_event(event) {
						writer.lock().await.append(&record)?;
					}
				}
				None => {
					warn!("Event stream for {:?} ended", root);
					break;
				}
			},
			_ = sweep.tick() => correlator.sweep_expired(),
			_ = shutdown.changed() => break,
		}
	}

	// Dropping the backend closes the bridge's channel and ends its thread.
	drop(fs_watcher);

	let flushed = correlator.flush_pending();
	if flushed > 0 {
		info!("{:?}: {flushed} unmatched pending deletions flushed as plain deletions", root);
	}
	Ok(correlator.stats().clone())
}

/// Forward notify events into the async pipeline. Runs on a blocking thread
/// because notify delivers over a std channel.
fn bridge_notify_events(
	notify_rx: mpsc::Receiver<notify::Result<notify::Event>>,
	event_tx: tokio_mpsc::UnboundedSender<WatchEvent>,
) {
	for result in notify_rx {
		match result {
			Ok(event) => {
				for watch_event in convert_notify_event(event) {
					if event_tx.send(watch_event).is_err() {
						return;
					}
				}
			}
			Err(err) => warn!("Watch backend error: {err}"),
		}
	}
}

/// Flatten one notify event into per-path watch events. A two-path rename
/// collapses into a single native move carrying both endpoints.
fn convert_notify_event(event: notify::Event) -> Vec<WatchEvent> {
	use notify::event::{ModifyKind, RenameMode};

	if matches!(
		event.kind,
		notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both))
	) && event.paths.len() == 2
	{
		let from = event.paths[0].clone();
		let to = event.paths[1].clone();
		let (is_directory, size) = probe_path(&to);
		return vec![WatchEvent::new(
			EventKind::MovedTo { from },
			to,
			is_directory,
			size,
		)];
	}

	event
		.paths
		.iter()
		.map(|path| {
			let (is_directory, size) = probe_path(path);
			WatchEvent::new(EventKind::from(event.kind), path.clone(), is_directory, size)
		})
		.collect()
}

fn probe_path(path: &Path) -> (bool, Option<u64>) {
	match std::fs::metadata(path) {
		Ok(metadata) => {
			let size = metadata.is_file().then(|| metadata.len());
			(metadata.is_dir(), size)
		}
		// Already gone; an extensionless name is most likely a directory.
		Err(_) => (path.extension().is_none(), None),
	}
}

/// Extension and ignore filtering, applied before correlation so noise never
/// occupies a pending slot. Directory events always pass the extension check
/// because directory moves affect files of any extension beneath them.
fn wants_event(event: &WatchEvent, config: &Config, ignores: &[Regex]) -> bool {
	if is_ignored(&event.path, ignores) {
		return false;
	}
	if event.is_directory {
		return true;
	}
	match &event.kind {
		EventKind::MovedTo { from } => {
			config.matches_extension(&event.path) || config.matches_extension(from)
		}
		_ => config.matches_extension(&event.path),
	}
}

fn is_ignored(path: &Path, ignores: &[Regex]) -> bool {
	path.components().any(|component| match component {
		Component::Normal(name) => {
			let name = name.to_string_lossy();
			ignores.iter().any(|pattern| pattern.is_match(&name))
		}
		_ => false,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use notify::event::{CreateKind, ModifyKind, RenameMode};

	fn test_config() -> Config {
		Config::default()
	}

	#[test]
	fn test_convert_collapses_two_path_rename() {
		let event = notify::Event::new(notify::EventKind::Modify(ModifyKind::Name(
			RenameMode::Both,
		)))
		.add_path(PathBuf::from("/a/old.pack"))
		.add_path(PathBuf::from("/a/new.pack"));

		let converted = convert_notify_event(event);
		assert_eq!(converted.len(), 1);
		assert_eq!(converted[0].path, PathBuf::from("/a/new.pack"));
		assert_eq!(
			converted[0].kind,
			EventKind::MovedTo { from: PathBuf::from("/a/old.pack") }
		);
	}

	#[test]
	fn test_convert_emits_one_event_per_path() {
		let event = notify::Event::new(notify::EventKind::Create(CreateKind::File))
			.add_path(PathBuf::from("/a/x.pack"))
			.add_path(PathBuf::from("/a/y.pack"));

		let converted = convert_notify_event(event);
		assert_eq!(converted.len(), 2);
		assert!(converted.iter().all(|e| e.kind == EventKind::Created));
	}

	#[test]
	fn test_wants_event_filters_extension_and_ignores() {
		let config = test_config();
		let ignores = config.compiled_ignores().unwrap();

		let tracked = WatchEvent::new(
			EventKind::Created,
			PathBuf::from("/p/scene.pack"),
			false,
			None,
		);
		assert!(wants_event(&tracked, &config, &ignores));

		let untracked = WatchEvent::new(
			EventKind::Created,
			PathBuf::from("/p/notes.txt"),
			false,
			None,
		);
		assert!(!wants_event(&untracked, &config, &ignores));

		let in_ignored = WatchEvent::new(
			EventKind::Created,
			PathBuf::from("/p/.git/objects/scene.pack"),
			false,
			None,
		);
		assert!(!wants_event(&in_ignored, &config, &ignores));

		let directory = WatchEvent::new(
			EventKind::Created,
			PathBuf::from("/p/textures"),
			true,
			None,
		);
		assert!(wants_event(&directory, &config, &ignores));
	}

	#[test]
	fn test_wants_event_accepts_move_into_tracked_extension() {
		let config = test_config();
		let ignores = config.compiled_ignores().unwrap();

		let move_in = WatchEvent::new(
			EventKind::MovedTo { from: PathBuf::from("/p/x.tmp") },
			PathBuf::from("/p/x.pack"),
			false,
			None,
		);
		assert!(wants_event(&move_in, &config, &ignores));

		let move_out = WatchEvent::new(
			EventKind::MovedTo { from: PathBuf::from("/p/x.pack") },
			PathBuf::from("/p/x.tmp"),
			false,
			None,
		);
		assert!(wants_event(&move_out, &config, &ignores));
	}

	#[tokio::test]
	async fn test_start_rejects_missing_root() {
		let dir = tempfile::tempdir().unwrap();
		let result = WatchSession::start(
			&[dir.path().join("absent")],
			&test_config(),
			&dir.path().join("moves.jsonl"),
			&WatchOptions::default(),
		)
		.await;
		assert!(matches!(result, Err(RelinkError::InvalidPath { .. })));
	}

	#[tokio::test]
	async fn test_start_rejects_empty_roots() {
		let dir = tempfile::tempdir().unwrap();
		let result = WatchSession::start(
			&[],
			&test_config(),
			&dir.path().join("moves.jsonl"),
			&WatchOptions::default(),
		)
		.await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn test_quiet_session_writes_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let watched = dir.path().join("assets");
		std::fs::create_dir(&watched).unwrap();
		let log_path = dir.path().join("moves.jsonl");

		let session = WatchSession::start(
			&[watched],
			&test_config(),
			&log_path,
			&WatchOptions { debounce: Some(Duration::from_millis(100)) },
		)
		.await
		.unwrap();

		let report = session.stop().await.unwrap();
		assert_eq!(report.records_written, 0);
		assert_eq!(report.roots.len(), 1);
		assert!(log_path.exists());
	}
}
