use clap::{Parser, Subcommand};
use relink::config::Config;
use relink::move_log;
use relink::update::{self, UpdateOptions};
use relink::watcher::{WatchOptions, WatchSession};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "relink")]
#[command(about = "Track file and directory moves, then rewrite path references inside asset containers")]
struct Cli {
	/// Path to a TOML config file
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	/// Enable verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Watch directories and append detected moves to a log
	Watch {
		/// Directories to watch
		#[arg(required = true)]
		roots: Vec<PathBuf>,

		/// Move log to append to (defaults to the configured path)
		#[arg(short, long)]
		log: Option<PathBuf>,

		/// Debounce window for delete/create pairing, in milliseconds
		#[arg(long)]
		debounce_ms: Option<u64>,
	},
	/// Apply a recorded move log to every container under a root
	Update {
		/// Directory tree holding the containers to patch
		root: PathBuf,

		/// Move log to apply (defaults to the configured path)
		#[arg(short, long)]
		log: Option<PathBuf>,

		/// Compute and report every rewrite without writing anything
		#[arg(long)]
		dry_run: bool,

		/// Worker threads for container processing
		#[arg(long)]
		threads: Option<usize>,
	},
	/// Summarize a move log without touching any container
	Report {
		/// Move log to summarize (defaults to the configured path)
		#[arg(short, long)]
		log: Option<PathBuf>,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let config = Config::load_or_default(cli.config.as_deref())?;
	let level = if cli.verbose {
		Level::DEBUG
	} else {
		config.log_level.parse().unwrap_or(Level::INFO)
	};
	tracing_subscriber::fmt().with_max_level(level).init();

	match cli.command {
		Command::Watch { roots, log, debounce_ms } => {
			let log_path = log.unwrap_or_else(|| config.log_path.clone());
			let options = WatchOptions {
				debounce: debounce_ms.map(Duration::from_millis),
			};

			let session = WatchSession::start(&roots, &config, &log_path, &options).await?;
			tokio::signal::ctrl_c().await?;
			info!("Shutting down...");

			let report = session.stop().await?;
			info!(
				"{} move record(s) written to {:?}",
				report.records_written, log_path
			);
		}
		Command::Update { root, log, dry_run, threads } => {
			let log_path = log.unwrap_or_else(|| config.log_path.clone());
			let options = UpdateOptions { dry_run, threads };

			let cancel = Arc::new(AtomicBool::new(false));
			let signal_cancel = Arc::clone(&cancel);
			tokio::spawn(async move {
				if tokio::signal::ctrl_c().await.is_ok() {
					warn!("Cancellation requested, finishing in-flight files...");
					signal_cancel.store(true, Ordering::Relaxed);
				}
			});

			let worker_cancel = Arc::clone(&cancel);
			let report = tokio::task::spawn_blocking(move || {
				update::apply_move_log(&log_path, &root, &config, &options, &worker_cancel)
			})
			.await??;

			info!(
				"{} containers scanned: {} field(s) rewritten, {} skipped, {} failed",
				report.containers_scanned, report.applied, report.skipped, report.failed
			);
			if report.files_with_errors > 0 {
				warn!("{} container(s) could not be processed", report.files_with_errors);
			}
			if report.malformed_log_lines > 0 {
				warn!("{} malformed log line(s) ignored", report.malformed_log_lines);
			}
			if report.cancelled {
				warn!("Run was cancelled; unvisited containers were left untouched");
			}
			if report.failed > 0 {
				anyhow::bail!("{} field rewrite(s) failed", report.failed);
			}
		}
		Command::Report { log } => {
			let log_path = log.unwrap_or_else(|| config.log_path.clone());
			let parsed = move_log::read_move_log(&log_path)?;
			let summary = move_log::summarize(&parsed);

			println!("Move log: {}", log_path.display());
			println!("  records:           {}", summary.total_records);
			println!("  file moves:        {}", summary.file_moves);
			println!("  directory moves:   {}", summary.directory_moves);
			println!("  renames:           {}", summary.renames);
			println!("  relocations:       {}", summary.relocations);
			println!("  terminal mappings: {}", summary.terminal_mappings);
			if summary.malformed_lines > 0 {
				println!("  malformed lines:   {}", summary.malformed_lines);
			}
		}
	}

	Ok(())
}
