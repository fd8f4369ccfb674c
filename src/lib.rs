//! Track filesystem moves as they happen, then patch path references inside
//! chunked asset containers to match.
//!
//! The watch phase correlates raw notifications into durable move records;
//! the update phase replays a recorded log against a container tree. The two
//! phases share only the move log file, so they can run on different
//! machines or days apart.

pub mod config;
pub mod container;
pub mod correlator;
pub mod error;
pub mod events;
pub mod matcher;
pub mod move_log;
pub mod path_norm;
pub mod rewriter;
pub mod update;
pub mod watcher;

pub use config::Config;
pub use correlator::{Correlator, CorrelatorConfig, CorrelatorStats};
pub use error::{RelinkError, Result};
pub use events::{EventKind, MoveRecord, WatchEvent};
pub use move_log::{MoveLogWriter, MoveSet};
pub use update::{apply_move_log, UpdateOptions, UpdateReport};
pub use watcher::{WatchOptions, WatchReport, WatchSession};
