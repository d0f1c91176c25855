//! # Pipeline Module
//!
//! Modulo che separa le responsabilità della pipeline remota in sottomoduli:
//! - `orchestrator`: scheduling concorrente Download → Optimize → Upload
//! - `task`: stato e corpo di un singolo file
//! - `progress_tracker`: consumo degli eventi (progress bar, stats, JSON, audit)

pub mod orchestrator;
pub mod progress_tracker;
pub mod task;

pub use orchestrator::Orchestrator;
pub use progress_tracker::ProgressTracker;
pub use task::{FileState, FileTask};

use crate::error::FileError;
use crate::optimizer::OptimizeResult;
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// Unit of progress reporting for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Download,
    Optimize,
    Upload,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Download => "download",
            Phase::Optimize => "optimize",
            Phase::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// One step of one file's progress.
///
/// The sequence of events for a file is the only record of its outcome:
/// it ends with `done = true`, either on Upload, on a skipped Optimize, or
/// on the event carrying `error`.
#[derive(Debug)]
pub struct ProgressEvent {
    /// Index into the task list of this run
    pub file_id: usize,
    pub name: String,
    pub path: String,
    pub phase: Phase,
    pub bytes: u64,
    pub total: u64,
    pub done: bool,
    pub error: Option<FileError>,
    /// Set on Optimize-phase events that reached the optimizer
    pub result: Option<OptimizeResult>,
    pub timestamp: SystemTime,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.done
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_skip(&self) -> bool {
        self.result.as_ref().map_or(false, |r| r.skipped)
    }
}
