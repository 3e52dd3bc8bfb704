//! Indexing orchestration: full and incremental runs, search, and
//! progress plumbing.

mod orchestrator;
mod progress;

pub use orchestrator::ContextIndexer;
pub use progress::{IndexPhase, IndexProgress, IndexStats, ProgressCallback, ProgressReporter};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Observable lifecycle state of a codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodebaseState {
    Absent,
    Preparing,
    Indexing,
    Completed,
    LimitReached,
    Failed,
    Clearing,
}

impl CodebaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodebaseState::Absent => "absent",
            CodebaseState::Preparing => "preparing",
            CodebaseState::Indexing => "indexing",
            CodebaseState::Completed => "completed",
            CodebaseState::LimitReached => "limit_reached",
            CodebaseState::Failed => "failed",
            CodebaseState::Clearing => "clearing",
        }
    }
}

/// Cooperative cancellation checked at batch boundaries.
///
/// When tripped mid-run, the orchestrator persists a snapshot covering
/// only files whose chunks were fully written, then returns.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
