//! Trace-level filtering and the log writer seam.
//!
//! The client emits a small set of diagnostic entries (state transitions,
//! message traffic, errors). Hosts choose what to keep via [`TraceLevel`]
//! and where it goes via [`LogWriter`]. The default writer forwards to the
//! `tracing` macros; [`MemoryLogWriter`] captures entries in memory for
//! assertions and embedders that surface logs themselves.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, trace};

// =============================================================================
// Trace Levels
// =============================================================================

/// Which diagnostic categories a connection emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    /// Emit nothing.
    None,
    /// Lifecycle entries: state transitions and start/stop progress.
    StateChanges,
    /// Message traffic entries.
    Messages,
    /// Error entries, including isolated callback failures.
    Errors,
    /// Every category.
    All,
}

impl TraceLevel {
    /// Whether entries of `category` pass this filter.
    pub fn enables(self, category: TraceLevel) -> bool {
        match self {
            TraceLevel::All => true,
            TraceLevel::None => false,
            level => level == category,
        }
    }
}

// =============================================================================
// Log Writer Seam
// =============================================================================

/// Destination for diagnostic entries that passed the trace-level filter.
pub trait LogWriter: Send + Sync {
    /// Writes a single entry. `category` is the category the entry was
    /// emitted under, after filtering.
    fn write(&self, category: TraceLevel, entry: &str);
}

/// Default writer: forwards entries to the `tracing` macros.
#[derive(Debug, Default)]
pub struct TracingLogWriter;

impl LogWriter for TracingLogWriter {
    fn write(&self, category: TraceLevel, entry: &str) {
        match category {
            TraceLevel::Errors => error!(target: "tether", "{entry}"),
            TraceLevel::Messages => trace!(target: "tether", "{entry}"),
            _ => info!(target: "tether", "{entry}"),
        }
    }
}

/// Writer that stores entries in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryLogWriter {
    entries: Mutex<Vec<String>>,
}

impl MemoryLogWriter {
    /// Creates an empty capture sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a snapshot of all captured entries.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Whether any captured entry equals `entry`.
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.lock().iter().any(|e| e == entry)
    }
}

impl LogWriter for MemoryLogWriter {
    fn write(&self, _category: TraceLevel, entry: &str) {
        self.entries.lock().push(entry.to_string());
    }
}

// =============================================================================
// Logger
// =============================================================================

/// A cheaply cloneable filter + writer pair shared by every component of a
/// connection.
#[derive(Clone)]
pub struct Logger {
    writer: Arc<dyn LogWriter>,
    level: TraceLevel,
}

impl Logger {
    /// Creates a logger from a filter level and a writer.
    pub fn new(level: TraceLevel, writer: Arc<dyn LogWriter>) -> Self {
        Self { writer, level }
    }

    /// Emits `entry` under `category` if the filter allows it.
    pub fn log(&self, category: TraceLevel, entry: &str) {
        if self.level.enables(category) {
            self.writer.write(category, entry);
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(TraceLevel::All, Arc::new(TracingLogWriter))
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").field("level", &self.level).finish()
    }
}
