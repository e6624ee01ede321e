//! Engine configuration.

use crate::clock::{Clock, SystemClock};
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of entities processed between cancellation checks.
pub const DEFAULT_IMPORT_BATCH_SIZE: usize = 64;
/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// SQLite database file; created when missing.
    File(PathBuf),
    /// Private in-memory database, lost on drop.
    InMemory,
}

/// Options used by [`crate::KanbanService::open`].
#[derive(Clone)]
pub struct EngineConfig {
    pub storage: Storage,
    pub busy_timeout: Duration,
    /// Entities handled between cancellation checks in long-running jobs.
    pub import_batch_size: usize,
    pub clock: Arc<dyn Clock>,
}

impl EngineConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: Storage::File(path.into()),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_import_batch_size(mut self, batch_size: usize) -> Self {
        self.import_batch_size = batch_size.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: Storage::InMemory,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            import_batch_size: DEFAULT_IMPORT_BATCH_SIZE,
            clock: Arc::new(SystemClock),
        }
    }
}

impl Debug for EngineConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("storage", &self.storage)
            .field("busy_timeout", &self.busy_timeout)
            .field("import_batch_size", &self.import_batch_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineConfig, Storage, DEFAULT_IMPORT_BATCH_SIZE};

    #[test]
    fn defaults_to_in_memory_storage() {
        let config = EngineConfig::default();
        assert_eq!(config.storage, Storage::InMemory);
        assert_eq!(config.import_batch_size, DEFAULT_IMPORT_BATCH_SIZE);
    }

    #[test]
    fn batch_size_is_never_zero() {
        let config = EngineConfig::in_memory().with_import_batch_size(0);
        assert_eq!(config.import_batch_size, 1);
    }
}
