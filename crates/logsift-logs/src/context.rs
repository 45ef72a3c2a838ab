use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use logsift_types::LogIdAllocator;

use crate::config::ReaderConfig;
use crate::group::LogGroup;
use crate::spawner::{DedicatedThreads, TaskSpawner};

/// Process-wide state shared by readers
///
/// Hands out reader ids and log ids, and carries the configuration, the
/// optional log group and the default task spawner.
#[derive(Clone)]
pub struct ReaderContext {
    pub(crate) config: Arc<ReaderConfig>,
    pub(crate) group: Option<Arc<dyn LogGroup>>,
    pub(crate) spawner: Arc<dyn TaskSpawner>,
    pub(crate) log_ids: LogIdAllocator,
    reader_ids: Arc<AtomicU64>,
}

impl ReaderContext {
    pub fn new(config: ReaderConfig) -> Self {
        Self {
            config: Arc::new(config),
            group: None,
            spawner: Arc::new(DedicatedThreads),
            log_ids: LogIdAllocator::new(),
            reader_ids: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_group(mut self, group: Arc<dyn LogGroup>) -> Self {
        self.group = Some(group);
        self
    }

    /// Spawner used when the group does not pick one
    pub fn with_task_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub(crate) fn next_reader_id(&self) -> u64 {
        self.reader_ids.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for ReaderContext {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}
