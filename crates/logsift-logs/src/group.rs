use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::source::DataSourceOptions;
use crate::spawner::TaskSpawner;

/// Callback asking a reader to remove its next chunk of logs
pub type ClearingTrigger = Box<dyn Fn() + Send + Sync + 'static>;

/// Readers sharing one view of logs
///
/// A group staggers progressive clearing so that readers clearing at the
/// same time do not all remove a chunk on the same tick, and may choose
/// where reading passes run.
pub trait LogGroup: Send + Sync {
    /// Call `trigger` whenever the reader may remove one chunk
    ///
    /// Triggers stop when the returned ticket is dropped.
    fn schedule_progressive_clearing(&self, trigger: ClearingTrigger) -> ClearingTicket;

    /// Spawner for passes reading from a source with these options
    fn task_spawner(&self, _options: &DataSourceOptions) -> Option<Arc<dyn TaskSpawner>> {
        None
    }
}

/// Registration of a clearing trigger, removed on drop
pub struct ClearingTicket {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for ClearingTicket {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().triggers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Next trigger to call
    cursor: usize,
    triggers: Vec<(u64, Arc<dyn Fn() + Send + Sync>)>,
}

/// [`LogGroup`] calling one registered trigger per tick, round robin
pub struct SharedLogGroup {
    registry: Arc<Mutex<Registry>>,
    spawner: Option<Arc<dyn TaskSpawner>>,
    cancel: CancellationToken,
}

impl SharedLogGroup {
    /// Start ticking every `interval`
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(interval: Duration) -> Self {
        let registry = Arc::new(Mutex::new(Registry::default()));
        let cancel = CancellationToken::new();

        let ticking = Arc::clone(&registry);
        let stop = cancel.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticks.tick() => {
                        let trigger = {
                            let mut registry = ticking.lock();
                            if registry.triggers.is_empty() {
                                continue;
                            }
                            let index = registry.cursor % registry.triggers.len();
                            registry.cursor = index + 1;
                            Arc::clone(&registry.triggers[index].1)
                        };
                        trigger();
                    }
                }
            }
            trace!("log group ticking stopped");
        });

        Self {
            registry,
            spawner: None,
            cancel,
        }
    }

    /// Run every member's passes with `spawner`
    pub fn with_task_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Number of readers currently clearing
    pub fn clearing_count(&self) -> usize {
        self.registry.lock().triggers.len()
    }
}

impl LogGroup for SharedLogGroup {
    fn schedule_progressive_clearing(&self, trigger: ClearingTrigger) -> ClearingTicket {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.triggers.push((id, Arc::from(trigger)));
        ClearingTicket {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn task_spawner(&self, _options: &DataSourceOptions) -> Option<Arc<dyn TaskSpawner>> {
        self.spawner.clone()
    }
}

impl Drop for SharedLogGroup {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
