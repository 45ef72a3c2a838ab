use std::io;
use std::thread;

use tokio::runtime::Handle;

/// Blocking work handed to a [`TaskSpawner`]
pub type BlockingTask = Box<dyn FnOnce() + Send + 'static>;

/// Where reading passes run
///
/// Readers never run line matching on the async runtime threads. Callers
/// choose between sharing a bounded pool and giving each pass its own thread.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, name: &str, task: BlockingTask) -> io::Result<()>;
}

/// Runs tasks on the blocking pool of a tokio runtime
#[derive(Clone, Debug)]
pub struct BlockingPool {
    handle: Handle,
}

impl BlockingPool {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling task
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl TaskSpawner for BlockingPool {
    fn spawn(&self, _name: &str, task: BlockingTask) -> io::Result<()> {
        self.handle.spawn_blocking(task);
        Ok(())
    }
}

/// Runs every task on a new named thread
#[derive(Clone, Copy, Debug, Default)]
pub struct DedicatedThreads;

impl TaskSpawner for DedicatedThreads {
    fn spawn(&self, name: &str, task: BlockingTask) -> io::Result<()> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(task)
            .map(|_| ())
    }
}
