use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Condvar, Mutex};
use tokio::sync::watch;

use super::{DataSourceOptions, DataSourceState, LineReader, LogDataSource};

enum Entry {
    Line(String),
    Error(String),
}

#[derive(Default)]
struct Queue {
    entries: VecDeque<Entry>,
    /// Readers wait for more entries instead of ending
    held_open: bool,
    /// Next open fails with this message
    open_error: Option<String>,
    /// Bumped on every open, older readers end
    generation: u64,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

/// In-memory data source fed by the caller
///
/// Each opened reader consumes the queued entries. Once the queue is empty
/// the reader reports end of data, unless the source is held open, in which
/// case it blocks until more lines are pushed or the source is released.
/// Opening a reader ends every reader opened before it.
#[derive(Clone)]
pub struct MemoryLogDataSource {
    shared: Arc<Shared>,
    state: watch::Sender<DataSourceState>,
    options: DataSourceOptions,
}

impl MemoryLogDataSource {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DataSourceState::ReadyToOpenReader);
        Self {
            shared: Arc::new(Shared::default()),
            state,
            options: DataSourceOptions::default(),
        }
    }

    /// Pretend the lines come from a file
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.options.file_name = Some(file_name.into());
        self
    }

    pub fn push_line(&self, line: impl Into<String>) {
        self.push(Entry::Line(line.into()));
    }

    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = self.shared.queue.lock();
        queue
            .entries
            .extend(lines.into_iter().map(|line| Entry::Line(line.into())));
        self.shared.ready.notify_all();
    }

    /// Make the reader fail when it reaches this point
    pub fn push_read_error(&self, message: impl Into<String>) {
        self.push(Entry::Error(message.into()));
    }

    /// Make the next open fail
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.shared.queue.lock().open_error = Some(message.into());
    }

    /// Keep readers waiting for more lines instead of ending
    pub fn hold_open(&self) {
        self.shared.queue.lock().held_open = true;
    }

    /// Let waiting readers reach the end of data
    pub fn release(&self) {
        self.shared.queue.lock().held_open = false;
        self.shared.ready.notify_all();
    }

    pub fn set_state(&self, state: DataSourceState) {
        self.state.send_replace(state);
    }

    fn push(&self, entry: Entry) {
        self.shared.queue.lock().entries.push_back(entry);
        self.shared.ready.notify_all();
    }
}

impl Default for MemoryLogDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LogDataSource for MemoryLogDataSource {
    fn state(&self) -> DataSourceState {
        *self.state.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<DataSourceState> {
        self.state.subscribe()
    }

    fn options(&self) -> DataSourceOptions {
        self.options.clone()
    }

    fn open_reader(&self) -> BoxFuture<'static, io::Result<Box<dyn LineReader>>> {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            let generation = {
                let mut queue = shared.queue.lock();
                if let Some(message) = queue.open_error.take() {
                    return Err(io::Error::other(message));
                }
                queue.generation += 1;
                queue.generation
            };
            shared.ready.notify_all();
            Ok(Box::new(MemoryLineReader { shared, generation }) as Box<dyn LineReader>)
        })
    }
}

struct MemoryLineReader {
    shared: Arc<Shared>,
    generation: u64,
}

impl LineReader for MemoryLineReader {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut queue = self.shared.queue.lock();
        loop {
            if queue.generation != self.generation {
                return Ok(None);
            }
            match queue.entries.pop_front() {
                Some(Entry::Line(line)) => return Ok(Some(line)),
                Some(Entry::Error(message)) => return Err(io::Error::other(message)),
                None if queue.held_open => self.shared.ready.wait(&mut queue),
                None => return Ok(None),
            }
        }
    }
}
