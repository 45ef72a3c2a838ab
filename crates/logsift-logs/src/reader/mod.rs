//! The log reader
//!
//! A [`LogReader`] is a handle to an actor task that owns the reader state,
//! its configuration and the write side of its [`LogList`]. Every operation
//! is a message to that task, which gives a single writer without thread
//! affinity checks.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use logsift_types::{Log, LogReadingPrecondition};

use crate::buffer::LogList;
use crate::context::ReaderContext;
use crate::error::{ReaderError, Result};
use crate::events::ReaderEvent;
use crate::options::ReadingOptions;
use crate::source::{LineReader, LogDataSource};

mod actor;
mod state;

pub use state::LogReaderState;

use actor::ReaderActor;

/// Capacity of the event channel, slow subscribers miss older events
const EVENT_CAPACITY: usize = 1024;

/// How many extra logs are dropped once the max log count is exceeded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DropLogCount {
    /// A tenth of the max log count
    #[default]
    Proportional,
    Fixed(usize),
}

/// Snapshot of a reader's observable properties
#[derive(Clone, Debug)]
pub struct ReaderStatus {
    pub state: LogReaderState,
    /// Starting and no line has been read yet
    pub is_waiting_for_data_source: bool,
    /// A restart is waiting for logs to be cleared
    pub is_restarting: bool,
    pub max_log_count: Option<usize>,
    pub drop_log_count: DropLogCount,
    pub precondition: LogReadingPrecondition,
    /// Overrides the continuous update interval
    pub update_interval: Option<Duration>,
    /// Delay before continuous reading restarts at end of data
    pub restart_reading_delay: Duration,
    pub options: Arc<ReadingOptions>,
}

impl Default for ReaderStatus {
    fn default() -> Self {
        Self {
            state: LogReaderState::Preparing,
            is_waiting_for_data_source: false,
            is_restarting: false,
            max_log_count: None,
            drop_log_count: DropLogCount::default(),
            precondition: LogReadingPrecondition::default(),
            update_interval: None,
            restart_reading_delay: Duration::ZERO,
            options: Arc::new(ReadingOptions::default()),
        }
    }
}

type Reply<T = ()> = oneshot::Sender<Result<T>>;

pub(crate) type OptionsUpdate = Box<dyn FnOnce(&mut ReadingOptions) + Send>;

/// Requests from the handle to the actor
pub(crate) enum Command {
    UpdateOptions(OptionsUpdate, Reply),
    SetMaxLogCount(Option<usize>, Reply),
    SetDropLogCount(DropLogCount, Reply),
    SetPrecondition(LogReadingPrecondition, Reply),
    SetUpdateInterval(Option<Duration>, Reply),
    SetRestartReadingDelay(Duration, Reply),
    Start(Reply),
    Pause(Reply<bool>),
    Resume(Reply<bool>),
    Stop(Reply),
    ClearLogs { progressive: bool, reply: Reply },
    Restart(Reply),
    Dispose(Option<oneshot::Sender<()>>),
}

/// Results posted back to the actor by background work
pub(crate) enum Internal {
    ReaderOpened {
        token: u64,
        result: io::Result<Box<dyn LineReader>>,
    },
    FirstLineRead {
        token: u64,
    },
    LogsRead {
        token: u64,
        logs: Vec<Log>,
    },
    ReadingCompleted {
        token: u64,
        error: Option<io::Error>,
        produced: usize,
    },
    /// The log group allows one progressive clearing step
    ClearTick,
}

/// Reads logs from a data source into a [`LogList`]
pub struct LogReader {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<RwLock<ReaderStatus>>,
    state: watch::Receiver<LogReaderState>,
    events: broadcast::Sender<ReaderEvent>,
    logs: LogList,
}

impl LogReader {
    /// Create a reader in the preparing state
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(source: Arc<dyn LogDataSource>, context: &ReaderContext) -> Self {
        let id = context.next_reader_id();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(LogReaderState::Preparing);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let status = Arc::new(RwLock::new(ReaderStatus::default()));
        let logs = LogList::new();

        let actor = ReaderActor::new(
            id,
            source,
            context.clone(),
            Arc::clone(&status),
            state_tx,
            events.clone(),
            logs.clone(),
        );
        tokio::spawn(actor.run(command_rx));

        Self {
            id,
            commands,
            status,
            state,
            events,
            logs,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> LogReaderState {
        *self.state.borrow()
    }

    pub fn status(&self) -> ReaderStatus {
        self.status.read().clone()
    }

    /// Logs read so far
    pub fn logs(&self) -> &LogList {
        &self.logs
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.events.subscribe()
    }

    /// Wait until the state satisfies `predicate`, returning that state
    pub async fn wait_for_state(
        &self,
        predicate: impl Fn(LogReaderState) -> bool,
    ) -> Result<LogReaderState> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| predicate(*s))
            .await
            .map(|s| *s)
            .map_err(|_| ReaderError::Disposed)
    }

    /// Replace the reading options, only while preparing
    pub async fn configure(&self, options: ReadingOptions) -> Result<()> {
        self.update_options(move |current| *current = options).await
    }

    /// Change the reading options in place, only while preparing
    pub async fn update_options(
        &self,
        update: impl FnOnce(&mut ReadingOptions) + Send + 'static,
    ) -> Result<()> {
        self.request(|reply| Command::UpdateOptions(Box::new(update), reply))
            .await
    }

    /// Limit the number of logs kept, `None` for no limit
    pub async fn set_max_log_count(&self, max: Option<usize>) -> Result<()> {
        self.request(|reply| Command::SetMaxLogCount(max, reply)).await
    }

    pub async fn set_drop_log_count(&self, count: DropLogCount) -> Result<()> {
        self.request(|reply| Command::SetDropLogCount(count, reply))
            .await
    }

    /// Filter applied from the next reading pass
    pub async fn set_precondition(&self, precondition: LogReadingPrecondition) -> Result<()> {
        self.request(|reply| Command::SetPrecondition(precondition, reply))
            .await
    }

    pub async fn set_update_interval(&self, interval: Option<Duration>) -> Result<()> {
        self.request(|reply| Command::SetUpdateInterval(interval, reply))
            .await
    }

    pub async fn set_restart_reading_delay(&self, delay: Duration) -> Result<()> {
        self.request(|reply| Command::SetRestartReadingDelay(delay, reply))
            .await
    }

    pub async fn start(&self) -> Result<()> {
        self.request(Command::Start).await
    }

    /// Withhold new logs, false when the reader cannot be paused
    pub async fn pause(&self) -> Result<bool> {
        self.request(Command::Pause).await
    }

    /// Deliver withheld logs and continue, false when not paused or reading
    pub async fn resume(&self) -> Result<bool> {
        self.request(Command::Resume).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    /// Remove all logs, in chunks when `progressive`
    pub async fn clear_logs(&self, progressive: bool) -> Result<()> {
        self.request(|reply| Command::ClearLogs { progressive, reply })
            .await
    }

    /// Clear the logs and read the data source again
    pub async fn restart(&self) -> Result<()> {
        self.request(Command::Restart).await
    }

    /// Cancel everything and drop all logs
    ///
    /// Safe to call more than once.
    pub async fn dispose(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Dispose(Some(tx))).is_ok() {
            let _ = rx.await;
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| ReaderError::Disposed)?;
        rx.await.map_err(|_| ReaderError::Disposed)?
    }
}

impl Drop for LogReader {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Dispose(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaderConfig;
    use crate::events::{LogsChange, ReaderProperty};
    use crate::group::SharedLogGroup;
    use crate::pattern::LogPattern;
    use crate::source::{DataSourceState, FileLogDataSource, MemoryLogDataSource};
    use logsift_types::{LogLevel, Range, parse_timestamp_text};
    use std::future::Future;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config() -> ReaderConfig {
        ReaderConfig {
            continuous_update_interval_ms: 10,
            non_continuous_update_interval_ms: 50,
            non_continuous_padding_interval_ms: 0,
            progressive_clearing_chunk_size: 128,
            progressive_clearing_interval_ms: 5,
            restart_when_no_log_read_delay_ms: 300,
            skippable_line_timeout_ms: 100,
            ..ReaderConfig::default()
        }
    }

    fn options(continuous: bool) -> ReadingOptions {
        ReadingOptions {
            patterns: vec![LogPattern::single(r"^(?<Level>\w+) (?<Message>.*)$").unwrap()],
            is_continuous: continuous,
            ..Default::default()
        }
    }

    async fn reader(source: &MemoryLogDataSource, options: ReadingOptions) -> LogReader {
        let reader = LogReader::new(
            Arc::new(source.clone()),
            &ReaderContext::new(config()),
        );
        reader.configure(options).await.unwrap();
        reader
    }

    async fn within<T>(future: impl Future<Output = T>) -> T {
        tokio::time::timeout(TIMEOUT, future)
            .await
            .expect("timed out")
    }

    async fn wait_for(reader: &LogReader, state: LogReaderState) {
        within(reader.wait_for_state(|s| s == state)).await.unwrap();
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        within(async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
    }

    fn messages(reader: &LogReader) -> Vec<String> {
        reader
            .logs()
            .snapshot()
            .iter()
            .filter_map(|log| log.message().map(str::to_string))
            .collect()
    }

    fn lines(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
        range.map(|i| format!("Info line {}", i)).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_requires_patterns() {
        let source = MemoryLogDataSource::new();
        let reader = reader(&source, ReadingOptions::default()).await;
        assert!(matches!(reader.start().await, Err(ReaderError::NoLogPatterns)));
        assert_eq!(reader.state(), LogReaderState::Preparing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reads_logs_in_order_then_stops() {
        let source = MemoryLogDataSource::new();
        source.push_lines(["Info first", "noise", "Error second", "Warn third"]);
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;

        assert_eq!(messages(&reader), ["first", "second", "third"]);
        let counts = reader.logs().level_counts();
        assert_eq!(counts.get(LogLevel::Error), 1);
        assert_eq!(counts.total(), 3);
        assert!(!reader.status().is_waiting_for_data_source);
        assert!(reader.status().options.patterns.len() == 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_options_locked_after_start() {
        let source = MemoryLogDataSource::new();
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        let err = reader.configure(options(true)).await.unwrap_err();
        assert!(matches!(err, ReaderError::NotPreparing { property: "options", .. }));
        assert!(matches!(reader.start().await, Err(ReaderError::InvalidState(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_values_rejected() {
        let source = MemoryLogDataSource::new();
        let reader = reader(&source, options(false)).await;
        assert!(matches!(
            reader.set_max_log_count(Some(0)).await,
            Err(ReaderError::InvalidValue { property: "max_log_count", .. })
        ));
        assert!(reader.set_drop_log_count(DropLogCount::Fixed(0)).await.is_err());
        assert!(reader.set_update_interval(Some(Duration::ZERO)).await.is_err());
        reader.set_max_log_count(Some(10)).await.unwrap();
        assert_eq!(reader.status().max_log_count, Some(10));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_max_log_count_drops_a_tenth() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        let reader = reader(&source, options(true)).await;
        reader.set_max_log_count(Some(100)).await.unwrap();
        reader.start().await.unwrap();

        source.push_lines(lines(1..=100));
        wait_until(|| reader.logs().len() == 100).await;
        source.push_line("Info line 101");
        wait_until(|| reader.logs().len() != 100).await;

        let messages = messages(&reader);
        assert_eq!(messages.len(), 90);
        assert_eq!(messages[0], "line 12");
        assert_eq!(messages[89], "line 101");
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lowering_max_log_count_drops_immediately() {
        let source = MemoryLogDataSource::new();
        source.push_lines(lines(1..=20));
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;

        reader.set_drop_log_count(DropLogCount::Fixed(2)).await.unwrap();
        reader.set_max_log_count(Some(10)).await.unwrap();
        assert_eq!(reader.logs().len(), 8);
        assert_eq!(messages(&reader)[0], "line 13");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_precondition_filters_logs() {
        let source = MemoryLogDataSource::new();
        source.push_lines([
            "2024-01-01T00:00:00 Info early",
            "2024-01-01T00:00:05 Info late",
            "Info undated",
        ]);
        let options = ReadingOptions {
            patterns: vec![
                LogPattern::single(r"^(?:(?<Timestamp>\d\S+) )?(?<Level>\w+) (?<Message>.*)$")
                    .unwrap(),
            ],
            ..Default::default()
        };
        let reader = reader(&source, options).await;
        let mut precondition = LogReadingPrecondition::default();
        precondition.timestamp_range = Range::new(
            parse_timestamp_text("2024-01-01T00:00:01"),
            parse_timestamp_text("2024-01-01T00:00:02"),
        );
        reader.set_precondition(precondition).await.unwrap();
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;

        // the timestamped logs fall outside the range, the undated one passes
        assert_eq!(messages(&reader), ["undated"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_continuous_restart_without_logs_uses_longer_delay() {
        let source = MemoryLogDataSource::new();
        let reader = reader(&source, options(true)).await;
        reader
            .set_restart_reading_delay(Duration::from_millis(20))
            .await
            .unwrap();
        let mut events = reader.subscribe();
        reader.start().await.unwrap();

        let delay = within(async {
            loop {
                if let Ok(ReaderEvent::RestartScheduled { delay }) = events.recv().await {
                    return delay;
                }
            }
        })
        .await;
        assert_eq!(delay, Duration::from_millis(300));
        assert_eq!(reader.state(), LogReaderState::ReadingLogs);

        source.push_line("Info late");
        let delay = within(async {
            loop {
                if let Ok(ReaderEvent::RestartScheduled { delay }) = events.recv().await {
                    return delay;
                }
            }
        })
        .await;
        assert_eq!(delay, Duration::from_millis(20));
        assert_eq!(messages(&reader), ["late"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_withholds_logs_until_resume() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::ReadingLogs).await;

        assert!(reader.pause().await.unwrap());
        assert_eq!(reader.state(), LogReaderState::Paused);
        source.push_line("Info held");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(reader.logs().is_empty());

        assert!(reader.resume().await.unwrap());
        assert_eq!(messages(&reader), ["held"]);
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_requires_continuous_reading() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::ReadingLogs).await;
        assert!(!reader.pause().await.unwrap());
        assert!(reader.resume().await.unwrap());
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_is_idempotent() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        source.push_line("Info before stop");
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        wait_until(|| reader.logs().len() == 1).await;

        reader.stop().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;
        reader.stop().await.unwrap();
        assert_eq!(reader.state(), LogReaderState::Stopped);
        assert_eq!(messages(&reader), ["before stop"]);
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_progressive_clear_removes_chunks() {
        let source = MemoryLogDataSource::new();
        source.push_lines(lines(1..=300));
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;
        assert_eq!(reader.logs().len(), 300);

        let mut events = reader.subscribe();
        reader.clear_logs(true).await.unwrap();
        assert_eq!(reader.state(), LogReaderState::ClearingLogs);
        wait_for(&reader, LogReaderState::Stopped).await;
        assert!(reader.logs().is_empty());
        assert_eq!(reader.logs().memory_size(), 0);

        let mut changes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ReaderEvent::LogsChanged(change) = event {
                changes.push(change);
            }
        }
        assert_eq!(
            changes,
            [
                LogsChange::RemovedBack { count: 128 },
                LogsChange::RemovedBack { count: 128 },
                LogsChange::Cleared,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_progressive_clear_with_log_group() {
        let group = Arc::new(SharedLogGroup::new(Duration::from_millis(5)));
        let source = MemoryLogDataSource::new();
        source.push_lines(lines(1..=200));
        let context = ReaderContext::new(config()).with_group(group.clone());
        let reader = LogReader::new(Arc::new(source.clone()), &context);
        reader.configure(options(false)).await.unwrap();
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;

        reader.clear_logs(true).await.unwrap();
        assert_eq!(group.clearing_count(), 1);
        wait_for(&reader, LogReaderState::Stopped).await;
        assert!(reader.logs().is_empty());
        assert_eq!(group.clearing_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_clears_and_reads_again() {
        let source = MemoryLogDataSource::new();
        source.push_lines(["Info one", "Info two"]);
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;
        assert_eq!(reader.logs().len(), 2);

        source.push_line("Info three");
        let mut events = reader.subscribe();
        reader.restart().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;
        assert_eq!(messages(&reader), ["three"]);
        assert!(!reader.status().is_restarting);

        let mut state_changes = 0;
        let mut cleared = false;
        while let Ok(event) = events.try_recv() {
            match event {
                ReaderEvent::PropertyChanged(ReaderProperty::State) => state_changes += 1,
                ReaderEvent::LogsChanged(LogsChange::Cleared) => cleared = true,
                _ => {}
            }
        }
        assert!(cleared);
        // clearing, starting, reading, stopped
        assert_eq!(state_changes, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_while_clearing_waits_for_clearing() {
        let source = MemoryLogDataSource::new();
        source.push_lines(lines(1..=2000));
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;
        assert_eq!(reader.logs().len(), 2000);

        source.push_line("Info again");
        reader.clear_logs(true).await.unwrap();
        reader.restart().await.unwrap();
        let status = reader.status();
        assert!(status.is_restarting);
        assert_eq!(status.state, LogReaderState::ClearingLogs);

        wait_for(&reader, LogReaderState::Stopped).await;
        assert_eq!(messages(&reader), ["again"]);
        assert!(!reader.status().is_restarting);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_continuous_clear_resumes_reading() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        source.push_lines(lines(1..=2000));
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        wait_until(|| reader.logs().len() == 2000).await;

        let mut events = reader.subscribe();
        reader.clear_logs(true).await.unwrap();
        assert_eq!(reader.state(), LogReaderState::ClearingLogs);
        source.push_line("Info during clear");
        wait_until(|| messages(&reader) == ["during clear"]).await;
        assert_eq!(reader.state(), LogReaderState::ReadingLogs);

        let mut changes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ReaderEvent::LogsChanged(change) = event {
                changes.push(change);
            }
        }
        let cleared = changes
            .iter()
            .position(|change| *change == LogsChange::Cleared)
            .expect("logs were not cleared");
        assert!(changes[..cleared]
            .iter()
            .all(|change| matches!(change, LogsChange::RemovedBack { .. })));
        assert_eq!(
            changes[cleared + 1..],
            [LogsChange::Appended { start: 0, count: 1 }]
        );
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_while_starting() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        source.set_state(DataSourceState::Preparing);
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        assert_eq!(reader.state(), LogReaderState::Starting);

        assert!(reader.pause().await.unwrap());
        assert_eq!(reader.state(), LogReaderState::StartingWhenPaused);
        assert!(reader.pause().await.unwrap());

        source.push_line("Info while paused");
        source.set_state(DataSourceState::ReadyToOpenReader);
        wait_for(&reader, LogReaderState::Paused).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(reader.logs().is_empty());

        assert!(reader.resume().await.unwrap());
        assert_eq!(reader.state(), LogReaderState::ReadingLogs);
        assert_eq!(messages(&reader), ["while paused"]);
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_results_of_stopped_pass_are_ignored_after_restart() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        source.push_line("Info old");
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        wait_until(|| reader.logs().len() == 1).await;

        let mut events = reader.subscribe();
        reader.stop().await.unwrap();
        reader.restart().await.unwrap();
        wait_for(&reader, LogReaderState::ReadingLogs).await;

        source.push_line("Info new");
        wait_until(|| messages(&reader) == ["new"]).await;
        // the stopped pass reports completion within one poll interval
        tokio::time::sleep(Duration::from_millis(300)).await;
        source.push_line("Info later");
        wait_until(|| reader.logs().len() == 2).await;
        assert_eq!(messages(&reader), ["new", "later"]);
        assert_eq!(reader.state(), LogReaderState::ReadingLogs);

        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, ReaderEvent::RestartScheduled { .. }));
        }
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispose_drops_logs_and_rejects_commands() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        source.push_line("Info kept");
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        wait_until(|| reader.logs().len() == 1).await;

        reader.dispose().await;
        reader.dispose().await;
        assert_eq!(reader.state(), LogReaderState::Disposed);
        assert!(reader.logs().is_empty());
        assert!(matches!(reader.stop().await, Err(ReaderError::Disposed)));
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_failure_is_unclassified() {
        let source = MemoryLogDataSource::new();
        source.fail_next_open("refused");
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::UnclassifiedError).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_error_is_unclassified_in_continuous_mode() {
        let source = MemoryLogDataSource::new();
        source.push_line("Info ok");
        source.push_read_error("disk gone");
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::UnclassifiedError).await;
        assert_eq!(messages(&reader), ["ok"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_source_error_before_start() {
        let source = MemoryLogDataSource::new();
        source.set_state(DataSourceState::SourceNotFound);
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::DataSourceError).await;
        assert!(!reader.status().is_waiting_for_data_source);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_source_error_while_reading() {
        let source = MemoryLogDataSource::new();
        source.hold_open();
        let reader = reader(&source, options(true)).await;
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::ReadingLogs).await;
        source.set_state(DataSourceState::ExternalDependencyNotFound);
        wait_for(&reader, LogReaderState::DataSourceError).await;
        source.release();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_waits_for_source_to_become_ready() {
        let source = MemoryLogDataSource::new();
        source.set_state(DataSourceState::Preparing);
        source.push_line("Info ready");
        let reader = reader(&source, options(false)).await;
        reader.start().await.unwrap();
        assert_eq!(reader.state(), LogReaderState::Starting);
        assert!(reader.status().is_waiting_for_data_source);

        source.set_state(DataSourceState::ReadyToOpenReader);
        wait_for(&reader, LogReaderState::Stopped).await;
        assert_eq!(messages(&reader), ["ready"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_file_logs_carry_location() {
        let path = std::env::temp_dir().join(format!("logsift-reader-{}.log", std::process::id()));
        std::fs::write(&path, "Info one\nnoise\nWarn two\n").unwrap();
        let reader = LogReader::new(
            Arc::new(FileLogDataSource::new(&path)),
            &ReaderContext::new(config()),
        );
        reader.configure(options(false)).await.unwrap();
        reader.start().await.unwrap();
        wait_for(&reader, LogReaderState::Stopped).await;

        let logs = reader.logs().snapshot();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].line_number(), Some(3));
        assert_eq!(logs[1].file_name(), Some(path.display().to_string().as_str()));
        std::fs::remove_file(&path).unwrap();
    }
}
