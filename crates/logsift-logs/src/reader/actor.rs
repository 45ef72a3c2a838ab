use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use logsift_types::{Log, LogReadingPrecondition};

use super::{Command, DropLogCount, Internal, LogReaderState, OptionsUpdate, ReaderStatus};
use crate::buffer::LogList;
use crate::config::ConfigKey;
use crate::context::ReaderContext;
use crate::error::{ReaderError, Result};
use crate::events::{LogsChange, ReaderEvent, ReaderProperty};
use crate::group::ClearingTicket;
use crate::options::ReadingOptions;
use crate::pending::PendingWorker;
use crate::reading::ReadingPass;
use crate::source::{DataSourceState, LineReader, LogDataSource};

/// Background work that can be cancelled
struct Running {
    token: u64,
    cancel: CancellationToken,
}

impl Running {
    fn new(token: u64) -> Self {
        Self {
            token,
            cancel: CancellationToken::new(),
        }
    }
}

struct Clearing {
    progressive: bool,
    /// Registration with the log group, steps come as [`Internal::ClearTick`]
    ticket: Option<ClearingTicket>,
}

/// Tunables that can change in any state
struct Settings {
    max_log_count: Option<usize>,
    drop_log_count: DropLogCount,
    precondition: LogReadingPrecondition,
    update_interval: Option<Duration>,
    restart_reading_delay: Duration,
}

/// Owner of a reader's state
///
/// Only this task changes the state or the log list. Background work posts
/// [`Internal`] messages tagged with the token it was started with, and
/// messages carrying a token that is no longer current are dropped.
pub(super) struct ReaderActor {
    id: u64,
    source: Arc<dyn LogDataSource>,
    context: ReaderContext,
    options: Arc<ReadingOptions>,
    settings: Settings,

    state: LogReaderState,
    state_before_clearing: LogReaderState,
    is_waiting_for_data_source: bool,
    is_restarting: bool,

    logs: LogList,
    /// Logs read while paused or clearing
    withheld: Vec<Log>,

    status: Arc<RwLock<ReaderStatus>>,
    state_tx: watch::Sender<LogReaderState>,
    events: broadcast::Sender<ReaderEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,

    next_token: u64,
    opening: Option<Running>,
    pass: Option<Running>,
    pending: Option<PendingWorker>,

    /// When reading starts again
    start_at: Option<Instant>,
    clearing: Option<Clearing>,
    /// Next progressive clearing step without a log group
    clear_at: Option<Instant>,
    /// Messages received while clearing, handled once clearing is done
    deferred: Vec<Internal>,
}

impl ReaderActor {
    pub fn new(
        id: u64,
        source: Arc<dyn LogDataSource>,
        context: ReaderContext,
        status: Arc<RwLock<ReaderStatus>>,
        state_tx: watch::Sender<LogReaderState>,
        events: broadcast::Sender<ReaderEvent>,
        logs: LogList,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        Self {
            id,
            source,
            context,
            options: Arc::default(),
            settings: Settings {
                max_log_count: None,
                drop_log_count: DropLogCount::default(),
                precondition: LogReadingPrecondition::default(),
                update_interval: None,
                restart_reading_delay: Duration::ZERO,
            },
            state: LogReaderState::Preparing,
            state_before_clearing: LogReaderState::Preparing,
            is_waiting_for_data_source: false,
            is_restarting: false,
            logs,
            withheld: Vec::new(),
            status,
            state_tx,
            events,
            internal_tx,
            internal_rx: Some(internal_rx),
            next_token: 0,
            opening: None,
            pass: None,
            pending: None,
            start_at: None,
            clearing: None,
            clear_at: None,
            deferred: Vec::new(),
        }
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let Some(mut internal_rx) = self.internal_rx.take() else {
            return;
        };
        let mut source_state = self.source.subscribe_state();
        let mut source_open = true;
        debug!(reader = self.id, "reader created");

        loop {
            let start_at = self.start_at;
            let clear_at = self.clear_at;
            let can_start = self.state != LogReaderState::ClearingLogs;

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Dispose(reply)) => {
                            self.dispose().await;
                            if let Some(reply) = reply {
                                let _ = reply.send(());
                            }
                            break;
                        }
                        Some(command) => self.handle_command(command),
                        None => {
                            self.dispose().await;
                            break;
                        }
                    }
                }

                Some(message) = internal_rx.recv() => {
                    self.handle_internal(message);
                }

                changed = source_state.changed(), if source_open => {
                    match changed {
                        Ok(()) => {
                            let state = *source_state.borrow_and_update();
                            self.on_source_state(state);
                        }
                        Err(_) => source_open = false,
                    }
                }

                _ = sleep_until(start_at.unwrap_or_else(Instant::now)), if start_at.is_some() && can_start => {
                    self.start_at = None;
                    self.start_reading_logs();
                }

                _ = sleep_until(clear_at.unwrap_or_else(Instant::now)), if clear_at.is_some() => {
                    self.clear_at = None;
                    self.clear_step();
                }
            }
        }
        debug!(reader = self.id, "reader disposed");
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::UpdateOptions(update, reply) => {
                let _ = reply.send(self.update_options(update));
            }
            Command::SetMaxLogCount(max, reply) => {
                let _ = reply.send(self.set_max_log_count(max));
            }
            Command::SetDropLogCount(count, reply) => {
                let _ = reply.send(self.set_drop_log_count(count));
            }
            Command::SetPrecondition(precondition, reply) => {
                if self.settings.precondition != precondition {
                    self.settings.precondition = precondition.clone();
                    self.status.write().precondition = precondition;
                    self.emit_property(ReaderProperty::Precondition);
                }
                let _ = reply.send(Ok(()));
            }
            Command::SetUpdateInterval(interval, reply) => {
                let _ = reply.send(self.set_update_interval(interval));
            }
            Command::SetRestartReadingDelay(delay, reply) => {
                self.set_restart_reading_delay(delay);
                let _ = reply.send(Ok(()));
            }
            Command::Start(reply) => {
                let _ = reply.send(self.start());
            }
            Command::Pause(reply) => {
                let _ = reply.send(Ok(self.pause()));
            }
            Command::Resume(reply) => {
                let _ = reply.send(Ok(self.resume()));
            }
            Command::Stop(reply) => {
                self.stop();
                let _ = reply.send(Ok(()));
            }
            Command::ClearLogs { progressive, reply } => {
                self.clear_logs(progressive);
                let _ = reply.send(Ok(()));
            }
            Command::Restart(reply) => {
                let _ = reply.send(self.restart());
            }
            Command::Dispose(_) => {}
        }
    }

    fn update_options(&mut self, update: OptionsUpdate) -> Result<()> {
        if self.state != LogReaderState::Preparing {
            return Err(ReaderError::NotPreparing {
                property: "options",
                state: self.state,
            });
        }
        let mut options = (*self.options).clone();
        update(&mut options);
        self.options = Arc::new(options);
        self.status.write().options = Arc::clone(&self.options);
        self.emit_property(ReaderProperty::Options);
        Ok(())
    }

    fn set_max_log_count(&mut self, max: Option<usize>) -> Result<()> {
        if max == Some(0) {
            return Err(ReaderError::InvalidValue {
                property: "max_log_count",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.settings.max_log_count != max {
            self.settings.max_log_count = max;
            self.status.write().max_log_count = max;
            self.emit_property(ReaderProperty::MaxLogCount);
            self.drop_logs(0);
        }
        Ok(())
    }

    fn set_drop_log_count(&mut self, count: DropLogCount) -> Result<()> {
        if count == DropLogCount::Fixed(0) {
            return Err(ReaderError::InvalidValue {
                property: "drop_log_count",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.settings.drop_log_count != count {
            self.settings.drop_log_count = count;
            self.status.write().drop_log_count = count;
            self.emit_property(ReaderProperty::DropLogCount);
        }
        Ok(())
    }

    fn set_update_interval(&mut self, interval: Option<Duration>) -> Result<()> {
        if interval.is_some_and(|i| i.is_zero()) {
            return Err(ReaderError::InvalidValue {
                property: "update_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.settings.update_interval != interval {
            self.settings.update_interval = interval;
            self.status.write().update_interval = interval;
            self.emit_property(ReaderProperty::UpdateInterval);
        }
        Ok(())
    }

    fn set_restart_reading_delay(&mut self, delay: Duration) {
        if self.settings.restart_reading_delay == delay {
            return;
        }
        self.settings.restart_reading_delay = delay;
        self.status.write().restart_reading_delay = delay;
        if self.start_at.is_some() {
            debug!(reader = self.id, ?delay, "rescheduling restart");
            self.start_at = Some(Instant::now() + delay);
        }
        self.emit_property(ReaderProperty::RestartReadingDelay);
    }

    fn start(&mut self) -> Result<()> {
        if self.state != LogReaderState::Preparing {
            return Err(ReaderError::InvalidState(self.state));
        }
        if self.options.patterns.is_empty() {
            return Err(ReaderError::NoLogPatterns);
        }
        self.begin_start();
        Ok(())
    }

    fn pause(&mut self) -> bool {
        match self.state {
            LogReaderState::StartingWhenPaused | LogReaderState::Paused => true,
            LogReaderState::Starting | LogReaderState::ReadingLogs if !self.options.is_continuous => {
                warn!(reader = self.id, "cannot pause when not reading continuously");
                false
            }
            LogReaderState::Starting => {
                self.set_state(LogReaderState::StartingWhenPaused);
                true
            }
            LogReaderState::ReadingLogs => {
                self.set_state(LogReaderState::Paused);
                true
            }
            state => {
                warn!(reader = self.id, %state, "cannot pause");
                false
            }
        }
    }

    fn resume(&mut self) -> bool {
        match self.state {
            LogReaderState::Starting | LogReaderState::ReadingLogs => true,
            LogReaderState::StartingWhenPaused => {
                self.set_state(LogReaderState::Starting);
                true
            }
            LogReaderState::Paused => {
                self.set_state(LogReaderState::ReadingLogs);
                let withheld = mem::take(&mut self.withheld);
                self.deliver(withheld);
                true
            }
            state => {
                warn!(reader = self.id, %state, "cannot resume");
                false
            }
        }
    }

    fn stop(&mut self) {
        match self.state {
            LogReaderState::Stopping | LogReaderState::Stopped | LogReaderState::Disposed => return,
            LogReaderState::Preparing | LogReaderState::DataSourceError | LogReaderState::UnclassifiedError => {
                self.set_state(LogReaderState::Stopped);
                return;
            }
            _ => {}
        }

        self.cancel_opening();
        self.start_at = None;
        self.clearing = None;
        self.clear_at = None;
        self.set_restarting(false);
        self.withheld.clear();
        self.deferred.clear();
        self.set_waiting(false);

        // the pass flushes what it has before reporting completion
        match &self.pass {
            Some(pass) => {
                pass.cancel.cancel();
                self.set_state(LogReaderState::Stopping);
            }
            None => self.set_state(LogReaderState::Stopped),
        }
    }

    fn clear_logs(&mut self, progressive: bool) {
        if self.state == LogReaderState::Preparing {
            return;
        }
        if self
            .clearing
            .as_ref()
            .is_some_and(|clearing| clearing.progressive == progressive)
        {
            return;
        }

        if self.state != LogReaderState::ClearingLogs {
            self.state_before_clearing = self.state;
        }
        self.set_state(LogReaderState::ClearingLogs);

        if !self.options.is_continuous {
            self.cancel_pass();
            self.cancel_opening();
        } else if let Some(pass) = &self.pass {
            self.discard_pending(pass.token);
        }
        self.withheld.clear();

        if progressive {
            debug!(reader = self.id, count = self.logs.len(), "clearing logs progressively");
            let ticket = self.context.group.as_ref().map(|group| {
                let tx = self.internal_tx.clone();
                group.schedule_progressive_clearing(Box::new(move || {
                    let _ = tx.send(Internal::ClearTick);
                }))
            });
            if ticket.is_none() {
                self.clear_at = Some(Instant::now());
            }
            self.clearing = Some(Clearing {
                progressive: true,
                ticket,
            });
        } else {
            self.clearing = None;
            self.clear_at = None;
            if self.logs.clear() > 0 {
                self.emit_logs(LogsChange::Cleared);
            }
            self.on_clearing_completed();
        }
    }

    fn restart(&mut self) -> Result<()> {
        if self.is_restarting {
            return Ok(());
        }
        if self.state == LogReaderState::Preparing {
            return self.start();
        }

        debug!(reader = self.id, "restarting");
        self.set_restarting(true);
        self.start_at = None;
        let continuous = self.options.is_continuous;
        if continuous || self.state != LogReaderState::ClearingLogs {
            self.clear_logs(!continuous);
        }
        Ok(())
    }

    async fn dispose(&mut self) {
        self.cancel_opening();
        self.cancel_pass();
        self.start_at = None;
        self.clearing = None;
        self.clear_at = None;
        self.set_restarting(false);
        self.withheld.clear();
        self.deferred.clear();
        self.set_waiting(false);
        self.set_state(LogReaderState::Disposed);

        if self.logs.clear() > 0 {
            self.emit_logs(LogsChange::Cleared);
        }

        // joining the worker blocks until its queue is drained
        if let Some(pending) = self.pending.take() {
            let _ = tokio::task::spawn_blocking(move || drop(pending)).await;
        }
    }

    // ========================================================================
    // Starting
    // ========================================================================

    /// Drop any running work and start reading from scratch
    fn begin_start(&mut self) {
        self.set_restarting(false);
        self.start_at = None;
        self.cancel_pass();
        self.cancel_opening();
        self.set_state(LogReaderState::Starting);
        self.start_reading_logs();
    }

    fn start_reading_logs(&mut self) {
        match self.state {
            LogReaderState::ReadingLogs => self.set_state(LogReaderState::Starting),
            LogReaderState::Paused => self.set_state(LogReaderState::StartingWhenPaused),
            LogReaderState::Starting | LogReaderState::StartingWhenPaused => {}
            state => {
                warn!(reader = self.id, %state, "cannot start reading logs");
                return;
            }
        }
        if self.opening.is_some() || self.pass.is_some() {
            return;
        }

        let source_state = self.source.state();
        if source_state != DataSourceState::ReadyToOpenReader {
            if source_state.is_error() {
                error!(reader = self.id, %source_state, "data source unavailable");
                self.fail(LogReaderState::DataSourceError);
            } else {
                debug!(reader = self.id, %source_state, "waiting for data source");
            }
            return;
        }

        self.next_token += 1;
        let opening = Running::new(self.next_token);
        let token = opening.token;
        let cancel = opening.cancel.clone();
        let open = self.source.open_reader();
        let tx = self.internal_tx.clone();
        debug!(reader = self.id, token, "opening reader");
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = open => {
                    let _ = tx.send(Internal::ReaderOpened { token, result });
                }
            }
        });
        self.opening = Some(opening);
    }

    fn on_reader_opened(&mut self, token: u64, result: std::io::Result<Box<dyn LineReader>>) {
        if self.opening.as_ref().is_none_or(|opening| opening.token != token) {
            return;
        }
        self.opening = None;

        let reader = match result {
            Ok(reader) => reader,
            Err(e) => {
                error!(reader = self.id, error = %e, "unable to open reader");
                self.fail(self.failure_state());
                return;
            }
        };

        let next = match self.state {
            LogReaderState::Starting => LogReaderState::ReadingLogs,
            LogReaderState::StartingWhenPaused => LogReaderState::Paused,
            state => {
                warn!(reader = self.id, %state, "reader opened in unexpected state");
                return;
            }
        };

        if let Err(e) = self.spawn_pass(token, reader) {
            error!(reader = self.id, error = %e, "unable to start reading pass");
            self.fail(LogReaderState::UnclassifiedError);
            return;
        }
        self.set_state(next);
    }

    fn spawn_pass(&mut self, token: u64, reader: Box<dyn LineReader>) -> std::io::Result<()> {
        let pending = if self.options.is_continuous {
            if self.pending.is_none() {
                self.pending = Some(PendingWorker::spawn(self.id, self.internal_tx.clone())?);
            }
            self.pending.as_ref().map(PendingWorker::sender)
        } else {
            None
        };

        let source_options = self.source.options();
        let running = Running::new(token);
        let pass = ReadingPass {
            token,
            reader_id: self.id,
            options: Arc::clone(&self.options),
            config: Arc::clone(&self.context.config),
            precondition: self.settings.precondition.clone(),
            update_interval: self.settings.update_interval,
            max_log_count: self.settings.max_log_count,
            file_name: source_options.file_name.clone(),
            ids: self.context.log_ids.clone(),
            cancel: running.cancel.clone(),
            internal_tx: self.internal_tx.clone(),
            pending,
        };

        let spawner = self
            .context
            .group
            .as_ref()
            .and_then(|group| group.task_spawner(&source_options))
            .unwrap_or_else(|| Arc::clone(&self.context.spawner));
        spawner.spawn(
            &format!("logsift-reader-{}", self.id),
            Box::new(move || pass.run(reader)),
        )?;
        self.pass = Some(running);
        Ok(())
    }

    // ========================================================================
    // Background results
    // ========================================================================

    fn handle_internal(&mut self, message: Internal) {
        if self.state == LogReaderState::ClearingLogs {
            match message {
                Internal::ClearTick => self.clear_step(),
                Internal::LogsRead { token, logs } => {
                    if self.is_current_pass(token) {
                        self.withheld.extend(logs);
                    }
                }
                other => self.deferred.push(other),
            }
            return;
        }

        match message {
            Internal::ReaderOpened { token, result } => self.on_reader_opened(token, result),
            Internal::FirstLineRead { token } => {
                if self.is_current_pass(token) {
                    self.set_waiting(false);
                }
            }
            Internal::LogsRead { token, logs } => self.on_logs_read(token, logs),
            Internal::ReadingCompleted {
                token,
                error,
                produced,
            } => self.on_reading_completed(token, error, produced),
            Internal::ClearTick => {}
        }
    }

    fn on_logs_read(&mut self, token: u64, logs: Vec<Log>) {
        if !self.is_current_pass(token) {
            return;
        }
        match self.state {
            LogReaderState::Paused | LogReaderState::StartingWhenPaused => self.withheld.extend(logs),
            LogReaderState::ReadingLogs | LogReaderState::Starting | LogReaderState::Stopping => {
                self.deliver(logs)
            }
            _ => {}
        }
    }

    fn on_reading_completed(&mut self, token: u64, error: Option<std::io::Error>, produced: usize) {
        if !self.is_current_pass(token) {
            return;
        }
        self.pass = None;
        self.set_waiting(false);

        match self.state {
            LogReaderState::Stopping => {
                self.set_state(LogReaderState::Stopped);
            }
            LogReaderState::ReadingLogs | LogReaderState::Paused => {
                debug!(reader = self.id, produced, "reading logs completed");
                if let Some(e) = error {
                    error!(reader = self.id, error = %e, "error while reading logs");
                    self.fail(self.failure_state());
                } else if self.source.state().is_error() {
                    error!(reader = self.id, source_state = %self.source.state(), "data source failed while reading");
                    self.fail(LogReaderState::DataSourceError);
                } else if self.options.is_continuous {
                    self.schedule_restart(produced);
                } else {
                    self.set_state(LogReaderState::Stopped);
                }
            }
            _ => {}
        }
    }

    fn on_source_state(&mut self, source_state: DataSourceState) {
        match source_state {
            DataSourceState::ReadyToOpenReader => {
                if self.state.is_starting() && self.opening.is_none() && self.pass.is_none() {
                    debug!(reader = self.id, "data source ready");
                    self.start_reading_logs();
                }
            }
            state if state.is_error() => {
                if self.state.is_starting() || self.state.is_reading() {
                    warn!(reader = self.id, source_state = %state, "data source failed, cancel reading logs");
                    self.cancel_opening();
                    self.cancel_pass();
                    self.start_at = None;
                    self.fail(LogReaderState::DataSourceError);
                }
            }
            _ => {}
        }
    }

    /// Continuous reading reached the end of data
    fn schedule_restart(&mut self, produced: usize) {
        let mut delay = self.settings.restart_reading_delay;
        if produced == 0 {
            delay = delay.max(
                self.context
                    .config
                    .millis(ConfigKey::RestartWhenNoLogReadDelay),
            );
        }
        debug!(reader = self.id, ?delay, produced, "restart reading logs later");
        self.start_at = Some(Instant::now() + delay);
        let _ = self.events.send(ReaderEvent::RestartScheduled { delay });
    }

    // ========================================================================
    // Clearing
    // ========================================================================

    fn clear_step(&mut self) {
        if !self.clearing.as_ref().is_some_and(|clearing| clearing.progressive) {
            return;
        }
        let chunk = self.context.config.clearing_chunk_size();
        if self.logs.len() <= chunk {
            if self.logs.clear() > 0 {
                self.emit_logs(LogsChange::Cleared);
            }
            self.clearing = None;
            self.clear_at = None;
            self.on_clearing_completed();
            return;
        }

        let count = self.logs.remove_back(chunk);
        self.emit_logs(LogsChange::RemovedBack { count });
        if self.clearing.as_ref().is_some_and(|clearing| clearing.ticket.is_none()) {
            self.clear_at = Some(
                Instant::now()
                    + self
                        .context
                        .config
                        .millis(ConfigKey::ProgressiveClearingInterval),
            );
        }
    }

    fn on_clearing_completed(&mut self) {
        if self.state != LogReaderState::ClearingLogs {
            return;
        }
        if self.is_restarting {
            debug!(reader = self.id, "logs cleared, start reading logs");
            self.withheld.clear();
            self.deferred.clear();
            self.begin_start();
        } else if self.options.is_continuous {
            self.set_state(self.state_before_clearing);
            if self.state == LogReaderState::ReadingLogs {
                let withheld = mem::take(&mut self.withheld);
                self.deliver(withheld);
            }
            for message in mem::take(&mut self.deferred) {
                self.handle_internal(message);
            }
        } else {
            self.withheld.clear();
            self.deferred.clear();
            self.set_waiting(false);
            self.set_state(LogReaderState::Stopped);
        }
    }

    // ========================================================================
    // Log list
    // ========================================================================

    fn deliver(&mut self, logs: Vec<Log>) {
        if logs.is_empty() {
            return;
        }
        self.drop_logs(logs.len());
        let count = logs.len();
        let start = self.logs.push_many(logs);
        self.emit_logs(LogsChange::Appended { start, count });
        self.drop_logs(0);
    }

    /// Make room for `adding` logs under the max log count
    fn drop_logs(&mut self, adding: usize) {
        let Some(max) = self.settings.max_log_count else {
            return;
        };
        let len = self.logs.len();
        if len + adding <= max {
            return;
        }
        let extra = match self.settings.drop_log_count {
            DropLogCount::Proportional => max / 10,
            DropLogCount::Fixed(count) => count,
        };
        let count = (len + adding - max + extra).min(len);
        if count == 0 {
            return;
        }
        let count = self.logs.remove_front(count);
        debug!(reader = self.id, count, "dropped oldest logs");
        self.emit_logs(LogsChange::RemovedFront { count });
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn is_current_pass(&self, token: u64) -> bool {
        self.pass.as_ref().is_some_and(|pass| pass.token == token)
    }

    fn cancel_pass(&mut self) {
        if let Some(pass) = self.pass.take() {
            debug!(reader = self.id, token = pass.token, "cancel reading logs");
            pass.cancel.cancel();
            self.discard_pending(pass.token);
        }
    }

    fn cancel_opening(&mut self) {
        if let Some(opening) = self.opening.take() {
            debug!(reader = self.id, token = opening.token, "cancel opening reader");
            opening.cancel.cancel();
        }
    }

    fn discard_pending(&self, token: u64) {
        if let Some(pending) = &self.pending {
            pending.discard(token);
        }
    }

    /// State for a failed open or read
    fn failure_state(&self) -> LogReaderState {
        if self.source.state().is_error() {
            LogReaderState::DataSourceError
        } else {
            LogReaderState::UnclassifiedError
        }
    }

    fn fail(&mut self, state: LogReaderState) {
        self.set_waiting(false);
        self.set_state(state);
    }

    fn set_state(&mut self, state: LogReaderState) {
        if self.state == state {
            return;
        }
        debug!(reader = self.id, from = %self.state, to = %state, "state changed");
        self.state = state;
        self.status.write().state = state;
        self.state_tx.send_replace(state);
        self.emit_property(ReaderProperty::State);

        match state {
            LogReaderState::Starting | LogReaderState::StartingWhenPaused => self.set_waiting(true),
            LogReaderState::DataSourceError | LogReaderState::UnclassifiedError => {
                self.set_waiting(false)
            }
            _ => {}
        }
    }

    fn set_waiting(&mut self, waiting: bool) {
        if self.is_waiting_for_data_source != waiting {
            self.is_waiting_for_data_source = waiting;
            self.status.write().is_waiting_for_data_source = waiting;
            self.emit_property(ReaderProperty::IsWaitingForDataSource);
        }
    }

    fn set_restarting(&mut self, restarting: bool) {
        if self.is_restarting != restarting {
            self.is_restarting = restarting;
            self.status.write().is_restarting = restarting;
            self.emit_property(ReaderProperty::IsRestarting);
        }
    }

    fn emit_property(&self, property: ReaderProperty) {
        let _ = self.events.send(ReaderEvent::PropertyChanged(property));
    }

    fn emit_logs(&self, change: LogsChange) {
        let _ = self.events.send(ReaderEvent::LogsChanged(change));
        self.emit_property(ReaderProperty::MemorySize);
    }
}
