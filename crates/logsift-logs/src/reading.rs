use std::io;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use logsift_types::{Log, LogBuilder, LogIdAllocator, LogReadingPrecondition, StringPool};

use crate::config::{ConfigKey, ReaderConfig};
use crate::matcher::PatternMatcher;
use crate::options::{LogReadingWindow, ReadingOptions};
use crate::pending::PendingMessage;
use crate::reader::Internal;
use crate::source::LineReader;

/// Lines buffered between the line pump and the pass
const LINE_QUEUE_CAPACITY: usize = 1024;

/// Longest wait for a line before checking cancellation again
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest wait for the pending worker to deliver at the end of a pass
const FLUSH_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// One read of a data source, from opening to end of data or cancellation
///
/// Runs on a blocking thread supplied by the reader's task spawner. It owns
/// the log builder and everything the matching needs; results go back to
/// the owner only as [`Internal`] messages tagged with `token`.
pub(crate) struct ReadingPass {
    pub token: u64,
    pub reader_id: u64,
    pub options: Arc<ReadingOptions>,
    pub config: Arc<ReaderConfig>,
    pub precondition: LogReadingPrecondition,
    pub update_interval: Option<Duration>,
    pub max_log_count: Option<usize>,
    pub file_name: Option<String>,
    pub ids: LogIdAllocator,
    pub cancel: CancellationToken,
    pub internal_tx: mpsc::UnboundedSender<Internal>,
    /// Set for continuous reading
    pub pending: Option<Sender<PendingMessage>>,
}

impl ReadingPass {
    pub fn run(self, reader: Box<dyn LineReader>) {
        debug!(reader = self.reader_id, token = self.token, "reading pass started");
        let lines = match spawn_line_pump(reader, self.reader_id, self.cancel.clone()) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(reader = self.reader_id, error = %e, "unable to start line pump");
                self.report(Some(e), 0);
                return;
            }
        };

        let builder = LogBuilder::new(self.ids.clone())
            .with_string_pool(StringPool::new(self.config.string_pool_capacity));
        let mut matcher = PatternMatcher::new(&self.options, builder, self.file_name.clone());
        let mut sink = LogSink::new(&self);
        let lookahead_timeout = self.config.millis(ConfigKey::SkippableLineTimeout);
        let mut lookahead_deadline: Option<Instant> = None;
        let mut line_number = 0u64;
        let mut error = None;
        let mut end_of_data = false;

        while !self.cancel.is_cancelled() && !sink.is_full() {
            let wait = match lookahead_deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(POLL_INTERVAL),
                None => POLL_INTERVAL,
            };
            match lines.recv_timeout(wait) {
                Ok(Ok(line)) => {
                    line_number += 1;
                    if line_number == 1 {
                        let _ = self
                            .internal_tx
                            .send(Internal::FirstLineRead { token: self.token });
                    }
                    matcher.process_line(&line, line_number, &mut |log| sink.accept(log));
                    lookahead_deadline = matcher
                        .wants_lookahead()
                        .then(|| Instant::now() + lookahead_timeout);
                }
                Ok(Err(e)) => {
                    warn!(reader = self.reader_id, line = line_number + 1, error = %e, "error reading line");
                    error = Some(e);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if lookahead_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        trace!(reader = self.reader_id, "no line in time, skipping remaining patterns");
                        matcher.on_line_timeout(&mut |log| sink.accept(log));
                        lookahead_deadline = None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    end_of_data = true;
                    break;
                }
            }
            sink.tick();
        }

        if end_of_data {
            matcher.finish(&mut |log| sink.accept(log));
        }
        let produced = sink.finish();
        debug!(
            reader = self.reader_id,
            token = self.token,
            lines = line_number,
            produced,
            cancelled = self.cancel.is_cancelled(),
            "reading pass finished"
        );
        self.report(error, produced);
    }

    fn report(&self, error: Option<io::Error>, produced: usize) {
        let _ = self.internal_tx.send(Internal::ReadingCompleted {
            token: self.token,
            error,
            produced,
        });
    }
}

/// Pull lines from the blocking reader on their own thread
///
/// The receiver disconnects at end of data. A read error is forwarded and
/// ends the pump.
fn spawn_line_pump(
    mut reader: Box<dyn LineReader>,
    reader_id: u64,
    cancel: CancellationToken,
) -> io::Result<Receiver<io::Result<String>>> {
    let (tx, rx) = crossbeam_channel::bounded(LINE_QUEUE_CAPACITY);
    thread::Builder::new()
        .name(format!("logsift-lines-{}", reader_id))
        .spawn(move || {
            while !cancel.is_cancelled() {
                let line = match reader.read_line() {
                    Ok(Some(line)) => Ok(line),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Destination of completed logs within a pass
struct LogSink<'a> {
    pass: &'a ReadingPass,
    /// Logs accepted by the precondition
    produced: usize,
    batch: Vec<Log>,
    batch_started: Option<Instant>,
    chunk_size: usize,
    batch_interval: Duration,
    padding: Duration,
    continuous_interval: Duration,
}

impl<'a> LogSink<'a> {
    fn new(pass: &'a ReadingPass) -> Self {
        let config = &pass.config;
        Self {
            pass,
            produced: 0,
            batch: Vec::new(),
            batch_started: None,
            chunk_size: config.non_continuous_chunk_size.max(1),
            batch_interval: config.millis(ConfigKey::NonContinuousUpdateInterval),
            padding: config.millis(ConfigKey::NonContinuousPaddingInterval),
            continuous_interval: pass
                .update_interval
                .unwrap_or_else(|| config.millis(ConfigKey::ContinuousUpdateInterval)),
        }
    }

    fn window(&self) -> Option<(LogReadingWindow, usize)> {
        self.pass.options.reading_window.zip(self.pass.max_log_count)
    }

    /// No more logs are wanted
    fn is_full(&self) -> bool {
        matches!(self.window(), Some((LogReadingWindow::StartOfDataSource, max)) if self.produced >= max)
    }

    fn accept(&mut self, log: Log) {
        if !self.pass.precondition.is_empty() && !self.pass.precondition.matches(&log) {
            trace!(reader = self.pass.reader_id, id = log.id(), "log rejected by precondition");
            return;
        }
        if self.is_full() {
            return;
        }
        self.produced += 1;

        if let Some(pending) = &self.pass.pending {
            let _ = pending.send(PendingMessage::Push {
                token: self.pass.token,
                log,
                interval: self.continuous_interval,
            });
            return;
        }

        self.batch.push(log);
        self.batch_started.get_or_insert_with(Instant::now);
        if let Some((LogReadingWindow::EndOfDataSource, max)) = self.window() {
            if self.batch.len() > max {
                let excess = self.batch.len() - max;
                self.batch.drain(..excess);
            }
        }
        if self.batch.len() >= self.chunk_size {
            self.flush(false);
        }
    }

    fn tick(&mut self) {
        if self
            .batch_started
            .is_some_and(|started| started.elapsed() >= self.batch_interval)
        {
            self.flush(false);
        }
    }

    fn flush(&mut self, last: bool) {
        self.batch_started = None;
        if self.batch.is_empty() {
            return;
        }
        let logs = mem::take(&mut self.batch);
        trace!(reader = self.pass.reader_id, count = logs.len(), "delivering batch");
        let _ = self.pass.internal_tx.send(Internal::LogsRead {
            token: self.pass.token,
            logs,
        });
        if !last && !self.padding.is_zero() {
            thread::sleep(self.padding);
        }
    }

    /// Deliver what is left, returning the number of logs produced
    fn finish(mut self) -> usize {
        self.flush(true);
        if let Some(pending) = &self.pass.pending {
            let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
            let flushed = pending
                .send(PendingMessage::Flush {
                    token: self.pass.token,
                    ack: ack_tx,
                })
                .is_ok();
            if flushed && ack_rx.recv_timeout(FLUSH_ACK_TIMEOUT).is_err() {
                warn!(reader = self.pass.reader_id, "pending logs not delivered in time");
            }
        }
        self.produced
    }
}
