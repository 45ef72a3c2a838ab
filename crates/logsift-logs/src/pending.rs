use std::io;
use std::mem;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use logsift_types::Log;

use crate::reader::Internal;

/// Messages understood by the pending-log worker
pub(crate) enum PendingMessage {
    /// Queue a log, delivering it at most `interval` later
    Push {
        token: u64,
        log: Log,
        interval: Duration,
    },
    /// Deliver everything queued for `token` now, then signal `ack`
    Flush { token: u64, ack: Sender<()> },
    /// Drop everything queued for `token`
    Discard { token: u64 },
    Shutdown,
}

/// Single-consumer queue coalescing continuously read logs
///
/// Logs are posted to the owner as [`Internal::LogsRead`] batches. The first
/// log of a batch fixes its delivery time, so a steady stream of logs never
/// postpones delivery.
pub(crate) struct PendingWorker {
    tx: Sender<PendingMessage>,
    handle: Option<JoinHandle<()>>,
}

impl PendingWorker {
    pub fn spawn(reader_id: u64, internal_tx: mpsc::UnboundedSender<Internal>) -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name(format!("logsift-pending-{}", reader_id))
            .spawn(move || run(reader_id, rx, internal_tx))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Sender<PendingMessage> {
        self.tx.clone()
    }

    pub fn discard(&self, token: u64) {
        let _ = self.tx.send(PendingMessage::Discard { token });
    }
}

impl Drop for PendingWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(PendingMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("pending log worker panicked");
            }
        }
    }
}

struct Batch {
    token: u64,
    logs: Vec<Log>,
    due: Option<Instant>,
}

impl Batch {
    /// Post queued logs, false once the owner is gone
    fn deliver(&mut self, internal_tx: &mpsc::UnboundedSender<Internal>) -> bool {
        self.due = None;
        if self.logs.is_empty() {
            return true;
        }
        let logs = mem::take(&mut self.logs);
        trace!(token = self.token, count = logs.len(), "delivering pending logs");
        internal_tx
            .send(Internal::LogsRead {
                token: self.token,
                logs,
            })
            .is_ok()
    }
}

fn run(reader_id: u64, rx: Receiver<PendingMessage>, internal_tx: mpsc::UnboundedSender<Internal>) {
    debug!(reader = reader_id, "pending log worker started");
    let mut batch = Batch {
        token: 0,
        logs: Vec::new(),
        due: None,
    };

    loop {
        let message = match batch.due {
            Some(due) => match rx.recv_deadline(due) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            },
        };

        let delivered = match message {
            None => batch.deliver(&internal_tx),
            Some(PendingMessage::Push {
                token,
                log,
                interval,
            }) => {
                let mut delivered = true;
                if token != batch.token {
                    delivered = batch.deliver(&internal_tx);
                    batch.token = token;
                }
                batch.logs.push(log);
                let due = Instant::now() + interval;
                batch.due = Some(batch.due.map_or(due, |current| current.min(due)));
                delivered
            }
            Some(PendingMessage::Flush { token, ack }) => {
                let delivered = token != batch.token || batch.deliver(&internal_tx);
                let _ = ack.send(());
                delivered
            }
            Some(PendingMessage::Discard { token }) => {
                if token == batch.token {
                    batch.logs.clear();
                    batch.due = None;
                }
                true
            }
            Some(PendingMessage::Shutdown) => break,
        };
        if !delivered {
            break;
        }
    }
    debug!(reader = reader_id, "pending log worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_types::{LogBuilder, LogField, LogIdAllocator};

    fn log(message: &str) -> Log {
        let mut builder = LogBuilder::new(LogIdAllocator::new());
        builder.set(LogField::Message, message);
        builder.build()
    }

    fn push(worker: &PendingWorker, token: u64, message: &str, interval: Duration) {
        worker
            .sender()
            .send(PendingMessage::Push {
                token,
                log: log(message),
                interval,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_burst_is_coalesced() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = PendingWorker::spawn(1, tx).unwrap();
        for message in ["a", "b", "c"] {
            push(&worker, 1, message, Duration::from_millis(50));
        }
        match rx.recv().await {
            Some(Internal::LogsRead { token, logs }) => {
                assert_eq!(token, 1);
                let messages: Vec<_> = logs.iter().filter_map(|l| l.message()).collect();
                assert_eq!(messages, ["a", "b", "c"]);
            }
            _ => panic!("expected logs"),
        }
    }

    #[tokio::test]
    async fn test_flush_delivers_before_ack() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = PendingWorker::spawn(2, tx).unwrap();
        push(&worker, 4, "x", Duration::from_secs(60));
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        worker
            .sender()
            .send(PendingMessage::Flush { token: 4, ack: ack_tx })
            .unwrap();
        ack_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(rx.try_recv(), Ok(Internal::LogsRead { token: 4, .. })));
    }

    #[tokio::test]
    async fn test_discard_drops_queued_logs() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = PendingWorker::spawn(3, tx).unwrap();
        push(&worker, 7, "x", Duration::from_millis(30));
        worker.discard(7);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        drop(worker);
    }
}
