use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use logsift_types::{Log, LogLevel};

/// Ordered list of the logs a reader delivered
///
/// Cloned handles share the list. Only the owning reader mutates it, other
/// holders get read access.
#[derive(Clone, Default)]
pub struct LogList {
    inner: Arc<RwLock<ListInner>>,
}

#[derive(Default)]
struct ListInner {
    logs: VecDeque<Arc<Log>>,
    memory_size: usize,
    counts: LevelCounts,
}

impl ListInner {
    fn account(&mut self, log: &Log, added: bool) {
        let size = log.memory_size();
        let level = log.level().unwrap_or_default();
        if added {
            self.memory_size += size;
            self.counts.counts[level.index()] += 1;
        } else {
            self.memory_size = self.memory_size.saturating_sub(size);
            let count = &mut self.counts.counts[level.index()];
            *count = count.saturating_sub(1);
        }
    }
}

impl LogList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().logs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<Log>> {
        self.inner.read().logs.get(index).cloned()
    }

    /// Get all logs
    pub fn snapshot(&self) -> Vec<Arc<Log>> {
        self.inner.read().logs.iter().cloned().collect()
    }

    /// Get logs in a range (for virtual scrolling)
    pub fn range(&self, start: usize, count: usize) -> Vec<Arc<Log>> {
        let inner = self.inner.read();
        inner.logs.iter().skip(start).take(count).cloned().collect()
    }

    /// Get the last N logs
    pub fn tail(&self, n: usize) -> Vec<Arc<Log>> {
        let inner = self.inner.read();
        let start = inner.logs.len().saturating_sub(n);
        inner.logs.iter().skip(start).cloned().collect()
    }

    /// Logs with an id greater than `id`, all logs when `None`
    ///
    /// Ids increase along the list, so this is everything appended after
    /// the log with that id.
    pub fn newer_than(&self, id: Option<u64>) -> Vec<Arc<Log>> {
        let inner = self.inner.read();
        let start = match id {
            Some(id) => inner.logs.partition_point(|log| log.id() <= id),
            None => 0,
        };
        inner.logs.range(start..).cloned().collect()
    }

    /// Approximate bytes held by the logs
    pub fn memory_size(&self) -> usize {
        self.inner.read().memory_size
    }

    pub fn level_counts(&self) -> LevelCounts {
        self.inner.read().counts.clone()
    }

    /// Append logs, returning the index of the first one
    pub(crate) fn push_many(&self, logs: Vec<Log>) -> usize {
        let mut inner = self.inner.write();
        let start = inner.logs.len();
        for log in logs {
            inner.account(&log, true);
            inner.logs.push_back(Arc::new(log));
        }
        start
    }

    /// Remove up to `n` oldest logs
    pub(crate) fn remove_front(&self, n: usize) -> usize {
        let mut inner = self.inner.write();
        let n = n.min(inner.logs.len());
        for log in inner.logs.drain(..n).collect::<Vec<_>>() {
            inner.account(&log, false);
        }
        n
    }

    /// Remove up to `n` newest logs
    pub(crate) fn remove_back(&self, n: usize) -> usize {
        let mut inner = self.inner.write();
        let len = inner.logs.len();
        let n = n.min(len);
        for log in inner.logs.drain(len - n..).collect::<Vec<_>>() {
            inner.account(&log, false);
        }
        n
    }

    pub(crate) fn clear(&self) -> usize {
        let mut inner = self.inner.write();
        let removed = inner.logs.len();
        inner.logs = VecDeque::new();
        inner.memory_size = 0;
        inner.counts = LevelCounts::default();
        removed
    }
}

/// Counts per log level, logs without a level count as undefined
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    counts: [usize; LogLevel::ALL.len()],
}

impl LevelCounts {
    pub fn get(&self, level: LogLevel) -> usize {
        self.counts[level.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Non-zero counts in ascending severity
    pub fn iter(&self) -> impl Iterator<Item = (LogLevel, usize)> + '_ {
        LogLevel::ALL
            .iter()
            .map(|level| (*level, self.counts[level.index()]))
            .filter(|(_, count)| *count > 0)
    }
}
