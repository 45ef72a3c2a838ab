use std::time::Duration;

/// Reader properties observers can be told about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReaderProperty {
    State,
    IsWaitingForDataSource,
    IsRestarting,
    MemorySize,
    MaxLogCount,
    DropLogCount,
    Precondition,
    UpdateInterval,
    RestartReadingDelay,
    Options,
}

/// Change applied to the output log list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogsChange {
    /// `count` logs added at the end, the first one at `start`
    Appended { start: usize, count: usize },
    /// Oldest logs removed
    RemovedFront { count: usize },
    /// Newest logs removed
    RemovedBack { count: usize },
    Cleared,
}

/// Notification sent to reader subscribers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderEvent {
    PropertyChanged(ReaderProperty),
    LogsChanged(LogsChange),
    /// Continuous reading reached the end of data and restarts after `delay`
    RestartScheduled { delay: Duration },
}
