//! Log reading for logsift
//!
//! This crate turns lines from a data source into logs: pattern matching,
//! field conversion, the reader state machine and the delivery of logs into
//! an observable list.

mod buffer;
mod config;
mod context;
mod convert;
mod error;
mod events;
mod group;
mod matcher;
mod options;
mod pattern;
mod pending;
mod reader;
mod reading;
mod source;
mod spawner;

pub use buffer::{LevelCounts, LogList};
pub use config::{ConfigKey, MIN_PROGRESSIVE_CLEARING_CHUNK_SIZE, ReaderConfig};
pub use context::ReaderContext;
pub use error::{ReaderError, Result};
pub use events::{LogsChange, ReaderEvent, ReaderProperty};
pub use group::{ClearingTicket, ClearingTrigger, LogGroup, SharedLogGroup};
pub use options::{LogReadingWindow, ReadingOptions};
pub use pattern::{LogPattern, LogPatternMatchingMode};
pub use reader::{DropLogCount, LogReader, LogReaderState, ReaderStatus};
pub use source::{
    BufLineReader, DataSourceOptions, DataSourceState, FileLogDataSource, LineReader,
    LogDataSource, MemoryLogDataSource,
};
pub use spawner::{BlockingPool, BlockingTask, DedicatedThreads, TaskSpawner};

// Re-export types used in our public API
pub use logsift_types::{
    Log, LogField, LogLevel, LogReadingPrecondition, LogStringEncoding, LogTimeSpanEncoding,
    LogTimestampEncoding, LogValue, Range,
};
