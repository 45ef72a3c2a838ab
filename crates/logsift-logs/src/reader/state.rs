use std::fmt;

/// Lifecycle of a [`LogReader`](super::LogReader)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogReaderState {
    /// Options can be changed, nothing is read
    Preparing,
    /// Waiting for the data source or opening it
    Starting,
    /// Starting, logs will be withheld once reading begins
    StartingWhenPaused,
    ReadingLogs,
    /// Reading continues but logs are withheld until resumed
    Paused,
    ClearingLogs,
    Stopping,
    Stopped,
    DataSourceError,
    UnclassifiedError,
    Disposed,
}

impl LogReaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "Preparing",
            Self::Starting => "Starting",
            Self::StartingWhenPaused => "StartingWhenPaused",
            Self::ReadingLogs => "ReadingLogs",
            Self::Paused => "Paused",
            Self::ClearingLogs => "ClearingLogs",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::DataSourceError => "DataSourceError",
            Self::UnclassifiedError => "UnclassifiedError",
            Self::Disposed => "Disposed",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::DataSourceError | Self::UnclassifiedError)
    }

    /// Whether the state is one of the starting states
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting | Self::StartingWhenPaused)
    }

    /// Whether a reading pass may be running
    pub fn is_reading(&self) -> bool {
        matches!(self, Self::ReadingLogs | Self::Paused)
    }
}

impl fmt::Display for LogReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
