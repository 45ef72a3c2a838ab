use std::fmt;

/// Shape of the value a [`LogField`] holds once a log is built
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Single-line text, overwritten on every capture
    Text,
    /// Text joined with newlines when captured by several lines
    MultiLineText,
    Timestamp,
    TimeSpan,
    Integer,
    Level,
}

/// Every property a log can carry
///
/// Named regex groups are bound to these fields by name, so the variant
/// names double as the capture group names accepted in log patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogField {
    BeginningTimeSpan,
    BeginningTimestamp,
    Category,
    DeviceId,
    DeviceName,
    EndingTimeSpan,
    EndingTimestamp,
    Event,
    Extra1,
    Extra2,
    Extra3,
    Extra4,
    Extra5,
    Extra6,
    Extra7,
    Extra8,
    Extra9,
    Extra10,
    FileName,
    Level,
    LineNumber,
    Message,
    ProcessId,
    ProcessName,
    SourceName,
    Summary,
    Tags,
    ThreadId,
    ThreadName,
    TimeSpan,
    Timestamp,
    Title,
    UserId,
    UserName,
}

impl LogField {
    pub const COUNT: usize = 34;

    pub const ALL: [LogField; Self::COUNT] = [
        Self::BeginningTimeSpan,
        Self::BeginningTimestamp,
        Self::Category,
        Self::DeviceId,
        Self::DeviceName,
        Self::EndingTimeSpan,
        Self::EndingTimestamp,
        Self::Event,
        Self::Extra1,
        Self::Extra2,
        Self::Extra3,
        Self::Extra4,
        Self::Extra5,
        Self::Extra6,
        Self::Extra7,
        Self::Extra8,
        Self::Extra9,
        Self::Extra10,
        Self::FileName,
        Self::Level,
        Self::LineNumber,
        Self::Message,
        Self::ProcessId,
        Self::ProcessName,
        Self::SourceName,
        Self::Summary,
        Self::Tags,
        Self::ThreadId,
        Self::ThreadName,
        Self::TimeSpan,
        Self::Timestamp,
        Self::Title,
        Self::UserId,
        Self::UserName,
    ];

    /// Fields holding a point in time
    pub const TIMESTAMPS: [LogField; 3] = [
        Self::BeginningTimestamp,
        Self::EndingTimestamp,
        Self::Timestamp,
    ];

    /// Fields holding a duration
    pub const TIME_SPANS: [LogField; 3] = [
        Self::BeginningTimeSpan,
        Self::EndingTimeSpan,
        Self::TimeSpan,
    ];

    /// Position of the field in [`LogField::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::BeginningTimeSpan => "BeginningTimeSpan",
            Self::BeginningTimestamp => "BeginningTimestamp",
            Self::Category => "Category",
            Self::DeviceId => "DeviceId",
            Self::DeviceName => "DeviceName",
            Self::EndingTimeSpan => "EndingTimeSpan",
            Self::EndingTimestamp => "EndingTimestamp",
            Self::Event => "Event",
            Self::Extra1 => "Extra1",
            Self::Extra2 => "Extra2",
            Self::Extra3 => "Extra3",
            Self::Extra4 => "Extra4",
            Self::Extra5 => "Extra5",
            Self::Extra6 => "Extra6",
            Self::Extra7 => "Extra7",
            Self::Extra8 => "Extra8",
            Self::Extra9 => "Extra9",
            Self::Extra10 => "Extra10",
            Self::FileName => "FileName",
            Self::Level => "Level",
            Self::LineNumber => "LineNumber",
            Self::Message => "Message",
            Self::ProcessId => "ProcessId",
            Self::ProcessName => "ProcessName",
            Self::SourceName => "SourceName",
            Self::Summary => "Summary",
            Self::Tags => "Tags",
            Self::ThreadId => "ThreadId",
            Self::ThreadName => "ThreadName",
            Self::TimeSpan => "TimeSpan",
            Self::Timestamp => "Timestamp",
            Self::Title => "Title",
            Self::UserId => "UserId",
            Self::UserName => "UserName",
        }
    }

    /// Look a field up by its exact name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.name() == name)
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Self::BeginningTimestamp | Self::EndingTimestamp | Self::Timestamp => {
                FieldKind::Timestamp
            }
            Self::BeginningTimeSpan | Self::EndingTimeSpan | Self::TimeSpan => FieldKind::TimeSpan,
            Self::LineNumber | Self::ProcessId | Self::ThreadId => FieldKind::Integer,
            Self::Level => FieldKind::Level,
            Self::Message
            | Self::Summary
            | Self::Extra1
            | Self::Extra2
            | Self::Extra3
            | Self::Extra4
            | Self::Extra5
            | Self::Extra6
            | Self::Extra7
            | Self::Extra8
            | Self::Extra9
            | Self::Extra10 => FieldKind::MultiLineText,
            _ => FieldKind::Text,
        }
    }

    /// Whether values of this field repeat often enough to be worth sharing
    pub fn is_interned(self) -> bool {
        matches!(
            self,
            Self::Category
                | Self::DeviceId
                | Self::DeviceName
                | Self::Event
                | Self::ProcessName
                | Self::SourceName
                | Self::ThreadName
                | Self::UserId
                | Self::UserName
        )
    }
}

impl fmt::Display for LogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
