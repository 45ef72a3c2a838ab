//! Data sources producing raw text lines

use std::fmt;
use std::io::{self, BufRead};

use futures::future::BoxFuture;
use tokio::sync::watch;

mod file;
mod memory;

pub use file::FileLogDataSource;
pub use memory::MemoryLogDataSource;

/// Lifecycle of a data source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataSourceState {
    Initializing,
    Preparing,
    ReadyToOpenReader,
    OpeningReader,
    ReaderOpened,
    ClosingReader,
    SourceNotFound,
    ExternalDependencyNotFound,
    UnclassifiedError,
    Disposed,
}

impl DataSourceState {
    /// Whether the source cannot produce data until fixed externally
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound | Self::ExternalDependencyNotFound | Self::UnclassifiedError
        )
    }
}

impl fmt::Display for DataSourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a data source was created
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataSourceOptions {
    /// Set when the source reads a file, logs then carry file name and line number
    pub file_name: Option<String>,
}

/// Pull-based reader of text lines
///
/// `read_line` may block. Line terminators are not included.
pub trait LineReader: Send {
    /// Next line, or `None` at the end of the data
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Anything that can open line readers
pub trait LogDataSource: Send + Sync {
    fn state(&self) -> DataSourceState;

    /// Watch state changes
    fn subscribe_state(&self) -> watch::Receiver<DataSourceState>;

    fn options(&self) -> DataSourceOptions;

    /// Open a new reader
    ///
    /// Dropping the returned future abandons the open.
    fn open_reader(&self) -> BoxFuture<'static, io::Result<Box<dyn LineReader>>>;
}

/// [`LineReader`] over any buffered reader
///
/// Invalid UTF-8 is replaced rather than failing the line.
pub struct BufLineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead + Send> BufLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead + Send> LineReader for BufLineReader<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_buf_line_reader() {
        let mut reader = BufLineReader::new(Cursor::new(b"a\r\nb\n\nlast\xff".to_vec()));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("a"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("b"));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(reader.read_line().unwrap().as_deref(), Some("last\u{fffd}"));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_error_states() {
        assert!(DataSourceState::SourceNotFound.is_error());
        assert!(DataSourceState::UnclassifiedError.is_error());
        assert!(!DataSourceState::ReadyToOpenReader.is_error());
        assert!(!DataSourceState::Disposed.is_error());
    }
}
