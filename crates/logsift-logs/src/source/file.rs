use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::debug;

use super::{BufLineReader, DataSourceOptions, DataSourceState, LineReader, LogDataSource};

/// Reads lines from a file on disk
///
/// Every reader opened starts at the beginning of the file, unless the
/// source follows the file, in which case a reader resumes after the last
/// complete line read by the previous one.
pub struct FileLogDataSource {
    path: PathBuf,
    state: watch::Sender<DataSourceState>,
    /// Byte offset after the last complete line, when following
    resume: Option<Arc<AtomicU64>>,
}

impl FileLogDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = if path.is_file() {
            DataSourceState::ReadyToOpenReader
        } else {
            DataSourceState::SourceNotFound
        };
        let (state, _) = watch::channel(initial);
        Self {
            path,
            state,
            resume: None,
        }
    }

    /// Resume each reader where the previous one stopped
    pub fn follow(mut self) -> Self {
        self.resume = Some(Arc::new(AtomicU64::new(0)));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file again, leaving the error state once it exists
    pub fn refresh(&self) {
        let next = if self.path.is_file() {
            DataSourceState::ReadyToOpenReader
        } else {
            DataSourceState::SourceNotFound
        };
        self.state.send_if_modified(|state| {
            let changed = *state != next;
            *state = next;
            changed
        });
    }
}

impl LogDataSource for FileLogDataSource {
    fn state(&self) -> DataSourceState {
        *self.state.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<DataSourceState> {
        self.state.subscribe()
    }

    fn options(&self) -> DataSourceOptions {
        DataSourceOptions {
            file_name: Some(self.path.display().to_string()),
        }
    }

    fn open_reader(&self) -> BoxFuture<'static, io::Result<Box<dyn LineReader>>> {
        let path = self.path.clone();
        let state = self.state.clone();
        let resume = self.resume.clone();
        Box::pin(async move {
            debug!(path = %path.display(), "opening file");
            let opened = tokio::task::spawn_blocking(move || open_file(&path, resume))
                .await
                .map_err(io::Error::other)?;
            match opened {
                Ok(reader) => Ok(reader),
                Err(e) => {
                    if e.kind() == io::ErrorKind::NotFound {
                        state.send_replace(DataSourceState::SourceNotFound);
                    }
                    Err(e)
                }
            }
        })
    }
}

fn open_file(path: &Path, resume: Option<Arc<AtomicU64>>) -> io::Result<Box<dyn LineReader>> {
    let mut file = File::open(path)?;
    let Some(offset) = resume else {
        return Ok(Box::new(BufLineReader::new(BufReader::new(file))));
    };
    let len = file.metadata()?.len();
    let mut start = offset.load(Ordering::Acquire);
    if start > len {
        debug!(path = %path.display(), "file truncated, reading from the beginning");
        start = 0;
        offset.store(0, Ordering::Release);
    }
    file.seek(SeekFrom::Start(start))?;
    Ok(Box::new(FollowingLineReader {
        inner: BufReader::new(file),
        buf: Vec::new(),
        offset,
    }))
}

/// Reader that records how far it got and leaves partial lines unread
struct FollowingLineReader {
    inner: BufReader<File>,
    buf: Vec<u8>,
    offset: Arc<AtomicU64>,
}

impl LineReader for FollowingLineReader {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let read = self.inner.read_until(b'\n', &mut self.buf)?;
        // a line still being written is picked up by the next reader
        if read == 0 || self.buf.last() != Some(&b'\n') {
            return Ok(None);
        }
        self.offset.fetch_add(read as u64, Ordering::AcqRel);
        self.buf.pop();
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}
