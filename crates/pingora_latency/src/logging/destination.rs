use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::error::SinkError;

/// Somewhere finished log lines are appended to.
///
/// Each call writes exactly one newline-terminated line with a single write,
/// so concurrent callers never produce merged lines.
pub trait Destination: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), SinkError>;
}

/// Append-only log file, opened on first write.
///
/// Missing parent directories are created at that point. A file that was
/// never written to is never created.
pub struct FileDestination {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileDestination {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<File, SinkError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                path: self.path.clone(),
                source,
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Open {
                path: self.path.clone(),
                source,
            })
    }
}

impl Destination for FileDestination {
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        let buf = format!("{line}\n");
        let result = match guard.as_mut() {
            Some(file) => file.write_all(buf.as_bytes()).and_then(|_| file.flush()),
            None => Ok(()),
        };
        if let Err(source) = result {
            // reopen on the next line in case the file was rotated away
            *guard = None;
            return Err(SinkError::Write {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDestination")
            .field("path", &self.path)
            .finish()
    }
}

/// Console output, stdout unless another writer is supplied.
pub struct ConsoleDestination {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleDestination {
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }
}

impl Destination for ConsoleDestination {
    fn write_line(&self, line: &str) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let buf = format!("{line}\n");
        out.write_all(buf.as_bytes())
            .and_then(|_| out.flush())
            .map_err(SinkError::Console)
    }
}

impl Default for ConsoleDestination {
    fn default() -> Self {
        Self::stdout()
    }
}
