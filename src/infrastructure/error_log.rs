use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

/// Sink for stream-read failures. Implementations must tolerate concurrent
/// callers; records are line-oriented path/offset pairs.
pub trait FailureLog: Send + Sync {
    fn record(&self, path: &Path, start_frame: usize);
}

/// Appends one `path<TAB>offset` line per failure to a shared file. The
/// file handle is opened in append mode and serialized behind a mutex so
/// parallel data-loading callers interleave whole lines.
pub struct FileFailureLog {
    file: Mutex<File>,
}

impl FileFailureLog {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(FileFailureLog {
            file: Mutex::new(file),
        })
    }
}

impl FailureLog for FileFailureLog {
    fn record(&self, path: &Path, start_frame: usize) {
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(file, "{}\t{}", path.display(), start_frame) {
            warn!(error = %err, "failed to append to the failure log");
        }
    }
}

/// In-memory sink for tests.
#[cfg(test)]
pub struct MemoryFailureLog {
    records: Mutex<Vec<(std::path::PathBuf, usize)>>,
}

#[cfg(test)]
impl MemoryFailureLog {
    pub fn new() -> Self {
        MemoryFailureLog {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<(std::path::PathBuf, usize)> {
        self.records.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl FailureLog for MemoryFailureLog {
    fn record(&self, path: &Path, start_frame: usize) {
        self.records
            .lock()
            .unwrap()
            .push((path.to_path_buf(), start_frame));
    }
}
