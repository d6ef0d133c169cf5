//! # COM output file monitor.
//!
//! Test guests report over an emulated serial port whose raw output lands in a
//! host file. [`ComFileMonitor`] is a polling task: every poll reads what was
//! appended since the last complete line, logs completed new lines, and signals
//! with the first stop word found (`PASSED`/`FAILED` by default, matched on word
//! boundaries).
//!
//! The task has no thread of its own. It is driven by the waiter's wait loop,
//! which polls every registered task on each tick. The read is a blocking file
//! read made with the waiter's membership lock held, so it stays limited to the
//! unseen tail of the file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use regex::Regex;

use super::{Task, TaskCore, TaskResult, TaskState};
use crate::error::HarnessError;

/// Default stop words.
pub const DEFAULT_STOP_WORDS: [&str; 2] = ["PASSED", "FAILED"];

/// Polling task that watches a raw COM output file for stop words.
pub struct ComFileMonitor {
    core: TaskCore,
    path: PathBuf,
    stop: Regex,
    /// Bytes already fed to the log; only touched with the task lock held.
    displayed: Mutex<usize>,
}

impl ComFileMonitor {
    /// Creates a monitor for `path`; `stop_words = None` uses [`DEFAULT_STOP_WORDS`].
    pub fn new(path: impl Into<PathBuf>, stop_words: Option<&[&str]>) -> Result<Self, HarnessError> {
        let words = stop_words.unwrap_or(&DEFAULT_STOP_WORDS);
        let alternation = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        let stop = Regex::new(&format!(r"\b({alternation})\b"))?;
        let path = path.into();

        Ok(Self {
            core: TaskCore::new(format!("com-monitor:{}", path.display())),
            path,
            stop,
            displayed: Mutex::new(0),
        })
    }

    /// The monitored file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stop word that ended the monitoring, if any.
    pub fn stop_word(&self) -> Option<String> {
        self.result()
            .and_then(|r| r.as_text().map(str::to_string))
    }

    /// Bytes after offset `from`; empty while the file is missing or shorter.
    fn read_from(&self, from: usize) -> Vec<u8> {
        let mut tail = Vec::new();
        let Ok(mut file) = File::open(&self.path) else {
            return tail;
        };
        if file.seek(SeekFrom::Start(from as u64)).is_ok() {
            let _ = file.read_to_end(&mut tail);
        }
        tail
    }
}

impl Task for ComFileMonitor {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn poll_locked(&self, state: &mut TaskState) -> bool {
        if state.is_signalled() {
            return true;
        }

        let mut displayed = self.displayed.lock();
        let tail = self.read_from(*displayed);
        if tail.is_empty() {
            return false;
        }

        let text = String::from_utf8_lossy(&tail);
        if let Some(caps) = self.stop.captures(&text) {
            for line in text.lines() {
                tracing::info!(file = %self.path.display(), "COM OUTPUT: {line}");
            }
            *displayed += tail.len();
            state.signal(TaskResult::Text(caps[1].to_string()));
            return true;
        }

        // Complete lines only; a partial line waits for its newline.
        let mut rest = tail.as_slice();
        while let Some(off) = rest.iter().position(|b| *b == b'\n') {
            tracing::info!(
                file = %self.path.display(),
                "COM OUTPUT: {}",
                String::from_utf8_lossy(&rest[..off])
            );
            *displayed += off + 1;
            rest = &rest[off + 1..];
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_signals_on_stop_word() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mon = ComFileMonitor::new(file.path(), None).unwrap();
        assert!(!mon.poll());

        write!(file, "booting\ntest 1 ").unwrap();
        file.flush().unwrap();
        assert!(!mon.poll());
        assert_eq!(*mon.displayed.lock(), "booting\n".len());

        write!(file, "PASSED\n").unwrap();
        file.flush().unwrap();
        assert!(mon.poll());
        assert_eq!(mon.stop_word().as_deref(), Some("PASSED"));
    }

    #[test]
    fn test_reads_only_the_unseen_tail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mon = ComFileMonitor::new(file.path(), None).unwrap();

        write!(file, "line one\nline two\npart").unwrap();
        file.flush().unwrap();
        assert!(!mon.poll());

        let from = *mon.displayed.lock();
        assert_eq!(from, "line one\nline two\n".len());
        assert_eq!(mon.read_from(from), b"part".to_vec());

        write!(file, "ial FAILED\n").unwrap();
        file.flush().unwrap();
        assert!(mon.poll());
        assert_eq!(mon.stop_word().as_deref(), Some("FAILED"));
        assert_eq!(mon.read_from(*mon.displayed.lock()), Vec::<u8>::new());
    }

    #[test]
    fn test_stop_word_needs_word_boundary() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mon = ComFileMonitor::new(file.path(), Some(&["DONE"])).unwrap();
        writeln!(file, "UNDONEX").unwrap();
        file.flush().unwrap();
        assert!(!mon.poll());
        writeln!(file, "all DONE").unwrap();
        file.flush().unwrap();
        assert!(mon.poll());
        assert_eq!(mon.stop_word().as_deref(), Some("DONE"));
    }

    #[test]
    fn test_missing_file_stays_pending_and_cancel_signals() {
        let mon = ComFileMonitor::new("/nonexistent/com.raw", None).unwrap();
        assert!(!mon.poll());
        assert!(mon.cancel());
        assert!(mon.poll());
        assert_eq!(mon.stop_word(), None);
        assert_eq!(mon.result(), Some(TaskResult::Canceled));
    }
}
