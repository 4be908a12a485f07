//! Notifier that appends summaries to a text file.

use crate::domain::error::QuadtraderError;
use crate::ports::notifier_port::NotifierPort;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub struct FileNotifier {
    path: PathBuf,
}

impl FileNotifier {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl NotifierPort for FileNotifier {
    fn notify(&self, message: &str) -> Result<(), QuadtraderError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| QuadtraderError::Notification {
                reason: format!("{}: {e}", self.path.display()),
            })?;
        writeln!(file, "{message}").map_err(|e| QuadtraderError::Notification {
            reason: e.to_string(),
        })
    }
}
