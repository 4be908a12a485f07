//! JSON file state store.
//!
//! Saves go to a sibling `*.tmp` file that is synced and then renamed over
//! the target, so readers only ever see a complete snapshot.

use crate::domain::error::QuadtraderError;
use crate::domain::live::EngineSnapshot;
use crate::ports::state_store_port::StateStorePort;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStorePort for JsonStateStore {
    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), QuadtraderError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
            writer
                .into_inner()
                .map_err(|e| QuadtraderError::Persistence {
                    reason: e.to_string(),
                })?
                .sync_all()?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| QuadtraderError::Persistence {
            reason: format!("failed to replace {}: {e}", self.path.display()),
        })?;

        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<EngineSnapshot>, QuadtraderError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&content).map_err(|e| QuadtraderError::Persistence {
            reason: format!("corrupt state file {}: {e}", self.path.display()),
        })?;
        Ok(Some(snapshot))
    }
}
