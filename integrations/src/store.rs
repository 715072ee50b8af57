//! Persistence for registered integrations, so they survive a restart.

use crate::config::IntegrationConfig;
use crate::errors::StoreError;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Vec<IntegrationConfig>, StoreError>;
    fn store(&self, integrations: &[IntegrationConfig]) -> Result<(), StoreError>;
}

/// Keeps integrations in memory only. Used when no store path is configured.
#[derive(Default)]
pub struct MemoryStore {
    integrations: Mutex<Vec<IntegrationConfig>>,
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Vec<IntegrationConfig>, StoreError> {
        Ok(self.integrations.lock().clone())
    }

    fn store(&self, integrations: &[IntegrationConfig]) -> Result<(), StoreError> {
        *self.integrations.lock() = integrations.to_vec();
        Ok(())
    }
}

/// Stores integrations as a YAML list in a single file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileStore {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigStore for FileStore {
    fn load(&self) -> Result<Vec<IntegrationConfig>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            // Nothing stored yet
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }

    fn store(&self, integrations: &[IntegrationConfig]) -> Result<(), StoreError> {
        // Write to a sibling file first so readers never see a partial file.
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_yaml::to_writer(&mut writer, integrations)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = ?self.path, count = integrations.len(), "stored integrations");
        Ok(())
    }
}
