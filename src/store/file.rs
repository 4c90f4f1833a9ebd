use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use tracing::{debug, info};

use super::{ProcessStore, newest_first};
use crate::error::StoreError;
use crate::state_machine::{NewProcess, Process, ProcessUpdate};

/// Process records persisted as a JSON array in a single file.
///
/// Every mutation rewrites the whole file through a temporary sibling and
/// a rename, so a failed write leaves both the file and the in-memory copy
/// as they were.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: RwLock<Vec<Process>>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str::<Vec<Process>>(&contents)?
            }
        } else {
            Vec::new()
        };
        info!(path = %path.display(), records = records.len(), "opened process store");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    fn persist(&self, records: &[Process]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), records = records.len(), "persisted process store");
        Ok(())
    }

    // Applies `mutate` to a copy, persists it, then swaps it in.
    fn write_with<T>(
        &self,
        mutate: impl FnOnce(&mut Vec<Process>) -> Option<T>,
    ) -> Result<Option<T>, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = records.clone();
        let result = mutate(&mut next);
        if result.is_some() {
            self.persist(&next)?;
            *records = next;
        }
        Ok(result)
    }
}

impl ProcessStore for FileStore {
    fn get_all(&self) -> Result<Vec<Process>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(newest_first(&records))
    }

    fn get(&self, id: &str) -> Result<Option<Process>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.iter().find(|p| p.id == id).cloned())
    }

    fn create(&self, fields: NewProcess) -> Result<Process, StoreError> {
        let process = Process::create(fields, Utc::now());
        let stored = process.clone();
        self.write_with(move |records| {
            records.push(stored);
            Some(())
        })?;
        Ok(process)
    }

    fn update(&self, id: &str, changes: ProcessUpdate) -> Result<Option<Process>, StoreError> {
        self.write_with(|records| {
            records.iter_mut().find(|p| p.id == id).map(|process| {
                changes.apply_to(process, Utc::now());
                process.clone()
            })
        })
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.write_with(|records| {
            let position = records.iter().position(|p| p.id == id)?;
            Some(records.remove(position))
        })?;
        Ok(removed.is_some())
    }
}
