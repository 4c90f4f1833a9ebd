use std::sync::RwLock;

use chrono::Utc;
use tracing::debug;

use super::{ProcessStore, newest_first};
use crate::error::StoreError;
use crate::state_machine::{NewProcess, Process, ProcessUpdate};

/// Process records held in memory behind a lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Process>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessStore for MemoryStore {
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
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.push(process.clone());
        debug!(process_id = %process.id, "stored new process");
        Ok(process)
    }

    fn update(&self, id: &str, changes: ProcessUpdate) -> Result<Option<Process>, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(records.iter_mut().find(|p| p.id == id).map(|process| {
            changes.apply_to(process, Utc::now());
            process.clone()
        }))
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let before = records.len();
        records.retain(|p| p.id != id);
        Ok(records.len() < before)
    }
}
