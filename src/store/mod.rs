//! Durable CRUD for process records.
//!
//! [`ProcessStore`] is the only persistence contract the engine relies on.
//! Two backends ship with the crate: [`MemoryStore`] for tests and
//! ephemeral servers, [`FileStore`] for a JSON file on disk.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::state_machine::{NewProcess, Process, ProcessUpdate};

/// Single-record CRUD. Each call is atomic on its own; there are no
/// cross-record transactions and concurrent writes to one record are
/// last-write-wins.
pub trait ProcessStore: Send + Sync {
    /// Every record, newest `createdAt` first.
    fn get_all(&self) -> Result<Vec<Process>, StoreError>;

    /// `Ok(None)` is a normal "not found".
    fn get(&self, id: &str) -> Result<Option<Process>, StoreError>;

    /// Assigns `id`, `createdAt` and `updatedAt`. Input is validated upstream.
    fn create(&self, fields: NewProcess) -> Result<Process, StoreError>;

    /// Merges `changes` over the record and refreshes `updatedAt`.
    fn update(&self, id: &str, changes: ProcessUpdate) -> Result<Option<Process>, StoreError>;

    /// Whether a record was actually removed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

// Records are kept in insertion order; ties on `createdAt` resolve to the
// later insert.
fn newest_first(records: &[Process]) -> Vec<Process> {
    let mut sorted: Vec<Process> = records.iter().rev().cloned().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
}
