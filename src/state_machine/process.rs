use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// The five lifecycle states of a process. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Stopped,
    Running,
    Paused,
    Error,
    Completed,
}

impl ProcessStatus {
    pub const ALL: [ProcessStatus; 5] = [
        ProcessStatus::Stopped,
        ProcessStatus::Running,
        ProcessStatus::Paused,
        ProcessStatus::Error,
        ProcessStatus::Completed,
    ];

    /// `stopped` and `completed` end a run and stamp `completedAt`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Stopped | ProcessStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Running => "running",
            ProcessStatus::Paused => "paused",
            ProcessStatus::Error => "error",
            ProcessStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::validation("status", format!("unknown status '{s}'")))
    }
}

/// Kind of waste a process handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    Organic,
    Plastic,
    Metal,
    Glass,
    Paper,
    Electronic,
}

impl ProcessType {
    pub const ALL: [ProcessType; 6] = [
        ProcessType::Organic,
        ProcessType::Plastic,
        ProcessType::Metal,
        ProcessType::Glass,
        ProcessType::Paper,
        ProcessType::Electronic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessType::Organic => "organic",
            ProcessType::Plastic => "plastic",
            ProcessType::Metal => "metal",
            ProcessType::Glass => "glass",
            ProcessType::Paper => "paper",
            ProcessType::Electronic => "electronic",
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                EngineError::validation("processType", format!("unknown process type '{s}'"))
            })
    }
}

/// A tracked unit of waste-handling work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub id: String,
    pub name: String,
    pub description: String,
    pub process_type: ProcessType,
    pub status: ProcessStatus,
    pub progress: f64,
    pub estimated_duration: Option<u32>,
    pub actual_duration: Option<u32>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Process {
    /// Builds a fresh record: `stopped`, zero progress, new id.
    pub fn create(fields: NewProcess, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: fields.name.trim().to_string(),
            description: fields.description.trim().to_string(),
            process_type: fields.process_type,
            status: ProcessStatus::Stopped,
            progress: 0.0,
            estimated_duration: fields.estimated_duration,
            actual_duration: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields accepted when creating a process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewProcess {
    pub name: String,
    pub description: String,
    pub process_type: ProcessType,
    #[serde(default)]
    pub estimated_duration: Option<u32>,
}

impl NewProcess {
    pub fn validate(&self) -> Result<(), EngineError> {
        require_text("name", &self.name)?;
        require_text("description", &self.description)?;
        if let Some(minutes) = self.estimated_duration {
            require_duration(minutes)?;
        }
        Ok(())
    }
}

/// A named field of a caller-supplied update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Description,
    ProcessType,
    Status,
    Progress,
    ErrorMessage,
    EstimatedDuration,
}

impl Field {
    /// Wire name of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Description => "description",
            Field::ProcessType => "processType",
            Field::Status => "status",
            Field::Progress => "progress",
            Field::ErrorMessage => "errorMessage",
            Field::EstimatedDuration => "estimatedDuration",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial update request as sent by a caller.
///
/// Every field except the plain text ones uses a nested `Option`: absent
/// means "leave alone" and `Some(None)` is an explicit `null`, which clears
/// nullable fields and is rejected for `status` and `progress`. A key sent
/// as `null` still counts as present for the admin check.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcessPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub process_type: Option<ProcessType>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub status: Option<Option<ProcessStatus>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub progress: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub error_message: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub estimated_duration: Option<Option<u32>>,
}

impl ProcessPatch {
    /// The set of fields present in the request.
    pub fn fields(&self) -> Vec<Field> {
        let present = [
            (Field::Name, self.name.is_some()),
            (Field::Description, self.description.is_some()),
            (Field::ProcessType, self.process_type.is_some()),
            (Field::Status, self.status.is_some()),
            (Field::Progress, self.progress.is_some()),
            (Field::ErrorMessage, self.error_message.is_some()),
            (Field::EstimatedDuration, self.estimated_duration.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(field, set)| set.then_some(field))
            .collect()
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        if self.status == Some(None) {
            return Err(EngineError::validation("status", "must not be null"));
        }
        if self.progress == Some(None) {
            return Err(EngineError::validation("progress", "must not be null"));
        }
        if let Some(Some(progress)) = self.progress
            && !progress.is_finite()
        {
            return Err(EngineError::validation("progress", "must be a finite number"));
        }
        if let Some(Some(minutes)) = self.estimated_duration {
            require_duration(minutes)?;
        }
        Ok(())
    }
}

// Distinguishes an explicit `null` from an absent key.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

fn require_text(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn require_duration(minutes: u32) -> Result<(), EngineError> {
    if minutes == 0 {
        return Err(EngineError::validation(
            "estimatedDuration",
            "must be at least 1 minute",
        ));
    }
    Ok(())
}

/// Store-level change set merged over an existing record.
///
/// Built by the engine; never deserialized from callers, so it can carry
/// the lifecycle-only timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub process_type: Option<ProcessType>,
    pub status: Option<ProcessStatus>,
    pub progress: Option<f64>,
    pub estimated_duration: Option<Option<u32>>,
    pub actual_duration: Option<Option<u32>>,
    pub error_message: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl ProcessUpdate {
    /// Overlays `other` on top of `self`; fields set in `other` win.
    pub fn merge(mut self, other: ProcessUpdate) -> Self {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        overlay!(
            name,
            description,
            process_type,
            status,
            progress,
            estimated_duration,
            actual_duration,
            error_message,
            started_at,
            completed_at
        );
        self
    }

    /// Writes the supplied fields into `process` and refreshes `updatedAt`.
    pub fn apply_to(self, process: &mut Process, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            process.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            process.description = description.trim().to_string();
        }
        if let Some(process_type) = self.process_type {
            process.process_type = process_type;
        }
        if let Some(status) = self.status {
            process.status = status;
        }
        if let Some(progress) = self.progress {
            process.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(estimated_duration) = self.estimated_duration {
            process.estimated_duration = estimated_duration;
        }
        if let Some(actual_duration) = self.actual_duration {
            process.actual_duration = actual_duration;
        }
        if let Some(error_message) = self.error_message {
            process.error_message = error_message;
        }
        if let Some(started_at) = self.started_at {
            process.started_at = started_at;
        }
        if let Some(completed_at) = self.completed_at {
            process.completed_at = completed_at;
        }
        process.updated_at = now;
    }
}
