use std::fmt;

use chrono::{DateTime, Utc};

use super::process::{Process, ProcessStatus, ProcessUpdate};
use crate::error::EngineError;

/// Message recorded by `forceStop` when no reason is supplied.
pub const DEFAULT_STOP_REASON: &str = "Process stopped by administrator";

/// Duration assumed by a speed boost when none is recorded.
pub const DEFAULT_ESTIMATED_DURATION: u32 = 60;

/// A validated speed-boost factor in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedFactor(u8);

impl SpeedFactor {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Values above the range are clamped down; zero and negatives are rejected.
    pub fn new(raw: i64) -> Result<Self, EngineError> {
        if raw < i64::from(Self::MIN) {
            return Err(EngineError::validation(
                "speedFactor",
                format!("must be between {} and {}, got {raw}", Self::MIN, Self::MAX),
            ));
        }
        Ok(Self(raw.min(i64::from(Self::MAX)) as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Result of the speed-boost arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boost {
    pub progress: f64,
    pub estimated_duration: u32,
    pub completes: bool,
}

impl Boost {
    /// progress += factor * 10 (capped at 100); duration -= factor * 5 (floored at 1).
    pub fn compute(factor: SpeedFactor, progress: f64, estimated_duration: Option<u32>) -> Self {
        let factor = u32::from(factor.get());
        let progress = (progress + f64::from(factor * 10)).min(100.0);
        let estimated_duration = estimated_duration
            .unwrap_or(DEFAULT_ESTIMATED_DURATION)
            .saturating_sub(factor * 5)
            .max(1);
        Self {
            progress,
            estimated_duration,
            completes: progress >= 100.0,
        }
    }
}

/// A named operation that moves a process through its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    Stop,
    Fix,
    MarkCompleted,
    ForceStop { reason: Option<String> },
    SpeedBoost(SpeedFactor),
}

impl Action {
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Action::MarkCompleted | Action::ForceStop { .. } | Action::SpeedBoost(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Stop => "stop",
            Action::Fix => "fix",
            Action::MarkCompleted => "markCompleted",
            Action::ForceStop { .. } => "forceStop",
            Action::SpeedBoost(_) => "speedBoost",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The outcome of evaluating an action against the current record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Write these changes in a single store update.
    Apply(ProcessUpdate),
    /// Nothing to change; the record is returned as-is.
    Unchanged,
}

/// Evaluates lifecycle actions. Stateless; the store owns all records.
pub struct Lifecycle;

impl Lifecycle {
    /// Compute the changes `action` makes to `process`, or reject it when its
    /// precondition does not hold.
    ///
    /// - `start` and `stop` are accepted from every state.
    /// - `pause` needs `running`; `resume` needs `paused`.
    /// - `fix` from `error` resumes the run; from any other state it is a `start`.
    /// - `markCompleted` on a completed process is a no-op.
    /// - `forceStop` needs a non-terminal state; `speedBoost` anything but `completed`.
    pub fn plan(
        process: &Process,
        action: &Action,
        now: DateTime<Utc>,
    ) -> Result<Transition, EngineError> {
        let current = process.status;
        let update = match action {
            Action::Start => Self::restart(now),
            Action::Pause => {
                Self::require(action, current, current == ProcessStatus::Running)?;
                Self::enter(process, ProcessStatus::Paused, now)
            }
            Action::Resume => {
                Self::require(action, current, current == ProcessStatus::Paused)?;
                Self::enter(process, ProcessStatus::Running, now)
            }
            Action::Stop => Self::enter(process, ProcessStatus::Stopped, now),
            Action::Fix => match current {
                ProcessStatus::Error => Self::enter(process, ProcessStatus::Running, now),
                _ => Self::restart(now),
            },
            Action::MarkCompleted => {
                if current == ProcessStatus::Completed {
                    return Ok(Transition::Unchanged);
                }
                Self::enter(process, ProcessStatus::Completed, now)
            }
            Action::ForceStop { reason } => {
                Self::require(action, current, !current.is_terminal())?;
                let message = reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(DEFAULT_STOP_REASON)
                    .to_string();
                Self::enter(process, ProcessStatus::Stopped, now).merge(ProcessUpdate {
                    error_message: Some(Some(message)),
                    ..Default::default()
                })
            }
            Action::SpeedBoost(factor) => {
                Self::require(action, current, current != ProcessStatus::Completed)?;
                let boost = Boost::compute(*factor, process.progress, process.estimated_duration);
                let update = ProcessUpdate {
                    progress: Some(boost.progress),
                    estimated_duration: Some(Some(boost.estimated_duration)),
                    ..Default::default()
                };
                if boost.completes {
                    update.merge(Self::enter(process, ProcessStatus::Completed, now))
                } else {
                    update
                }
            }
        };
        Ok(Transition::Apply(update))
    }

    /// Side effects of moving `process` into `next`.
    ///
    /// Shared by actions and admin status edits so the timestamp and
    /// progress invariants hold on every path.
    pub fn enter(process: &Process, next: ProcessStatus, now: DateTime<Utc>) -> ProcessUpdate {
        let mut update = ProcessUpdate {
            status: Some(next),
            ..Default::default()
        };
        match next {
            ProcessStatus::Running => {
                if process.status != ProcessStatus::Running {
                    update.started_at = Some(Some(now));
                    update.completed_at = Some(None);
                    update.actual_duration = Some(None);
                }
                update.error_message = Some(None);
            }
            ProcessStatus::Stopped | ProcessStatus::Completed => {
                update.completed_at = Some(Some(now));
                update.actual_duration = Some(process.started_at.map(|started| {
                    u32::try_from((now - started).num_minutes().max(0)).unwrap_or(u32::MAX)
                }));
                if next == ProcessStatus::Completed {
                    update.progress = Some(100.0);
                }
            }
            ProcessStatus::Paused | ProcessStatus::Error => {
                update.completed_at = Some(None);
            }
        }
        update
    }

    // A fresh run: progress and history are discarded.
    fn restart(now: DateTime<Utc>) -> ProcessUpdate {
        ProcessUpdate {
            status: Some(ProcessStatus::Running),
            progress: Some(0.0),
            started_at: Some(Some(now)),
            completed_at: Some(None),
            actual_duration: Some(None),
            error_message: Some(None),
            ..Default::default()
        }
    }

    fn require(action: &Action, status: ProcessStatus, allowed: bool) -> Result<(), EngineError> {
        if allowed {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                action: action.name(),
                status,
            })
        }
    }
}
