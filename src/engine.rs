//! Lifecycle & authorization engine.
//!
//! [`ProcessEngine`] is stateless between calls: every operation reads the
//! current record (when a precondition needs it), decides, and writes back
//! through a single [`ProcessStore::update`]. Authorization and validation
//! run before any write, so a rejected request never partially applies.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{self, Caller};
use crate::error::EngineError;
use crate::state_machine::{
    Action, Lifecycle, NewProcess, Process, ProcessPatch, ProcessStatus, ProcessUpdate,
    SpeedFactor, Transition,
};
use crate::store::ProcessStore;

/// Listing filter used by dashboards: free-text search plus status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessFilter {
    /// Case-insensitive substring of name, description or process type.
    pub search: Option<String>,
    /// `None` means all statuses.
    pub status: Option<ProcessStatus>,
}

impl ProcessFilter {
    pub fn matches(&self, process: &Process) -> bool {
        let matches_status = self.status.is_none_or(|status| process.status == status);
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                process.name.to_lowercase().contains(&term)
                    || process.description.to_lowercase().contains(&term)
                    || process.process_type.as_str().contains(&term)
            }
        };
        matches_status && matches_search
    }
}

/// Aggregate figures over every process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub errors: usize,
    /// Stopped and completed together.
    pub stopped: usize,
    pub completed: usize,
    pub average_progress: f64,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

impl ProcessStats {
    pub fn from_processes(processes: &[Process]) -> Self {
        let count = |status: ProcessStatus| processes.iter().filter(|p| p.status == status).count();

        let mut by_status = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        for process in processes {
            *by_status.entry(process.status.to_string()).or_insert(0) += 1;
            *by_type.entry(process.process_type.to_string()).or_insert(0) += 1;
        }

        let average_progress = if processes.is_empty() {
            0.0
        } else {
            processes.iter().map(|p| p.progress).sum::<f64>() / processes.len() as f64
        };

        Self {
            total: processes.len(),
            running: count(ProcessStatus::Running),
            paused: count(ProcessStatus::Paused),
            errors: count(ProcessStatus::Error),
            stopped: count(ProcessStatus::Stopped) + count(ProcessStatus::Completed),
            completed: count(ProcessStatus::Completed),
            average_progress,
            by_status,
            by_type,
        }
    }
}

/// Applies role rules and lifecycle transitions on top of a [`ProcessStore`].
#[derive(Clone)]
pub struct ProcessEngine {
    store: Arc<dyn ProcessStore>,
}

impl ProcessEngine {
    pub fn new(store: Arc<dyn ProcessStore>) -> Self {
        Self { store }
    }

    pub fn list(&self, filter: &ProcessFilter) -> Result<Vec<Process>, EngineError> {
        let processes = self.store.get_all()?;
        Ok(processes.into_iter().filter(|p| filter.matches(p)).collect())
    }

    pub fn get(&self, id: &str) -> Result<Process, EngineError> {
        self.store
            .get(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub fn stats(&self) -> Result<ProcessStats, EngineError> {
        Ok(ProcessStats::from_processes(&self.store.get_all()?))
    }

    pub fn create(&self, caller: &Caller, fields: NewProcess) -> Result<Process, EngineError> {
        fields.validate()?;
        let process = self.store.create(fields)?;
        info!(
            process_id = %process.id,
            caller = %caller.id,
            process_type = %process.process_type,
            "created process"
        );
        Ok(process)
    }

    /// Applies a caller's partial update. Non-admins naming any admin-only
    /// field are rejected before the store is read.
    pub fn update(
        &self,
        caller: &Caller,
        id: &str,
        patch: ProcessPatch,
    ) -> Result<Process, EngineError> {
        let fields = patch.fields();
        if let Err(err) = auth::check_fields(caller, &fields).into_result() {
            warn!(process_id = %id, caller = %caller.id, error = %err, "update denied");
            return Err(err);
        }
        if fields.is_empty() {
            return Err(EngineError::validation("body", "no fields to update"));
        }
        patch.validate()?;

        let current = self.get(id)?;
        let now = Utc::now();

        let mut update = ProcessUpdate {
            name: patch.name,
            description: patch.description,
            process_type: patch.process_type,
            progress: patch.progress.flatten().map(|p| p.clamp(0.0, 100.0)),
            estimated_duration: patch.estimated_duration,
            error_message: patch.error_message,
            ..Default::default()
        };
        if let Some(Some(next)) = patch.status
            && next != current.status
        {
            update = update.merge(Lifecycle::enter(&current, next, now));
        }
        if update.status.unwrap_or(current.status) == ProcessStatus::Completed {
            update.progress = Some(100.0);
        }

        let process = self.write(id, update)?;
        let names: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
        info!(process_id = %id, caller = %caller.id, fields = ?names, "updated process");
        Ok(process)
    }

    pub fn delete(&self, caller: &Caller, id: &str) -> Result<bool, EngineError> {
        let removed = self.store.delete(id)?;
        if removed {
            info!(process_id = %id, caller = %caller.id, "deleted process");
        } else {
            debug!(process_id = %id, "delete found nothing");
        }
        Ok(removed)
    }

    /// Runs a lifecycle action against one process.
    pub fn perform(
        &self,
        caller: &Caller,
        id: &str,
        action: Action,
    ) -> Result<Process, EngineError> {
        if let Err(err) = auth::check_action(caller, &action).into_result() {
            warn!(process_id = %id, caller = %caller.id, action = %action, "action denied");
            return Err(err);
        }

        let current = self.get(id)?;
        let from = current.status;
        match Lifecycle::plan(&current, &action, Utc::now())? {
            Transition::Unchanged => {
                debug!(process_id = %id, action = %action, "action left process unchanged");
                Ok(current)
            }
            Transition::Apply(update) => {
                let process = self.write(id, update)?;
                info!(
                    process_id = %id,
                    caller = %caller.id,
                    action = %action,
                    from = %from,
                    to = %process.status,
                    progress = process.progress,
                    "applied lifecycle action"
                );
                Ok(process)
            }
        }
    }

    pub fn start(&self, caller: &Caller, id: &str) -> Result<Process, EngineError> {
        self.perform(caller, id, Action::Start)
    }

    pub fn pause(&self, caller: &Caller, id: &str) -> Result<Process, EngineError> {
        self.perform(caller, id, Action::Pause)
    }

    pub fn resume(&self, caller: &Caller, id: &str) -> Result<Process, EngineError> {
        self.perform(caller, id, Action::Resume)
    }

    pub fn stop(&self, caller: &Caller, id: &str) -> Result<Process, EngineError> {
        self.perform(caller, id, Action::Stop)
    }

    pub fn fix(&self, caller: &Caller, id: &str) -> Result<Process, EngineError> {
        self.perform(caller, id, Action::Fix)
    }

    pub fn mark_completed(&self, caller: &Caller, id: &str) -> Result<Process, EngineError> {
        self.perform(caller, id, Action::MarkCompleted)
    }

    pub fn force_stop(
        &self,
        caller: &Caller,
        id: &str,
        reason: Option<String>,
    ) -> Result<Process, EngineError> {
        self.perform(caller, id, Action::ForceStop { reason })
    }

    /// `speed_factor` outside `1..=5` is clamped from above and rejected below.
    pub fn speed_boost(
        &self,
        caller: &Caller,
        id: &str,
        speed_factor: i64,
    ) -> Result<Process, EngineError> {
        auth::require_admin(caller, "speedBoost").into_result()?;
        let factor = SpeedFactor::new(speed_factor)?;
        self.perform(caller, id, Action::SpeedBoost(factor))
    }

    // A record that vanishes between read and write is reported as not found.
    fn write(&self, id: &str, update: ProcessUpdate) -> Result<Process, EngineError> {
        self.store
            .update(id, update)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::state_machine::ProcessType;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    fn engine() -> (ProcessEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ProcessEngine::new(store.clone()), store)
    }

    fn compost() -> NewProcess {
        NewProcess {
            name: "Compost A".into(),
            description: "Garden waste".into(),
            process_type: ProcessType::Organic,
            estimated_duration: Some(60),
        }
    }

    fn patch(json: &str) -> ProcessPatch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn compost_scenario_runs_to_completion() {
        let (engine, _) = engine();
        let user = Caller::user("operator");
        let admin = Caller::admin("supervisor");

        let process = engine.create(&user, compost()).unwrap();
        assert_eq!(process.status, ProcessStatus::Stopped);
        assert_eq!(process.progress, 0.0);

        let before = Utc::now();
        let process = engine.start(&user, &process.id).unwrap();
        assert_eq!(process.status, ProcessStatus::Running);
        assert_eq!(process.progress, 0.0);
        assert!(process.started_at.unwrap() >= before);

        let process = engine.speed_boost(&admin, &process.id, 3).unwrap();
        assert_eq!(process.progress, 30.0);
        assert_eq!(process.estimated_duration, Some(45));
        assert_eq!(process.status, ProcessStatus::Running);

        let mut process = process;
        let mut rounds = 0;
        while process.progress < 100.0 {
            process = engine.speed_boost(&admin, &process.id, 8).unwrap();
            rounds += 1;
        }
        assert_eq!(rounds, 2);
        assert_eq!(process.status, ProcessStatus::Completed);
        assert_eq!(process.progress, 100.0);
        assert_eq!(process.estimated_duration, Some(1));
        assert!(process.completed_at.is_some());
    }

    #[test]
    fn non_admin_status_patch_is_forbidden_and_store_untouched() {
        let (engine, store) = engine();
        let user = Caller::user("operator");
        let process = engine.create(&user, compost()).unwrap();

        let err = engine
            .update(&user, &process.id, patch(r#"{"status":"completed","name":"x"}"#))
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { .. }));
        assert_eq!(store.get(&process.id).unwrap().unwrap(), process);

        let renamed = engine
            .update(&user, &process.id, patch(r#"{"name":"New name"}"#))
            .unwrap();
        assert_eq!(renamed.name, "New name");
        assert_eq!(renamed.status, ProcessStatus::Stopped);
    }

    #[test]
    fn forbidden_is_reported_before_not_found() {
        let (engine, _) = engine();
        let err = engine
            .update(&Caller::user("u"), "missing", patch(r#"{"progress":5}"#))
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { .. }));
    }

    #[test]
    fn force_stop_scenario() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let process = engine.create(&admin, compost()).unwrap();
        engine.start(&admin, &process.id).unwrap();

        let stopped = engine
            .force_stop(&admin, &process.id, Some("sensor fault".into()))
            .unwrap();
        assert_eq!(stopped.status, ProcessStatus::Stopped);
        assert_eq!(stopped.error_message.as_deref(), Some("sensor fault"));
        assert!(stopped.completed_at.is_some());
    }

    #[test]
    fn user_cannot_run_admin_actions() {
        let (engine, store) = engine();
        let user = Caller::user("operator");
        let process = engine.create(&user, compost()).unwrap();
        engine.start(&user, &process.id).unwrap();
        let snapshot = store.get(&process.id).unwrap().unwrap();

        assert!(matches!(
            engine.mark_completed(&user, &process.id),
            Err(EngineError::Forbidden { .. })
        ));
        assert!(matches!(
            engine.force_stop(&user, &process.id, None),
            Err(EngineError::Forbidden { .. })
        ));
        assert!(matches!(
            engine.speed_boost(&user, &process.id, 99),
            Err(EngineError::Forbidden { .. })
        ));
        assert_eq!(store.get(&process.id).unwrap().unwrap(), snapshot);
    }

    #[test]
    fn speed_boost_validates_factor() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let process = engine.create(&admin, compost()).unwrap();
        let err = engine.speed_boost(&admin, &process.id, 0).unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "speedFactor"));
    }

    #[test]
    fn actions_on_unknown_id_are_not_found() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        assert!(matches!(engine.start(&admin, "nope"), Err(EngineError::NotFound(_))));
        assert!(matches!(
            engine.mark_completed(&admin, "nope"),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(engine.get("nope"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn mark_completed_twice() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let process = engine.create(&admin, compost()).unwrap();

        for _ in 0..2 {
            let done = engine.mark_completed(&admin, &process.id).unwrap();
            assert_eq!(done.status, ProcessStatus::Completed);
            assert_eq!(done.progress, 100.0);
        }
    }

    #[test]
    fn admin_status_patch_applies_lifecycle_effects() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let process = engine.create(&admin, compost()).unwrap();

        let running = engine
            .update(&admin, &process.id, patch(r#"{"status":"running","progress":20}"#))
            .unwrap();
        assert!(running.started_at.is_some());
        assert_eq!(running.progress, 20.0);

        let completed = engine
            .update(&admin, &process.id, patch(r#"{"status":"completed","progress":40}"#))
            .unwrap();
        assert_eq!(completed.progress, 100.0);
        assert!(completed.completed_at.is_some());

        let clamped = engine
            .update(&admin, &process.id, patch(r#"{"status":"error","progress":140}"#))
            .unwrap();
        assert_eq!(clamped.progress, 100.0);
        assert!(clamped.completed_at.is_none());
    }

    #[test]
    fn admin_can_set_and_clear_error_message() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let process = engine.create(&admin, compost()).unwrap();

        let errored = engine
            .update(
                &admin,
                &process.id,
                patch(r#"{"status":"error","errorMessage":"overheated"}"#),
            )
            .unwrap();
        assert_eq!(errored.error_message.as_deref(), Some("overheated"));

        let cleared = engine
            .update(&admin, &process.id, patch(r#"{"errorMessage":null}"#))
            .unwrap();
        assert!(cleared.error_message.is_none());
    }

    #[test]
    fn update_rejects_empty_and_invalid_patches() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let process = engine.create(&admin, compost()).unwrap();

        assert!(matches!(
            engine.update(&admin, &process.id, ProcessPatch::default()),
            Err(EngineError::Validation { .. })
        ));
        assert!(matches!(
            engine.update(&admin, &process.id, patch(r#"{"estimatedDuration":0}"#)),
            Err(EngineError::Validation { .. })
        ));
        let nan = ProcessPatch {
            progress: Some(Some(f64::NAN)),
            ..Default::default()
        };
        assert!(matches!(
            engine.update(&admin, &process.id, nan),
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn null_admin_keys_are_still_admin_only() {
        let (engine, store) = engine();
        let user = Caller::user("operator");
        let process = engine.create(&user, compost()).unwrap();
        let body = r#"{"status":null,"progress":null,"name":"X"}"#;

        assert!(matches!(
            engine.update(&user, &process.id, patch(body)),
            Err(EngineError::Forbidden { .. })
        ));
        assert_eq!(store.get(&process.id).unwrap().unwrap(), process);

        assert!(matches!(
            engine.update(&Caller::admin("supervisor"), &process.id, patch(body)),
            Err(EngineError::Validation { .. })
        ));
        assert_eq!(store.get(&process.id).unwrap().unwrap().name, "Compost A");
    }

    #[test]
    fn create_rejects_blank_description() {
        let (engine, store) = engine();
        let mut fields = compost();
        fields.description = String::new();
        assert!(matches!(
            engine.create(&Caller::user("u"), fields),
            Err(EngineError::Validation { .. })
        ));
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn delete_then_get_and_delete_again() {
        let (engine, _) = engine();
        let user = Caller::user("operator");
        let process = engine.create(&user, compost()).unwrap();
        engine.start(&user, &process.id).unwrap();

        assert!(engine.delete(&user, &process.id).unwrap());
        assert!(matches!(engine.get(&process.id), Err(EngineError::NotFound(_))));
        assert!(!engine.delete(&user, &process.id).unwrap());
    }

    #[test]
    fn list_filters_by_search_and_status() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let compost = engine.create(&admin, compost()).unwrap();
        let bottles = engine
            .create(
                &admin,
                NewProcess {
                    name: "Bottle line".into(),
                    description: "PET sorting".into(),
                    process_type: ProcessType::Plastic,
                    estimated_duration: None,
                },
            )
            .unwrap();
        engine.start(&admin, &bottles.id).unwrap();

        let all = engine.list(&ProcessFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, bottles.id);

        let plastic = engine
            .list(&ProcessFilter {
                search: Some("PLASTIC".into()),
                status: None,
            })
            .unwrap();
        assert_eq!(plastic.len(), 1);
        assert_eq!(plastic[0].id, bottles.id);

        let stopped = engine
            .list(&ProcessFilter {
                search: Some("garden".into()),
                status: Some(ProcessStatus::Stopped),
            })
            .unwrap();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].id, compost.id);

        let none = engine
            .list(&ProcessFilter {
                search: Some("garden".into()),
                status: Some(ProcessStatus::Running),
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn stats_group_statuses_like_the_dashboard() {
        let (engine, _) = engine();
        let admin = Caller::admin("supervisor");
        let a = engine.create(&admin, compost()).unwrap();
        let b = engine.create(&admin, compost()).unwrap();
        let c = engine.create(&admin, compost()).unwrap();
        engine.start(&admin, &a.id).unwrap();
        engine.speed_boost(&admin, &a.id, 5).unwrap();
        engine.mark_completed(&admin, &b.id).unwrap();
        engine.start(&admin, &c.id).unwrap();
        engine.pause(&admin, &c.id).unwrap();

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.paused, 1);
        assert_eq!(stats.stopped, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.average_progress, 50.0);
        assert_eq!(stats.by_type.get("organic"), Some(&3));
        assert_eq!(stats.by_status.get("paused"), Some(&1));
    }

    #[test]
    fn stats_on_empty_store() {
        let (engine, _) = engine();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_progress, 0.0);
    }

    struct BrokenStore;

    impl ProcessStore for BrokenStore {
        fn get_all(&self) -> Result<Vec<Process>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn get(&self, _id: &str) -> Result<Option<Process>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn create(&self, _fields: NewProcess) -> Result<Process, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn update(&self, _id: &str, _changes: ProcessUpdate) -> Result<Option<Process>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn delete(&self, _id: &str) -> Result<bool, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn storage_failures_propagate() {
        let engine = ProcessEngine::new(Arc::new(BrokenStore));
        let admin = Caller::admin("supervisor");
        assert!(matches!(engine.start(&admin, "x"), Err(EngineError::Storage(_))));
        assert!(matches!(engine.stats(), Err(EngineError::Storage(_))));
        assert!(matches!(
            engine.create(&admin, compost()),
            Err(EngineError::Storage(_))
        ));
    }

    fn status_strategy() -> impl Strategy<Value = ProcessStatus> {
        prop::sample::select(ProcessStatus::ALL.to_vec())
    }

    fn admin_field_patch() -> impl Strategy<Value = ProcessPatch> {
        prop_oneof![
            proptest::option::of(status_strategy()).prop_map(|s| ProcessPatch {
                status: Some(s),
                ..Default::default()
            }),
            proptest::option::of(0.0f64..=100.0).prop_map(|p| ProcessPatch {
                progress: Some(p),
                name: Some("renamed".into()),
                ..Default::default()
            }),
            proptest::option::of("[a-z]{1,8}").prop_map(|m| ProcessPatch {
                error_message: Some(m),
                ..Default::default()
            }),
            proptest::option::of(1u32..500).prop_map(|d| ProcessPatch {
                estimated_duration: Some(d),
                description: Some("changed".into()),
                ..Default::default()
            }),
        ]
    }

    proptest! {
        #[test]
        fn start_always_resets(status in status_strategy(), progress in 0.0f64..=100.0) {
            let (engine, store) = engine();
            let admin = Caller::admin("supervisor");
            let process = engine.create(&admin, compost()).unwrap();
            store.update(&process.id, ProcessUpdate {
                status: Some(status),
                progress: Some(progress),
                ..Default::default()
            }).unwrap();

            let started = engine.start(&Caller::user("operator"), &process.id).unwrap();
            prop_assert_eq!(started.status, ProcessStatus::Running);
            prop_assert_eq!(started.progress, 0.0);
            prop_assert!(started.started_at.is_some());
        }

        #[test]
        fn non_admin_admin_fields_always_forbidden(patch in admin_field_patch()) {
            let (engine, store) = engine();
            let user = Caller::user("operator");
            let process = engine.create(&user, compost()).unwrap();

            let result = engine.update(&user, &process.id, patch);
            let forbidden = matches!(result, Err(EngineError::Forbidden { .. }));
            prop_assert!(forbidden, "expected Forbidden, got {:?}", result);
            prop_assert_eq!(store.get(&process.id).unwrap().unwrap(), process);
        }
    }
}
