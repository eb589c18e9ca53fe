//! Multi-step state machine.
//!
//! Sequences one [`FormOrchestrator`] per step. Forward navigation submits
//! the current step and only advances on success; backward navigation
//! never discards data or completion marks. After every successful
//! transition the progress is persisted through a [`StateStore`].
//!
//! The machine is shared by reference (`&self` API). Its state lives
//! behind a `std::sync::Mutex` that is only held between awaits, and
//! transitions are serialized by an in-flight flag: a transition started
//! while another is running returns [`Navigation::Busy`] untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use formwork_interchange::{FormSettings, StepDecl};
use formwork_storage::{StateStore, StepSnapshotRecord};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CallbackError, EngineError};
use crate::form::{EngineContext, FormOrchestrator, ValueChange};
use crate::options::OptionsRequest;
use crate::schema::ValidationReport;
use crate::values::FormValues;

// ──────────────────────────────────────────────
// Configuration and state
// ──────────────────────────────────────────────

/// Behaviour switches of a multi-step form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiStepConfig {
    pub allow_back_navigation: bool,
    /// Key under which progress is persisted; `None` disables persistence.
    pub persist_key: Option<String>,
    /// Remove the persisted snapshot once the form completes.
    pub clear_on_complete: bool,
}

impl Default for MultiStepConfig {
    fn default() -> Self {
        MultiStepConfig::from(&FormSettings::default())
    }
}

impl From<&FormSettings> for MultiStepConfig {
    fn from(settings: &FormSettings) -> Self {
        MultiStepConfig {
            allow_back_navigation: settings.allow_back_navigation,
            persist_key: settings.persist_key.clone(),
            clear_on_complete: settings.clear_on_complete,
        }
    }
}

/// Observable state of the machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiStepState {
    pub current_step: usize,
    /// Step id → cleaned values accepted for that step.
    pub step_data: BTreeMap<String, FormValues>,
    pub completed_steps: BTreeSet<usize>,
    pub is_submitting: bool,
    pub is_complete: bool,
    pub last_error: Option<String>,
}

/// Static description of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub optional: bool,
}

/// `completed / total` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64
    }
}

// ──────────────────────────────────────────────
// Callbacks
// ──────────────────────────────────────────────

/// Submission boundary of a multi-step form.
///
/// Both hooks may fail; a failure is recorded and the transition can be
/// retried with the data already merged.
#[async_trait]
pub trait StepCallbacks: Send + Sync {
    async fn on_step_complete(
        &self,
        _step_id: &str,
        _step_index: usize,
        _data: &FormValues,
    ) -> Result<(), CallbackError> {
        Ok(())
    }

    async fn on_complete(
        &self,
        _all_data: &BTreeMap<String, FormValues>,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Callbacks that accept everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallbacks;

impl StepCallbacks for NoCallbacks {}

// ──────────────────────────────────────────────
// Navigation outcomes
// ──────────────────────────────────────────────

/// Why a navigation request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    AtFirstStep,
    BackNavigationDisabled,
    /// Target is neither the current step nor a completed one.
    NotReachable,
    OutOfRange,
    AlreadyComplete,
}

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// The current step was accepted and the next one is now current.
    Advanced { from: usize, to: usize },
    /// The last step was accepted and the form-complete hook succeeded.
    Completed { data: BTreeMap<String, FormValues> },
    /// Moved without submitting (back, or jump to a completed step).
    Moved { from: usize, to: usize },
    /// The current step failed validation.
    Rejected(ValidationReport),
    Blocked(BlockReason),
    /// Another transition is in flight; nothing changed.
    Busy,
    /// A callback failed; data stays merged and the call can be retried.
    Failed(String),
}

// ──────────────────────────────────────────────
// Machine
// ──────────────────────────────────────────────

struct Inner {
    forms: Vec<FormOrchestrator>,
    state: MultiStepState,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Marks a transition in flight; clears the mark on drop.
struct TransitionGuard<'a> {
    flag: &'a AtomicBool,
    inner: &'a Mutex<Inner>,
}

impl<'a> TransitionGuard<'a> {
    fn acquire(flag: &'a AtomicBool, inner: &'a Mutex<Inner>) -> Option<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        lock(inner).state.is_submitting = true;
        Some(TransitionGuard { flag, inner })
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        lock(self.inner).state.is_submitting = false;
        self.flag.store(false, Ordering::Release);
    }
}

/// A form split into steps.
pub struct MultiStepForm {
    id: String,
    steps: Vec<StepInfo>,
    config: MultiStepConfig,
    inner: Mutex<Inner>,
    in_flight: AtomicBool,
    /// Set while an attached store has not been read yet.
    pending_restore: AtomicBool,
    store: Option<Arc<dyn StateStore>>,
    callbacks: Arc<dyn StepCallbacks>,
}

impl std::fmt::Debug for MultiStepForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStepForm")
            .field("id", &self.id)
            .field("steps", &self.steps)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl MultiStepForm {
    /// Build the machine with one orchestrator per step. Fails only when
    /// there are no steps.
    pub fn new(
        id: impl Into<String>,
        steps: &[StepDecl],
        ctx: &EngineContext,
        config: MultiStepConfig,
    ) -> Result<Self, EngineError> {
        let id = id.into();
        if steps.is_empty() {
            return Err(EngineError::NoSteps(id));
        }
        let forms = steps
            .iter()
            .map(|step| FormOrchestrator::new(step.id.clone(), &step.fields, ctx))
            .collect();
        let infos = steps
            .iter()
            .map(|step| StepInfo {
                id: step.id.clone(),
                title: step.title.clone(),
                description: step.description.clone(),
                optional: step.optional,
            })
            .collect();
        Ok(MultiStepForm {
            id,
            steps: infos,
            config,
            inner: Mutex::new(Inner {
                forms,
                state: MultiStepState::default(),
            }),
            in_flight: AtomicBool::new(false),
            pending_restore: AtomicBool::new(false),
            store: None,
            callbacks: Arc::new(NoCallbacks),
        })
    }

    /// Build the machine and seed it from `store` before returning, so
    /// the state reflects any saved progress from the start.
    pub async fn open(
        id: impl Into<String>,
        steps: &[StepDecl],
        ctx: &EngineContext,
        config: MultiStepConfig,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, EngineError> {
        let form = MultiStepForm::new(id, steps, ctx, config)?.with_store(store);
        form.restore().await;
        Ok(form)
    }

    /// Attach a store. The saved snapshot is loaded on the first
    /// navigation unless [`restore`](Self::restore) runs before it, so a
    /// transition never overwrites progress it has not read.
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        *self.pending_restore.get_mut() = self.config.persist_key.is_some();
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn StepCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    // ── Accessors ──────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &MultiStepConfig {
        &self.config
    }

    pub fn steps(&self) -> &[StepInfo] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> MultiStepState {
        lock(&self.inner).state.clone()
    }

    pub fn current_step(&self) -> usize {
        lock(&self.inner).state.current_step
    }

    pub fn is_first_step(&self) -> bool {
        self.current_step() == 0
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step() + 1 == self.steps.len()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: lock(&self.inner).state.completed_steps.len(),
            total: self.steps.len(),
        }
    }

    /// Run `f` against the current step's form.
    ///
    /// Option requests produced inside `f` must be run (see
    /// [`run_requests`](Self::run_requests)) or the affected fields stay
    /// in their loading state.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut FormOrchestrator) -> R) -> R {
        let mut inner = lock(&self.inner);
        let index = inner.state.current_step;
        f(&mut inner.forms[index])
    }

    /// Run `f` against the form of step `index`.
    pub fn with_step<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut FormOrchestrator) -> R,
    ) -> Result<R, EngineError> {
        let mut inner = lock(&self.inner);
        let len = inner.forms.len();
        let form = inner
            .forms
            .get_mut(index)
            .ok_or(EngineError::StepOutOfRange { index, len })?;
        Ok(f(form))
    }

    /// Set a value on the current step.
    pub fn set_value(&self, field_name: &str, value: Value) -> (usize, ValueChange) {
        let mut inner = lock(&self.inner);
        let index = inner.state.current_step;
        (index, inner.forms[index].set_value(field_name, value))
    }

    /// Run option requests of step `index` concurrently and apply them.
    pub async fn run_requests(&self, index: usize, requests: Vec<OptionsRequest>) -> usize {
        self.run_batches(vec![(index, requests)]).await
    }

    /// Fetch whatever options the current step needs.
    pub async fn refresh_options(&self) -> usize {
        let batch = {
            let mut inner = lock(&self.inner);
            let index = inner.state.current_step;
            (index, inner.forms[index].sync_options())
        };
        self.run_batches(vec![batch]).await
    }

    async fn run_batches(&self, batches: Vec<(usize, Vec<OptionsRequest>)>) -> usize {
        let tagged = batches
            .into_iter()
            .flat_map(|(index, requests)| requests.into_iter().map(move |r| (index, r)));
        let responses = join_all(tagged.map(|(index, request)| async move {
            (index, request.run().await)
        }))
        .await;
        if responses.is_empty() {
            return 0;
        }
        let mut inner = lock(&self.inner);
        responses
            .into_iter()
            .filter(|(index, response)| {
                inner
                    .forms
                    .get_mut(*index)
                    .map(|form| form.apply_options(response.clone()))
                    .unwrap_or(false)
            })
            .count()
    }

    // ── Navigation ─────────────────────────────

    /// Submit the current step and advance (or complete on the last step).
    pub async fn go_to_next_step(&self) -> Navigation {
        let Some(_guard) = TransitionGuard::acquire(&self.in_flight, &self.inner) else {
            return Navigation::Busy;
        };
        self.restore_if_pending().await;

        let (index, step_id, cleaned) = {
            let mut inner = lock(&self.inner);
            if inner.state.is_complete {
                return Navigation::Blocked(BlockReason::AlreadyComplete);
            }
            let index = inner.state.current_step;
            let step = &self.steps[index];
            let form = &mut inner.forms[index];

            let cleaned = if step.optional && !form.has_visible_data() {
                debug!(form = %self.id, step = %step.id, "optional step skipped without data");
                FormValues::new()
            } else {
                match form.submit() {
                    Ok(cleaned) => cleaned,
                    Err(report) => {
                        debug!(
                            form = %self.id,
                            step = %step.id,
                            errors = report.errors.len(),
                            "step rejected"
                        );
                        return Navigation::Rejected(report);
                    }
                }
            };
            inner.state.step_data.insert(step.id.clone(), cleaned.clone());
            inner.state.completed_steps.insert(index);
            (index, step.id.clone(), cleaned)
        };

        if let Err(e) = self
            .callbacks
            .on_step_complete(&step_id, index, &cleaned)
            .await
        {
            return self.record_failure("step-complete callback failed", e);
        }

        if index + 1 < self.steps.len() {
            {
                let mut inner = lock(&self.inner);
                inner.state.current_step = index + 1;
                inner.state.last_error = None;
            }
            info!(form = %self.id, from = index, to = index + 1, "step advanced");
            self.persist().await;
            return Navigation::Advanced {
                from: index,
                to: index + 1,
            };
        }

        let all = lock(&self.inner).state.step_data.clone();
        if let Err(e) = self.callbacks.on_complete(&all).await {
            return self.record_failure("form-complete callback failed", e);
        }
        {
            let mut inner = lock(&self.inner);
            inner.state.is_complete = true;
            inner.state.last_error = None;
        }
        info!(form = %self.id, "form completed");
        if self.config.clear_on_complete {
            self.clear_persisted().await;
        } else {
            self.persist().await;
        }
        Navigation::Completed { data: all }
    }

    fn record_failure(&self, what: &str, error: CallbackError) -> Navigation {
        warn!(form = %self.id, error = %error, "{}", what);
        lock(&self.inner).state.last_error = Some(error.message.clone());
        Navigation::Failed(error.message)
    }

    /// Go back one step. Never clears data or completion marks.
    pub async fn go_to_previous_step(&self) -> Navigation {
        let Some(_guard) = TransitionGuard::acquire(&self.in_flight, &self.inner) else {
            return Navigation::Busy;
        };
        self.restore_if_pending().await;
        let from = {
            let mut inner = lock(&self.inner);
            if inner.state.is_complete {
                return Navigation::Blocked(BlockReason::AlreadyComplete);
            }
            let from = inner.state.current_step;
            if from == 0 {
                return Navigation::Blocked(BlockReason::AtFirstStep);
            }
            if !self.config.allow_back_navigation {
                return Navigation::Blocked(BlockReason::BackNavigationDisabled);
            }
            inner.state.current_step = from - 1;
            from
        };
        self.persist().await;
        Navigation::Moved { from, to: from - 1 }
    }

    /// Jump to `index` if it is the current step or a completed one.
    pub async fn go_to_step(&self, index: usize) -> Navigation {
        let Some(_guard) = TransitionGuard::acquire(&self.in_flight, &self.inner) else {
            return Navigation::Busy;
        };
        self.restore_if_pending().await;
        let from = {
            let mut inner = lock(&self.inner);
            if inner.state.is_complete {
                return Navigation::Blocked(BlockReason::AlreadyComplete);
            }
            if index >= self.steps.len() {
                return Navigation::Blocked(BlockReason::OutOfRange);
            }
            let from = inner.state.current_step;
            if index == from {
                return Navigation::Moved { from, to: index };
            }
            if !inner.state.completed_steps.contains(&index) {
                return Navigation::Blocked(BlockReason::NotReachable);
            }
            if index < from && !self.config.allow_back_navigation {
                return Navigation::Blocked(BlockReason::BackNavigationDisabled);
            }
            inner.state.current_step = index;
            from
        };
        self.persist().await;
        Navigation::Moved { from, to: index }
    }

    // ── Persistence ────────────────────────────

    fn snapshot_record(&self) -> StepSnapshotRecord {
        let inner = lock(&self.inner);
        StepSnapshotRecord {
            current_step: inner.state.current_step,
            step_data: inner.state.step_data.clone(),
            completed_steps: inner.state.completed_steps.clone(),
            saved_at: None,
        }
        .stamped()
    }

    async fn persist(&self) {
        let (Some(store), Some(key)) = (&self.store, &self.config.persist_key) else {
            return;
        };
        let record = self.snapshot_record();
        if let Err(e) = store.save(key, &record).await {
            warn!(form = %self.id, key = %key, error = %e, "failed to persist progress");
            lock(&self.inner).state.last_error = Some(e.to_string());
        }
    }

    async fn clear_persisted(&self) {
        let (Some(store), Some(key)) = (&self.store, &self.config.persist_key) else {
            return;
        };
        if let Err(e) = store.clear(key).await {
            warn!(form = %self.id, key = %key, error = %e, "failed to clear persisted progress");
            lock(&self.inner).state.last_error = Some(e.to_string());
        }
    }

    /// Seed the state from a persisted snapshot, if there is one.
    ///
    /// The snapshot is sanitized against the current step list: the current
    /// step is clamped, unknown completed indices and step ids are dropped,
    /// and each step's data is loaded back into its form. A snapshot that
    /// cannot be read is logged and ignored. Returns whether a snapshot was
    /// applied; `false` (and nothing read) while a transition is in flight.
    pub async fn restore(&self) -> bool {
        let Some(_guard) = TransitionGuard::acquire(&self.in_flight, &self.inner) else {
            return false;
        };
        self.restore_snapshot().await
    }

    async fn restore_if_pending(&self) {
        if self.pending_restore.load(Ordering::Acquire) {
            self.restore_snapshot().await;
        }
    }

    /// Callers hold the transition guard.
    async fn restore_snapshot(&self) -> bool {
        self.pending_restore.store(false, Ordering::Release);
        let (Some(store), Some(key)) = (&self.store, &self.config.persist_key) else {
            return false;
        };
        let record = match store.load(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                warn!(form = %self.id, key = %key, error = %e, "ignoring unreadable snapshot");
                lock(&self.inner).state.last_error = Some(e.to_string());
                return false;
            }
        };

        let batches = {
            let mut inner = lock(&self.inner);
            let last = self.steps.len() - 1;
            if record.current_step > last {
                warn!(
                    form = %self.id,
                    current_step = record.current_step,
                    "snapshot step out of range, clamped"
                );
            }
            let mut state = MultiStepState {
                current_step: record.current_step.min(last),
                is_submitting: inner.state.is_submitting,
                ..Default::default()
            };
            state.completed_steps = record
                .completed_steps
                .into_iter()
                .filter(|i| *i < self.steps.len())
                .collect();

            let mut batches = Vec::new();
            for (step_id, data) in record.step_data {
                let Some(index) = self.steps.iter().position(|s| s.id == step_id) else {
                    warn!(form = %self.id, step = %step_id, "snapshot data for unknown step dropped");
                    continue;
                };
                let change = inner.forms[index].load_values(&data);
                batches.push((index, change.option_requests));
                state.step_data.insert(step_id, data);
            }
            inner.state = state;
            batches
        };
        debug!(form = %self.id, key = %key, "progress restored");
        self.run_batches(batches).await;
        true
    }

    /// Back to step 0 with empty data; the persisted snapshot is removed.
    /// Returns `false` (and changes nothing) while a transition is in flight.
    pub async fn reset(&self) -> bool {
        let Some(_guard) = TransitionGuard::acquire(&self.in_flight, &self.inner) else {
            return false;
        };
        self.pending_restore.store(false, Ordering::Release);
        let batches = {
            let mut inner = lock(&self.inner);
            inner.state = MultiStepState {
                is_submitting: true,
                ..Default::default()
            };
            inner
                .forms
                .iter_mut()
                .enumerate()
                .map(|(index, form)| (index, form.reset().option_requests))
                .collect()
        };
        self.clear_persisted().await;
        self.run_batches(batches).await;
        true
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use formwork_interchange::from_interchange;
    use formwork_storage::{MemoryStore, StorageError};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn onboarding() -> Vec<StepDecl> {
        let doc = from_interchange(&json!({
            "id": "onboarding",
            "steps": [
                {
                    "id": "personal",
                    "title": "About you",
                    "fields": [{
                        "fieldName": "name",
                        "componentKind": "text",
                        "props": { "validations": [{ "kind": "required" }] }
                    }]
                },
                {
                    "id": "extras",
                    "title": "Extras",
                    "optional": true,
                    "fields": [{
                        "fieldName": "website",
                        "componentKind": "text",
                        "props": { "validations": [{ "kind": "url" }] }
                    }]
                },
                {
                    "id": "confirm",
                    "title": "Confirm",
                    "fields": [{
                        "fieldName": "agree",
                        "componentKind": "checkbox",
                        "props": { "validations": [{ "kind": "mustBeTrue" }] }
                    }]
                }
            ]
        }))
        .unwrap();
        doc.steps()
    }

    fn machine(config: MultiStepConfig) -> MultiStepForm {
        MultiStepForm::new("onboarding", &onboarding(), &EngineContext::default(), config).unwrap()
    }

    fn persisted(key: &str) -> MultiStepConfig {
        MultiStepConfig {
            persist_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_step_list_is_an_error() {
        let err = MultiStepForm::new("x", &[], &EngineContext::default(), MultiStepConfig::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSteps(_)));
    }

    #[tokio::test]
    async fn invalid_step_blocks_forward_navigation() {
        let form = machine(MultiStepConfig::default());
        assert!(form.is_first_step());

        let nav = form.go_to_next_step().await;
        assert!(matches!(nav, Navigation::Rejected(ref r) if !r.field_errors("name").is_empty()));
        assert_eq!(form.current_step(), 0);
        assert!(form.state().completed_steps.is_empty());

        form.set_value("name", json!("Ada"));
        assert_eq!(form.go_to_next_step().await, Navigation::Advanced { from: 0, to: 1 });
        let state = form.state();
        assert_eq!(state.step_data["personal"]["name"], json!("Ada"));
        assert!(state.completed_steps.contains(&0));
        assert!(!state.is_submitting);
    }

    #[tokio::test]
    async fn optional_step_skip_and_partial_data() {
        let form = machine(MultiStepConfig::default());
        form.set_value("name", json!("Ada"));
        form.go_to_next_step().await;

        // Partial data on an optional step is still validated.
        form.set_value("website", json!("not a url"));
        assert!(matches!(form.go_to_next_step().await, Navigation::Rejected(_)));

        // Cleared again: the step may be skipped.
        form.set_value("website", json!(""));
        assert_eq!(form.go_to_next_step().await, Navigation::Advanced { from: 1, to: 2 });
        assert!(form.state().step_data["extras"].is_empty());
        assert_eq!(form.progress(), Progress { completed: 2, total: 3 });
    }

    #[tokio::test]
    async fn backward_navigation_keeps_data() {
        let form = machine(MultiStepConfig::default());
        assert_eq!(
            form.go_to_previous_step().await,
            Navigation::Blocked(BlockReason::AtFirstStep)
        );
        form.set_value("name", json!("Ada"));
        form.go_to_next_step().await;

        assert_eq!(form.go_to_previous_step().await, Navigation::Moved { from: 1, to: 0 });
        let state = form.state();
        assert!(state.completed_steps.contains(&0));
        assert!(state.step_data.contains_key("personal"));
        form.with_current(|f| assert_eq!(f.value("name"), Some(&json!("Ada"))));

        // Step 1 was never completed and is not current.
        assert_eq!(
            form.go_to_step(2).await,
            Navigation::Blocked(BlockReason::NotReachable)
        );
        assert_eq!(form.go_to_step(9).await, Navigation::Blocked(BlockReason::OutOfRange));
    }

    #[tokio::test]
    async fn back_navigation_can_be_disabled() {
        let form = machine(MultiStepConfig {
            allow_back_navigation: false,
            ..Default::default()
        });
        form.set_value("name", json!("Ada"));
        form.go_to_next_step().await;
        assert_eq!(
            form.go_to_previous_step().await,
            Navigation::Blocked(BlockReason::BackNavigationDisabled)
        );
        assert_eq!(
            form.go_to_step(0).await,
            Navigation::Blocked(BlockReason::BackNavigationDisabled)
        );
        assert_eq!(form.current_step(), 1);
    }

    #[tokio::test]
    async fn completes_and_persists() {
        let store = MemoryStore::new();
        let form = machine(persisted("flow")).with_store(Arc::new(store.clone()));
        form.set_value("name", json!("Ada"));
        form.go_to_next_step().await;
        form.go_to_next_step().await;
        form.set_value("agree", json!(true));

        let Navigation::Completed { data } = form.go_to_next_step().await else {
            panic!("expected completion");
        };
        assert_eq!(data["confirm"]["agree"], json!(true));
        assert!(form.state().is_complete);
        assert_eq!(
            form.go_to_next_step().await,
            Navigation::Blocked(BlockReason::AlreadyComplete)
        );
        let record = store.load("flow").await.unwrap().unwrap();
        assert_eq!(record.completed_steps, BTreeSet::from([0, 1, 2]));
        assert!(record.saved_at.is_some());
    }

    #[tokio::test]
    async fn clear_on_complete_removes_snapshot() {
        let store = MemoryStore::new();
        let config = MultiStepConfig {
            clear_on_complete: true,
            ..persisted("flow")
        };
        let form = machine(config).with_store(Arc::new(store.clone()));
        form.set_value("name", json!("Ada"));
        form.go_to_next_step().await;
        assert!(store.raw("flow").is_some());
        form.go_to_next_step().await;
        form.set_value("agree", json!(true));
        form.go_to_next_step().await;
        assert!(store.raw("flow").is_none());
    }

    #[tokio::test]
    async fn restore_round_trip() {
        let store = MemoryStore::new();
        let first = machine(persisted("flow")).with_store(Arc::new(store.clone()));
        first.set_value("name", json!("Ada"));
        first.go_to_next_step().await;

        let second = machine(persisted("flow")).with_store(Arc::new(store.clone()));
        assert!(second.restore().await);
        let state = second.state();
        assert_eq!(state.current_step, 1);
        assert_eq!(state.completed_steps, BTreeSet::from([0]));
        assert_eq!(state.step_data["personal"]["name"], json!("Ada"));
        second
            .with_step(0, |f| assert_eq!(f.value("name"), Some(&json!("Ada"))))
            .unwrap();
    }

    #[tokio::test]
    async fn restore_sanitizes_snapshot() {
        let store = MemoryStore::new();
        store.put_raw(
            "flow",
            json!({
                "currentStep": 7,
                "completedSteps": [0, 5],
                "stepData": {
                    "personal": { "name": "Ada" },
                    "retired": { "x": 1 }
                }
            })
            .to_string(),
        );
        let form = machine(persisted("flow")).with_store(Arc::new(store));
        assert!(form.restore().await);
        let state = form.state();
        assert_eq!(state.current_step, 2);
        assert_eq!(state.completed_steps, BTreeSet::from([0]));
        assert_eq!(state.step_data.keys().collect::<Vec<_>>(), vec!["personal"]);
    }

    fn seeded(current_step: usize, completed: &[usize]) -> MemoryStore {
        let store = MemoryStore::new();
        store.put_raw(
            "flow",
            json!({
                "currentStep": current_step,
                "completedSteps": completed,
                "stepData": { "personal": { "name": "Ada" } }
            })
            .to_string(),
        );
        store
    }

    #[tokio::test]
    async fn open_starts_from_saved_progress() {
        let store = seeded(2, &[0, 1]);
        let form = MultiStepForm::open(
            "onboarding",
            &onboarding(),
            &EngineContext::default(),
            persisted("flow"),
            Arc::new(store),
        )
        .await
        .unwrap();
        assert_eq!(form.current_step(), 2);
        assert_eq!(form.state().completed_steps, BTreeSet::from([0, 1]));
        assert!(!form.state().is_submitting);
        form.with_step(0, |f| assert_eq!(f.value("name"), Some(&json!("Ada"))))
            .unwrap();
    }

    #[tokio::test]
    async fn first_transition_reads_attached_store() {
        let store = seeded(1, &[0]);
        let form = machine(persisted("flow")).with_store(Arc::new(store.clone()));

        // The saved step 1 is optional and empty, so it is skipped.
        assert_eq!(form.go_to_next_step().await, Navigation::Advanced { from: 1, to: 2 });
        let record = store.load("flow").await.unwrap().unwrap();
        assert_eq!(record.current_step, 2);
        assert_eq!(record.completed_steps, BTreeSet::from([0, 1]));
        assert_eq!(record.step_data["personal"]["name"], json!("Ada"));
    }

    #[tokio::test]
    async fn rejected_first_transition_leaves_snapshot_untouched() {
        let store = seeded(2, &[0, 1]);
        let form = machine(persisted("flow")).with_store(Arc::new(store.clone()));
        assert!(matches!(form.go_to_next_step().await, Navigation::Rejected(_)));
        assert_eq!(form.current_step(), 2);
        let record = store.load("flow").await.unwrap().unwrap();
        assert_eq!(record.current_step, 2);
        assert_eq!(record.completed_steps, BTreeSet::from([0, 1]));
    }

    #[tokio::test]
    async fn unreadable_snapshot_starts_fresh() {
        let store = MemoryStore::new();
        store.put_raw("flow", "][");
        let form = machine(persisted("flow")).with_store(Arc::new(store));
        assert!(!form.restore().await);
        let state = form.state();
        assert_eq!(state.current_step, 0);
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn reset_returns_to_start_and_clears_snapshot() {
        let store = MemoryStore::new();
        let form = machine(persisted("flow")).with_store(Arc::new(store.clone()));
        form.set_value("name", json!("Ada"));
        form.go_to_next_step().await;
        assert!(form.reset().await);
        let state = form.state();
        assert_eq!(state, MultiStepState::default());
        assert!(store.raw("flow").is_none());
        form.with_step(0, |f| assert!(f.value("name").is_none())).unwrap();
    }

    struct FlakyCallbacks {
        failures_left: AtomicUsize,
        step_calls: AtomicUsize,
    }

    #[async_trait]
    impl StepCallbacks for FlakyCallbacks {
        async fn on_step_complete(
            &self,
            _step_id: &str,
            _step_index: usize,
            _data: &FormValues,
        ) -> Result<(), CallbackError> {
            self.step_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CallbackError::new("backend unavailable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn callback_failure_is_retryable() {
        let callbacks = Arc::new(FlakyCallbacks {
            failures_left: AtomicUsize::new(1),
            step_calls: AtomicUsize::new(0),
        });
        let form = machine(MultiStepConfig::default()).with_callbacks(callbacks.clone());
        form.set_value("name", json!("Ada"));

        assert_eq!(
            form.go_to_next_step().await,
            Navigation::Failed("backend unavailable".to_string())
        );
        let state = form.state();
        assert_eq!(state.current_step, 0);
        assert_eq!(state.step_data["personal"]["name"], json!("Ada"));
        assert_eq!(state.last_error.as_deref(), Some("backend unavailable"));

        assert_eq!(form.go_to_next_step().await, Navigation::Advanced { from: 0, to: 1 });
        assert!(form.state().last_error.is_none());
        assert_eq!(callbacks.step_calls.load(Ordering::SeqCst), 2);
    }

    struct FailingStore;

    #[async_trait]
    impl StateStore for FailingStore {
        async fn load(&self, _key: &str) -> Result<Option<StepSnapshotRecord>, StorageError> {
            Ok(None)
        }
        async fn save(&self, _key: &str, _record: &StepSnapshotRecord) -> Result<(), StorageError> {
            Err(StorageError::Backend("disk full".to_string()))
        }
        async fn clear(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn storage_failure_does_not_undo_transition() {
        let form = machine(persisted("flow")).with_store(Arc::new(FailingStore));
        form.set_value("name", json!("Ada"));
        assert_eq!(form.go_to_next_step().await, Navigation::Advanced { from: 0, to: 1 });
        let state = form.state();
        assert_eq!(state.current_step, 1);
        assert!(state.last_error.unwrap().contains("disk full"));
    }

    struct GatedCallbacks {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl StepCallbacks for GatedCallbacks {
        async fn on_step_complete(
            &self,
            _step_id: &str,
            _step_index: usize,
            _data: &FormValues,
        ) -> Result<(), CallbackError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_transitions_are_serialized() {
        let gate = Arc::new(GatedCallbacks {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let store = seeded(0, &[]);
        let form = Arc::new(
            machine(persisted("flow"))
                .with_store(Arc::new(store))
                .with_callbacks(gate.clone()),
        );

        let running = Arc::clone(&form);
        let handle = tokio::spawn(async move { running.go_to_next_step().await });

        gate.entered.notified().await;
        assert!(form.state().is_submitting);
        assert_eq!(form.go_to_next_step().await, Navigation::Busy);
        assert_eq!(form.go_to_previous_step().await, Navigation::Busy);
        assert!(!form.reset().await);
        assert!(!form.restore().await);

        gate.release.notify_one();
        assert_eq!(handle.await.unwrap(), Navigation::Advanced { from: 0, to: 1 });
        let state = form.state();
        assert!(!state.is_submitting);
        assert_eq!(state.current_step, 1);
    }
}
