//! Form orchestrator: one reactive cycle per value change.
//!
//! Every change runs the same pipeline, in order:
//! 1. recompute visibility of every descriptor against the new values
//! 2. rebuild the validation schema if the visible set changed
//! 3. let the options resolver react to the new values
//!
//! Submission validates against the current schema and hands back only the
//! values of visible fields. Values of hidden fields stay in the value map
//! so re-showing a field restores what the user typed.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use formwork_interchange::RawField;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::diagnostics::Diagnostic;
use crate::error::CallbackError;
use crate::fields::{all_supported, process_fields, ComponentKind, FieldDescriptor};
use crate::messages::{KeyResolver, MessageParams, MessageResolver};
use crate::options::{
    FieldOptionsState, OptionsCache, OptionsRegistry, OptionsRequest, OptionsResolver,
    OptionsResponse, SelectOption,
};
use crate::schema::{ValidationReport, ValidationSchema};
use crate::values::{is_truthy, FormValues};

/// Message reference shown as placeholder while options load.
pub const LOADING_PLACEHOLDER_REF: &str = "options.loading";

// ──────────────────────────────────────────────
// Context
// ──────────────────────────────────────────────

/// Collaborators shared by every form (and step) built from one document.
#[derive(Clone)]
pub struct EngineContext {
    pub registry: OptionsRegistry,
    pub cache: OptionsCache,
    pub messages: Arc<dyn MessageResolver>,
    /// Renderer capability check.
    pub supports: fn(ComponentKind) -> bool,
}

impl Default for EngineContext {
    fn default() -> Self {
        EngineContext {
            registry: OptionsRegistry::empty(),
            cache: OptionsCache::new(),
            messages: Arc::new(KeyResolver),
            supports: all_supported,
        }
    }
}

impl EngineContext {
    pub fn new(registry: OptionsRegistry) -> Self {
        EngineContext {
            registry,
            ..Default::default()
        }
    }

    pub fn with_messages(mut self, messages: Arc<dyn MessageResolver>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_support(mut self, supports: fn(ComponentKind) -> bool) -> Self {
        self.supports = supports;
        self
    }
}

// ──────────────────────────────────────────────
// Reports
// ──────────────────────────────────────────────

/// Lifecycle of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStatus {
    Idle,
    Validating,
    Submitted,
}

/// What one value change did.
#[derive(Debug, Default)]
pub struct ValueChange {
    /// Fields that became visible.
    pub shown: Vec<String>,
    /// Fields that became hidden.
    pub hidden: Vec<String>,
    /// Fetches the change requires. Run them and feed the responses to
    /// [`FormOrchestrator::apply_options`] (or use
    /// [`FormOrchestrator::run_requests`]).
    pub option_requests: Vec<OptionsRequest>,
}

impl ValueChange {
    pub fn visibility_changed(&self) -> bool {
        !self.shown.is_empty() || !self.hidden.is_empty()
    }
}

/// Why `submit_with` did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("validation failed for {} field(s)", .0.errors.len())]
    Invalid(ValidationReport),
    #[error("submit handler failed: {0}")]
    Callback(#[from] CallbackError),
}

/// Render-ready state of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub field_name: String,
    pub component_kind: &'static str,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub description: Option<String>,
    pub value: Option<Value>,
    pub visible: bool,
    pub required: bool,
    pub disabled: bool,
    /// Merged props; for option-bearing fields `options` holds the current list.
    pub props: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// ──────────────────────────────────────────────
// Orchestrator
// ──────────────────────────────────────────────

/// One form: values, visible set, schema, and option state.
pub struct FormOrchestrator {
    id: String,
    fields: Vec<FieldDescriptor>,
    initial_values: FormValues,
    values: FormValues,
    visible: BTreeSet<String>,
    schema: ValidationSchema,
    options: OptionsResolver,
    messages: Arc<dyn MessageResolver>,
    status: FormStatus,
    last_report: Option<ValidationReport>,
    last_error: Option<String>,
    diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Debug for FormOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormOrchestrator")
            .field("id", &self.id)
            .field("values", &self.values)
            .field("visible", &self.visible)
            .field("status", &self.status)
            .finish()
    }
}

impl FormOrchestrator {
    /// Build a form from raw descriptors.
    pub fn new(id: impl Into<String>, raw: &[RawField], ctx: &EngineContext) -> Self {
        let processed = process_fields(raw, ctx.supports);
        let (options, option_diagnostics) =
            OptionsResolver::from_fields(&processed.fields, &ctx.registry, ctx.cache.clone());
        let mut diagnostics = processed.diagnostics;
        diagnostics.extend(option_diagnostics);

        let schema = ValidationSchema::build(
            processed
                .fields
                .iter()
                .filter(|f| processed.initially_visible.contains(&f.field_name)),
            ctx.messages.as_ref(),
        );

        FormOrchestrator {
            id: id.into(),
            fields: processed.fields,
            values: processed.initial_values.clone(),
            initial_values: processed.initial_values,
            visible: processed.initially_visible,
            schema,
            options,
            messages: Arc::clone(&ctx.messages),
            status: FormStatus::Idle,
            last_report: None,
            last_error: None,
            diagnostics,
        }
    }

    // ── Accessors ──────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, field_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.field_name == field_name)
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn value(&self, field_name: &str) -> Option<&Value> {
        self.values.get(field_name)
    }

    pub fn visible_fields(&self) -> &BTreeSet<String> {
        &self.visible
    }

    pub fn is_visible(&self, field_name: &str) -> bool {
        self.visible.contains(field_name)
    }

    pub fn schema(&self) -> &ValidationSchema {
        &self.schema
    }

    pub fn options(&self) -> &OptionsResolver {
        &self.options
    }

    pub fn options_state(&self, field_name: &str) -> Option<&FieldOptionsState> {
        self.options.state(field_name)
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Report of the last validation run, if any.
    pub fn last_report(&self) -> Option<&ValidationReport> {
        self.last_report.as_ref()
    }

    /// Error of the last failed submit handler, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether any visible field currently holds a non-empty value.
    pub fn has_visible_data(&self) -> bool {
        self.visible.iter().any(|name| {
            let value = self.values.get(name);
            let untouched = self
                .initial_values
                .get(name)
                .map(|initial| Some(initial) == value)
                .unwrap_or(false);
            !untouched && !crate::values::is_empty(value)
        })
    }

    // ── Changes ────────────────────────────────

    pub fn set_value(&mut self, field_name: &str, value: Value) -> ValueChange {
        if self.field(field_name).is_none() {
            tracing::debug!(form = %self.id, field = %field_name, "value set for unknown field");
        }
        self.values.insert(field_name.to_string(), value);
        self.recompute()
    }

    /// Remove a value, leaving the field undefined.
    pub fn unset_value(&mut self, field_name: &str) -> ValueChange {
        self.values.remove(field_name);
        self.recompute()
    }

    /// Apply several values as one change.
    pub fn set_values<I>(&mut self, values: I) -> ValueChange
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.values.extend(values);
        self.recompute()
    }

    /// Merge previously saved values over the current ones.
    pub fn load_values(&mut self, values: &FormValues) -> ValueChange {
        self.set_values(values.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    /// Restore initial values and clear submission and option state.
    pub fn reset(&mut self) -> ValueChange {
        self.values = self.initial_values.clone();
        self.options.reset();
        self.last_report = None;
        self.last_error = None;
        self.recompute()
    }

    fn recompute(&mut self) -> ValueChange {
        self.status = FormStatus::Idle;

        let visible: BTreeSet<String> = self
            .fields
            .iter()
            .filter(|f| f.is_visible(&self.values))
            .map(|f| f.field_name.clone())
            .collect();
        let shown: Vec<String> = visible.difference(&self.visible).cloned().collect();
        let hidden: Vec<String> = self.visible.difference(&visible).cloned().collect();

        if !shown.is_empty() || !hidden.is_empty() {
            tracing::debug!(form = %self.id, ?shown, ?hidden, "visibility changed");
            self.schema = ValidationSchema::build(
                self.fields.iter().filter(|f| visible.contains(&f.field_name)),
                self.messages.as_ref(),
            );
            self.visible = visible;
        }

        let option_requests = self.options.sync(&self.values, &self.visible);
        ValueChange {
            shown,
            hidden,
            option_requests,
        }
    }

    // ── Options ────────────────────────────────

    /// Requests for every visible option field whose dependencies changed
    /// since the last sync.
    pub fn sync_options(&mut self) -> Vec<OptionsRequest> {
        self.options.sync(&self.values, &self.visible)
    }

    pub fn apply_options(&mut self, response: OptionsResponse) -> bool {
        self.options.apply(response)
    }

    /// Run requests concurrently and apply the results. Returns how many
    /// responses were applied (stale ones are not counted).
    pub async fn run_requests(&mut self, requests: Vec<OptionsRequest>) -> usize {
        if requests.is_empty() {
            return 0;
        }
        let responses = join_all(requests.into_iter().map(OptionsRequest::run)).await;
        responses
            .into_iter()
            .map(|response| self.options.apply(response))
            .filter(|applied| *applied)
            .count()
    }

    /// Sync, fetch everything needed, and apply.
    pub async fn refresh_options(&mut self) -> usize {
        let requests = self.sync_options();
        self.run_requests(requests).await
    }

    /// Drop cached options for a field and fetch again on the next sync.
    pub fn invalidate_options(&mut self, field_name: &str) -> bool {
        self.options.invalidate(field_name)
    }

    // ── Rendering ──────────────────────────────

    fn resolve(&self, message_ref: &str) -> String {
        self.messages.resolve(message_ref, &MessageParams::new())
    }

    /// Render-ready view of a field, or `None` for an unknown name.
    pub fn field_view(&self, field_name: &str) -> Option<FieldView> {
        let field = self.field(field_name)?;
        let state = self.options.state(field_name);
        let is_loading = state.map(|s| s.is_loading).unwrap_or(false);

        let mut props = field.props.clone();
        let options = match state {
            Some(state) => {
                props.insert(
                    "options".to_string(),
                    serde_json::to_value(&state.options).unwrap_or(Value::Array(Vec::new())),
                );
                Some(state.options.clone())
            }
            None if field.kind.has_options() => props
                .get("options")
                .cloned()
                .and_then(|v| serde_json::from_value::<Vec<SelectOption>>(v).ok()),
            None => None,
        };

        let placeholder = if is_loading {
            Some(self.resolve(LOADING_PLACEHOLDER_REF))
        } else {
            field.placeholder().map(|p| self.resolve(p))
        };

        let errors = self
            .last_report
            .as_ref()
            .map(|r| r.field_errors(field_name).to_vec())
            .unwrap_or_default();

        Some(FieldView {
            field_name: field.field_name.clone(),
            component_kind: field.kind.as_str(),
            label: field.label().map(|l| self.resolve(l)),
            placeholder,
            description: field.description().map(|d| self.resolve(d)),
            value: self.values.get(field_name).cloned(),
            visible: self.visible.contains(field_name),
            required: field.is_required(),
            disabled: is_loading || is_truthy(field.props.get("disabled")),
            props,
            options,
            is_loading,
            options_error: state.and_then(|s| s.error.clone()),
            errors,
        })
    }

    /// Views of the visible fields, in declaration order.
    pub fn visible_views(&self) -> Vec<FieldView> {
        self.fields
            .iter()
            .filter(|f| self.visible.contains(&f.field_name))
            .filter_map(|f| self.field_view(&f.field_name))
            .collect()
    }

    // ── Submission ─────────────────────────────

    /// Validate the current values against the current schema.
    pub fn validate(&mut self) -> ValidationReport {
        let report = self.schema.validate(&self.values);
        self.last_report = Some(report.clone());
        report
    }

    /// Messages for one field under the current schema.
    pub fn validate_field(&self, field_name: &str) -> Vec<String> {
        self.schema.validate_field(field_name, &self.values)
    }

    /// Values of visible fields only.
    pub fn cleaned_values(&self) -> FormValues {
        self.values
            .iter()
            .filter(|(name, _)| self.visible.contains(*name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn validate_and_clean(&mut self) -> Result<FormValues, ValidationReport> {
        self.status = FormStatus::Validating;
        let report = self.validate();
        if !report.valid {
            self.status = FormStatus::Idle;
            return Err(report);
        }
        Ok(self.cleaned_values())
    }

    /// Validate and, on success, return the cleaned values.
    pub fn submit(&mut self) -> Result<FormValues, ValidationReport> {
        let cleaned = self.validate_and_clean()?;
        self.status = FormStatus::Submitted;
        Ok(cleaned)
    }

    /// Validate, then await `handler` with the cleaned values.
    ///
    /// A failing handler leaves the form `Idle` with its values intact and
    /// records the error; the submit can simply be retried.
    pub async fn submit_with<F, Fut>(&mut self, handler: F) -> Result<FormValues, SubmitError>
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future<Output = Result<(), CallbackError>>,
    {
        let cleaned = self.validate_and_clean().map_err(SubmitError::Invalid)?;
        match handler(cleaned.clone()).await {
            Ok(()) => {
                self.status = FormStatus::Submitted;
                self.last_error = None;
                Ok(cleaned)
            }
            Err(e) => {
                tracing::warn!(form = %self.id, error = %e, "submit handler failed");
                self.status = FormStatus::Idle;
                self.last_error = Some(e.message.clone());
                Err(SubmitError::Callback(e))
            }
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StaticOptionsFetcher;
    use crate::values::values_from_json;
    use formwork_interchange::parse_fields;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn loan_form() -> FormOrchestrator {
        let mut warnings = Vec::new();
        let raw = parse_fields(
            &json!([
                {
                    "fieldName": "hasLoan",
                    "componentKind": "checkbox",
                    "props": { "label": "Existing loan?" }
                },
                {
                    "fieldName": "loanAmount",
                    "componentKind": "number",
                    "props": {
                        "label": "Loan amount",
                        "validations": [
                            { "kind": "required", "messageRef": "errors.required" },
                            { "kind": "min", "parameter": 1, "messageRef": "errors.min" }
                        ]
                    },
                    "condition": { "fieldName": "hasLoan", "operator": "isTrue" }
                },
                {
                    "fieldName": "notes",
                    "componentKind": "textarea"
                }
            ]),
            &mut warnings,
        )
        .unwrap();
        FormOrchestrator::new("loan", &raw, &EngineContext::default())
    }

    #[test]
    fn has_loan_scenario() {
        let mut form = loan_form();
        assert!(!form.is_visible("loanAmount"));
        assert!(form.submit().is_ok());

        let change = form.set_value("hasLoan", json!(true));
        assert_eq!(change.shown, vec!["loanAmount"]);
        assert!(form.schema().covers("loanAmount"));

        let report = form.submit().unwrap_err();
        assert_eq!(report.field_errors("loanAmount"), ["errors.required"]);
        assert_eq!(form.status(), FormStatus::Idle);

        form.set_value("loanAmount", json!(5000));
        let cleaned = form.submit().unwrap();
        assert_eq!(cleaned["loanAmount"], json!(5000));
        assert_eq!(form.status(), FormStatus::Submitted);

        let change = form.set_value("hasLoan", json!(false));
        assert_eq!(change.hidden, vec!["loanAmount"]);
        let cleaned = form.submit().unwrap();
        assert!(!cleaned.contains_key("loanAmount"));
        // Hidden value is retained for when the field comes back.
        assert_eq!(form.value("loanAmount"), Some(&json!(5000)));
    }

    #[test]
    fn two_field_loan_submits_exact_values() {
        let mut warnings = Vec::new();
        let raw = parse_fields(
            &json!([
                { "fieldName": "hasLoan", "componentKind": "checkbox" },
                {
                    "fieldName": "loanAmount",
                    "componentKind": "number",
                    "props": {
                        "validations": [
                            { "kind": "required", "messageRef": "errors.required" },
                            { "kind": "min", "parameter": 1, "messageRef": "errors.min" }
                        ]
                    },
                    "condition": { "fieldName": "hasLoan", "operator": "isTrue" }
                }
            ]),
            &mut warnings,
        )
        .unwrap();
        let mut form = FormOrchestrator::new("loan", &raw, &EngineContext::default());

        assert_eq!(form.submit().unwrap(), values_from_json(&json!({ "hasLoan": false })));

        form.set_value("hasLoan", json!(true));
        let report = form.submit().unwrap_err();
        assert_eq!(
            report.errors,
            BTreeMap::from([("loanAmount".to_string(), vec!["errors.required".to_string()])])
        );

        form.set_value("loanAmount", json!(100));
        assert_eq!(
            form.submit().unwrap(),
            values_from_json(&json!({ "hasLoan": true, "loanAmount": 100 }))
        );
    }

    #[test]
    fn hidden_invalid_values_never_block_submit() {
        let mut form = loan_form();
        form.set_value("hasLoan", json!(true));
        form.set_value("loanAmount", json!(-3));
        assert!(form.submit().is_err());
        form.set_value("hasLoan", json!(false));
        let cleaned = form.submit().unwrap();
        assert_eq!(
            cleaned.keys().collect::<Vec<_>>(),
            vec!["hasLoan", "notes"]
        );
    }

    #[test]
    fn reset_restores_initial_values() {
        let mut form = loan_form();
        form.set_value("hasLoan", json!(true));
        form.set_value("notes", json!("hello"));
        let change = form.reset();
        assert_eq!(change.hidden, vec!["loanAmount"]);
        assert_eq!(form.value("hasLoan"), Some(&json!(false)));
        assert_eq!(form.value("notes"), Some(&json!("")));
        assert!(form.last_report().is_none());
    }

    #[test]
    fn field_view_reports_errors_after_validation() {
        let mut form = loan_form();
        form.set_value("hasLoan", json!(true));
        assert!(form.field_view("loanAmount").unwrap().errors.is_empty());
        form.validate();
        let view = form.field_view("loanAmount").unwrap();
        assert_eq!(view.label.as_deref(), Some("Loan amount"));
        assert!(view.required);
        assert!(view.visible);
        assert_eq!(view.errors, vec!["errors.required"]);
        assert!(form.field_view("ghost").is_none());
    }

    #[tokio::test]
    async fn submit_with_failure_is_retryable() {
        let mut form = loan_form();
        form.set_value("notes", json!("n"));

        let err = form
            .submit_with(|_| async { Err(CallbackError::new("backend down")) })
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Callback(_)));
        assert_eq!(form.status(), FormStatus::Idle);
        assert_eq!(form.last_error(), Some("backend down"));
        assert_eq!(form.value("notes"), Some(&json!("n")));

        let cleaned = form.submit_with(|_| async { Ok(()) }).await.unwrap();
        assert_eq!(cleaned["notes"], json!("n"));
        assert_eq!(form.status(), FormStatus::Submitted);
        assert!(form.last_error().is_none());
    }

    #[tokio::test]
    async fn submit_with_skips_handler_when_invalid() {
        let mut form = loan_form();
        form.set_value("hasLoan", json!(true));
        let mut called = false;
        let result = form
            .submit_with(|_| {
                called = true;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(SubmitError::Invalid(_))));
        assert!(!called);
    }

    #[tokio::test]
    async fn option_fields_load_and_merge_into_props() {
        let mut registry = OptionsRegistry::empty();
        registry.register(
            "cities",
            StaticOptionsFetcher::keyed(
                "country",
                [("VN".to_string(), vec![json!("Hanoi"), json!("Hue")])]
                    .into_iter()
                    .collect(),
            ),
        );
        let mut warnings = Vec::new();
        let raw = parse_fields(
            &json!([
                { "fieldName": "country", "componentKind": "select" },
                {
                    "fieldName": "city",
                    "componentKind": "select",
                    "props": {
                        "optionsFetcher": { "source": "cities", "dependsOn": ["country"] }
                    }
                }
            ]),
            &mut warnings,
        )
        .unwrap();
        let mut form = FormOrchestrator::new("geo", &raw, &EngineContext::new(registry));

        assert_eq!(form.refresh_options().await, 0);
        assert!(form.field_view("city").unwrap().options.unwrap().is_empty());

        let change = form.set_value("country", json!("VN"));
        assert_eq!(change.option_requests.len(), 1);
        let view = form.field_view("city").unwrap();
        assert!(view.is_loading);
        assert!(view.disabled);
        assert_eq!(view.placeholder.as_deref(), Some(LOADING_PLACEHOLDER_REF));

        assert_eq!(form.run_requests(change.option_requests).await, 1);
        let view = form.field_view("city").unwrap();
        assert!(!view.disabled);
        assert_eq!(view.options.as_ref().unwrap().len(), 2);
        assert_eq!(view.props["options"][0]["label"], json!("Hanoi"));
    }

    #[test]
    fn unknown_option_source_is_a_diagnostic() {
        let mut warnings = Vec::new();
        let raw = parse_fields(
            &json!([{
                "fieldName": "city",
                "componentKind": "select",
                "props": {
                    "options": [{ "value": "x", "label": "X" }],
                    "optionsFetcher": { "source": "missing" }
                }
            }]),
            &mut warnings,
        )
        .unwrap();
        let form = FormOrchestrator::new("geo", &raw, &EngineContext::default());
        assert_eq!(form.diagnostics().len(), 1);
        // Static options are kept.
        let options = form.field_view("city").unwrap().options.unwrap();
        assert_eq!(options, vec![SelectOption::new("x", "X")]);
    }
}
