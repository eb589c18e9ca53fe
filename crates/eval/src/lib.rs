//! formwork form engine: turns descriptor lists into live forms.
//!
//! Pipeline per value change: condition evaluation → visible set →
//! validation schema → option dependency check. Multi-step forms chain one
//! [`FormOrchestrator`] per step under a [`MultiStepForm`].
//!
//! The engine consumes the interchange types from `formwork-interchange`
//! (never raw JSON beyond [`load_document`]) and only performs I/O through
//! injected [`OptionsFetcher`]s and [`StateStore`](formwork_storage::StateStore)s.

pub mod condition;
pub mod diagnostics;
pub mod error;
pub mod fields;
pub mod form;
pub mod messages;
pub mod options;
pub mod schema;
pub mod steps;
pub mod values;

use std::collections::BTreeMap;
use std::sync::Arc;

use formwork_interchange::{from_interchange, FormDocument};
use formwork_storage::StateStore;

pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{CallbackError, EngineError};
pub use fields::{ComponentKind, FieldDescriptor};
pub use form::{EngineContext, FieldView, FormOrchestrator, FormStatus, SubmitError, ValueChange};
pub use messages::{KeyResolver, MessageCatalog, MessageResolver};
pub use options::{
    FetchError, OptionsCache, OptionsFetcher, OptionsRegistry, SelectOption, StaticOptionsFetcher,
};
pub use schema::{ValidationReport, ValidationSchema};
pub use steps::{
    BlockReason, MultiStepConfig, MultiStepForm, MultiStepState, Navigation, Progress,
    StepCallbacks,
};
pub use values::FormValues;

/// Parse a configuration document.
pub fn load_document(json: &serde_json::Value) -> Result<FormDocument, EngineError> {
    Ok(from_interchange(json)?)
}

/// Default context for a document: its inline `optionSources` registered
/// as static fetchers, key-echo messages, every component kind supported.
pub fn context_for(doc: &FormDocument) -> EngineContext {
    EngineContext::new(OptionsRegistry::from_sources(&doc.option_sources))
}

/// Build a single form from the document's first step (the whole form
/// when the document is not multi-step).
pub fn build_form(doc: &FormDocument, ctx: &EngineContext) -> Result<FormOrchestrator, EngineError> {
    let steps = doc.steps();
    let first = steps
        .first()
        .ok_or_else(|| EngineError::NoSteps(doc.id.clone()))?;
    Ok(FormOrchestrator::new(first.id.clone(), &first.fields, ctx))
}

/// Build a multi-step machine for the document (a single form becomes one
/// step), configured from the document's `settings`.
///
/// A store attached afterwards with `with_store` is read on the first
/// navigation; use [`open_steps`] to start from the saved state.
pub fn build_steps(doc: &FormDocument, ctx: &EngineContext) -> Result<MultiStepForm, EngineError> {
    MultiStepForm::new(
        doc.id.clone(),
        &doc.steps(),
        ctx,
        MultiStepConfig::from(&doc.settings),
    )
}

/// [`build_steps`] seeded from `store` before it is returned.
pub async fn open_steps(
    doc: &FormDocument,
    ctx: &EngineContext,
    store: Arc<dyn StateStore>,
) -> Result<MultiStepForm, EngineError> {
    MultiStepForm::open(
        doc.id.clone(),
        &doc.steps(),
        ctx,
        MultiStepConfig::from(&doc.settings),
        store,
    )
    .await
}

/// Every configuration diagnostic for a document: parse warnings, per-step
/// field problems, and field names reused across steps.
pub fn check_document(doc: &FormDocument, ctx: &EngineContext) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = doc
        .warnings
        .iter()
        .map(|w| Diagnostic::warn(DiagnosticKind::Parse, None, w.clone()))
        .collect();

    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    for step in doc.steps() {
        let form = FormOrchestrator::new(step.id.clone(), &step.fields, ctx);
        diagnostics.extend(form.diagnostics().iter().cloned());
        for field in form.fields() {
            match owners.get(&field.field_name) {
                Some(owner) => diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::DuplicateField,
                    Some(&field.field_name),
                    format!(
                        "field name also used in step '{}', step '{}' would overwrite it on submit",
                        owner, step.id
                    ),
                )),
                None => {
                    owners.insert(field.field_name.clone(), step.id.clone());
                }
            }
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_reports_cross_step_duplicates_and_parse_warnings() {
        let doc = load_document(&json!({
            "id": "dup",
            "steps": [
                { "id": "a", "title": "A", "fields": [
                    { "fieldName": "email", "componentKind": "email" },
                    { "componentKind": "text" }
                ]},
                { "id": "b", "title": "B", "fields": [
                    { "fieldName": "email", "componentKind": "email" }
                ]}
            ]
        }))
        .unwrap();
        let kinds: Vec<_> = check_document(&doc, &context_for(&doc))
            .into_iter()
            .map(|d| d.kind)
            .collect();
        assert_eq!(kinds, vec![DiagnosticKind::Parse, DiagnosticKind::DuplicateField]);
    }

    #[test]
    fn single_form_builds_as_one_step() {
        let doc = load_document(&json!([
            { "fieldName": "name", "componentKind": "text" }
        ]))
        .unwrap();
        let ctx = context_for(&doc);
        let form = build_form(&doc, &ctx).unwrap();
        assert_eq!(form.fields().len(), 1);
        let steps = build_steps(&doc, &ctx).unwrap();
        assert_eq!(steps.step_count(), 1);
        assert!(steps.is_last_step());
    }

    #[test]
    fn invalid_document_is_an_engine_error() {
        let err = load_document(&json!("nope")).unwrap_err();
        assert!(matches!(err, EngineError::Interchange(_)));
    }
}
