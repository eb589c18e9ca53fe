//! Field configuration processing.
//!
//! Turns raw wire descriptors into resolved [`FieldDescriptor`]s:
//! 1. Drop descriptors whose component kind is unknown or unsupported by
//!    the renderer (one diagnostic per drop).
//! 2. Merge each descriptor's props over the per-kind default props.
//! 3. Compute the initial value of every field.
//!
//! The result is the single source of truth for every downstream stage.

use std::collections::BTreeSet;

use formwork_interchange::{ConditionExpression, OptionsFetcherDecl, RawField, RuleDecl};
use serde_json::{json, Map, Value};

use crate::condition::{self, referenced_fields, unknown_tags};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::schema::ValidationKind;
use crate::values::FormValues;

// ──────────────────────────────────────────────
// Component kinds
// ──────────────────────────────────────────────

/// Renderer kinds the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Text,
    TextArea,
    Email,
    Password,
    Phone,
    Number,
    Currency,
    Slider,
    Select,
    MultiSelect,
    Radio,
    Checkbox,
    Switch,
    Date,
    File,
    IdentityCapture,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 16] = [
        ComponentKind::Text,
        ComponentKind::TextArea,
        ComponentKind::Email,
        ComponentKind::Password,
        ComponentKind::Phone,
        ComponentKind::Number,
        ComponentKind::Currency,
        ComponentKind::Slider,
        ComponentKind::Select,
        ComponentKind::MultiSelect,
        ComponentKind::Radio,
        ComponentKind::Checkbox,
        ComponentKind::Switch,
        ComponentKind::Date,
        ComponentKind::File,
        ComponentKind::IdentityCapture,
    ];

    pub fn parse(tag: &str) -> Option<ComponentKind> {
        ComponentKind::ALL.into_iter().find(|k| k.as_str() == tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Text => "text",
            ComponentKind::TextArea => "textarea",
            ComponentKind::Email => "email",
            ComponentKind::Password => "password",
            ComponentKind::Phone => "phone",
            ComponentKind::Number => "number",
            ComponentKind::Currency => "currency",
            ComponentKind::Slider => "slider",
            ComponentKind::Select => "select",
            ComponentKind::MultiSelect => "multiSelect",
            ComponentKind::Radio => "radio",
            ComponentKind::Checkbox => "checkbox",
            ComponentKind::Switch => "switch",
            ComponentKind::Date => "date",
            ComponentKind::File => "file",
            ComponentKind::IdentityCapture => "identityCapture",
        }
    }

    /// Kinds whose value is a boolean toggle.
    pub fn is_boolean(self) -> bool {
        matches!(self, ComponentKind::Checkbox | ComponentKind::Switch)
    }

    /// Kinds that pick a number from a bounded range.
    pub fn is_numeric_range(self) -> bool {
        matches!(self, ComponentKind::Slider)
    }

    /// Kinds that choose from an option list.
    pub fn has_options(self) -> bool {
        matches!(
            self,
            ComponentKind::Select | ComponentKind::MultiSelect | ComponentKind::Radio
        )
    }

    /// Default props for this kind; descriptor props are merged over these.
    pub fn default_props(self) -> Map<String, Value> {
        let defaults = match self {
            ComponentKind::Text => json!({ "inputType": "text" }),
            ComponentKind::TextArea => json!({ "rows": 4 }),
            ComponentKind::Email => json!({ "inputType": "email", "autoComplete": "email" }),
            ComponentKind::Password => {
                json!({ "inputType": "password", "autoComplete": "current-password" })
            }
            ComponentKind::Phone => json!({ "inputType": "tel", "autoComplete": "tel" }),
            ComponentKind::Number => json!({ "step": 1 }),
            ComponentKind::Currency => json!({ "currency": "USD", "precision": 2 }),
            ComponentKind::Slider => json!({ "min": 0, "max": 100, "step": 1 }),
            ComponentKind::Select => json!({ "options": [], "clearable": true }),
            ComponentKind::MultiSelect => json!({ "options": [] }),
            ComponentKind::Radio => json!({ "options": [], "orientation": "vertical" }),
            ComponentKind::Checkbox | ComponentKind::Switch => json!({}),
            ComponentKind::Date => json!({ "format": "YYYY-MM-DD" }),
            ComponentKind::File => json!({ "multiple": false, "accept": "*/*" }),
            ComponentKind::IdentityCapture => json!({ "captureMode": "document" }),
        };
        match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

// ──────────────────────────────────────────────
// Resolved descriptor
// ──────────────────────────────────────────────

/// A fully resolved field descriptor. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub field_name: String,
    pub kind: ComponentKind,
    /// Kind defaults merged with the descriptor's own props.
    pub props: Map<String, Value>,
    pub validations: Vec<RuleDecl>,
    pub condition: Option<ConditionExpression>,
    pub options_fetcher: Option<OptionsFetcherDecl>,
}

impl FieldDescriptor {
    /// Label message reference, if any.
    pub fn label(&self) -> Option<&str> {
        self.prop_str("label")
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.prop_str("placeholder")
    }

    pub fn description(&self) -> Option<&str> {
        self.prop_str("description")
    }

    fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(|v| v.as_str())
    }

    pub fn is_required(&self) -> bool {
        self.validations
            .iter()
            .any(|r| ValidationKind::parse(&r.kind) == Some(ValidationKind::Required))
    }

    /// Whether the field is visible for the given values.
    pub fn is_visible(&self, values: &FormValues) -> bool {
        condition::is_visible(self.condition.as_ref(), values)
    }

    /// Initial value, or `None` for "untouched" (absent from the map).
    pub fn initial_value(&self) -> Option<Value> {
        if self.kind.is_boolean() {
            return Some(Value::Bool(false));
        }
        if self.kind.is_numeric_range() {
            return Some(match self.props.get("defaultValue") {
                Some(v @ Value::Number(_)) => v.clone(),
                _ => json!(0),
            });
        }
        match self.props.get("defaultValue") {
            Some(v) if !v.is_null() => return Some(v.clone()),
            _ => {}
        }
        if self.is_required() {
            return None;
        }
        if self.kind == ComponentKind::MultiSelect {
            return Some(Value::Array(Vec::new()));
        }
        Some(Value::String(String::new()))
    }
}

// ──────────────────────────────────────────────
// Processing
// ──────────────────────────────────────────────

/// Output of [`process_fields`].
#[derive(Debug, Clone)]
pub struct ProcessedFields {
    /// Resolved descriptors in declaration order.
    pub fields: Vec<FieldDescriptor>,
    /// Initial value per field; "untouched" fields are absent.
    pub initial_values: FormValues,
    /// Fields visible under the initial values.
    pub initially_visible: BTreeSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Capability check that accepts every known component kind.
pub fn all_supported(_kind: ComponentKind) -> bool {
    true
}

/// Resolve raw descriptors.
///
/// `is_supported` is the renderer's capability check; a known kind it
/// rejects is dropped exactly like an unknown tag.
pub fn process_fields<F>(raw: &[RawField], is_supported: F) -> ProcessedFields
where
    F: Fn(ComponentKind) -> bool,
{
    let mut diagnostics = Vec::new();
    let mut fields: Vec<FieldDescriptor> = Vec::with_capacity(raw.len());
    let mut seen = BTreeSet::new();

    for decl in raw {
        let name = decl.field_name.as_str();

        let kind = match ComponentKind::parse(&decl.component_kind) {
            Some(kind) if is_supported(kind) => kind,
            Some(kind) => {
                diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::UnsupportedComponent,
                    Some(name),
                    format!("component kind '{}' is not supported, field dropped", kind.as_str()),
                ));
                continue;
            }
            None => {
                diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::UnsupportedComponent,
                    Some(name),
                    format!("unknown component kind '{}', field dropped", decl.component_kind),
                ));
                continue;
            }
        };

        if !seen.insert(decl.field_name.clone()) {
            diagnostics.push(Diagnostic::warn(
                DiagnosticKind::DuplicateField,
                Some(name),
                "duplicate field name, later descriptor dropped",
            ));
            continue;
        }

        for rule in &decl.validations {
            if ValidationKind::parse(&rule.kind).is_none() {
                diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::UnknownValidation,
                    Some(name),
                    format!("unknown validation kind '{}' will be ignored", rule.kind),
                ));
            }
        }

        if let Some(cond) = &decl.condition {
            for tag in unknown_tags(cond) {
                diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::UnknownConditionTag,
                    Some(name),
                    format!("condition uses unknown {}, it evaluates as visible", tag),
                ));
            }
        }

        let mut props = kind.default_props();
        for (key, value) in &decl.props {
            props.insert(key.clone(), value.clone());
        }

        fields.push(FieldDescriptor {
            field_name: decl.field_name.clone(),
            kind,
            props,
            validations: decl.validations.clone(),
            condition: decl.condition.clone(),
            options_fetcher: decl.options_fetcher.clone(),
        });
    }

    for field in &fields {
        let Some(cond) = &field.condition else {
            continue;
        };
        for referenced in referenced_fields(cond) {
            if !seen.contains(&referenced) {
                diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::UnknownConditionField,
                    Some(&field.field_name),
                    format!("condition references unknown field '{}'", referenced),
                ));
            }
        }
    }

    let initial_values: FormValues = fields
        .iter()
        .filter_map(|f| f.initial_value().map(|v| (f.field_name.clone(), v)))
        .collect();

    let initially_visible = fields
        .iter()
        .filter(|f| f.is_visible(&initial_values))
        .map(|f| f.field_name.clone())
        .collect();

    ProcessedFields {
        fields,
        initial_values,
        initially_visible,
        diagnostics,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
