//! Typed structs representing the form configuration wire format.
//!
//! These mirror the JSON a backend (or a hand-authored file) produces.
//! Renderer-specific settings stay as an open `serde_json::Map` because
//! the engine never interprets them; only the shared subset (validations,
//! condition, options fetcher) is parsed into typed structs here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct FormDocument {
    /// Document identifier.
    pub id: String,
    pub title: Option<String>,
    /// Either a flat field list or an ordered list of steps.
    pub layout: FormLayout,
    /// Named static option sources declared inline in the document.
    pub option_sources: BTreeMap<String, OptionSourceDecl>,
    pub settings: FormSettings,
    /// Non-fatal problems found while parsing (skipped entries, etc.).
    pub warnings: Vec<String>,
}

impl FormDocument {
    /// All steps of the document. A single form is presented as one
    /// non-optional step whose id is the document id.
    pub fn steps(&self) -> Vec<StepDecl> {
        match &self.layout {
            FormLayout::Single(fields) => vec![StepDecl {
                id: self.id.clone(),
                title: self.title.clone().unwrap_or_else(|| self.id.clone()),
                description: None,
                fields: fields.clone(),
                optional: false,
            }],
            FormLayout::Steps(steps) => steps.clone(),
        }
    }

    pub fn is_multi_step(&self) -> bool {
        matches!(self.layout, FormLayout::Steps(_))
    }
}

/// Shape of the document body.
#[derive(Debug, Clone, PartialEq)]
pub enum FormLayout {
    Single(Vec<RawField>),
    Steps(Vec<StepDecl>),
}

/// One page of a multi-step form.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDecl {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<RawField>,
    /// Optional steps may be left without entering any data.
    pub optional: bool,
}

/// A field descriptor as it appears on the wire.
///
/// `component_kind` is kept as the raw tag; mapping it onto a supported
/// renderer kind (or dropping it) is the field processor's job.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub field_name: String,
    pub component_kind: String,
    /// Renderer-specific settings, minus the keys parsed below.
    pub props: serde_json::Map<String, serde_json::Value>,
    pub validations: Vec<RuleDecl>,
    pub condition: Option<ConditionExpression>,
    pub options_fetcher: Option<OptionsFetcherDecl>,
}

/// A declared validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDecl {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<serde_json::Value>,
    pub message_ref: String,
}

// ── Conditions ──────────────────────────────────────────────────────

/// A visibility expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpression {
    Rule(ConditionRule),
    Compound(CompoundCondition),
}

/// A single comparison against one field's current value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRule {
    pub field_name: String,
    pub operator: Operator,
    pub value: Option<serde_json::Value>,
    pub pattern: Option<String>,
}

/// A group of rules and nested groups combined with one logic operator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundCondition {
    pub logic: Logic,
    pub rules: Vec<ConditionRule>,
    pub nested: Vec<CompoundCondition>,
}

/// Logic combinator for compound conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
    /// True only when none of the group's results are true.
    Not,
    /// Unrecognized combinator, kept so evaluation can fail open.
    Unknown(String),
}

impl Logic {
    pub fn parse(tag: &str) -> Logic {
        match tag.to_ascii_uppercase().as_str() {
            "AND" => Logic::And,
            "OR" => Logic::Or,
            "NOT" => Logic::Not,
            _ => Logic::Unknown(tag.to_string()),
        }
    }
}

/// Comparison operator of a condition rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    In,
    NotIn,
    IncludesAll,
    IncludesAny,
    IsEmpty,
    IsNotEmpty,
    IsTrue,
    IsFalse,
    IsDefined,
    IsUndefined,
    /// Unrecognized operator tag. Evaluates to `true` with a warning.
    Unknown(String),
}

impl Operator {
    pub fn parse(tag: &str) -> Operator {
        match tag {
            "equals" => Operator::Equals,
            "notEquals" => Operator::NotEquals,
            "greaterThan" => Operator::GreaterThan,
            "greaterThanOrEqual" => Operator::GreaterThanOrEqual,
            "lessThan" => Operator::LessThan,
            "lessThanOrEqual" => Operator::LessThanOrEqual,
            "contains" => Operator::Contains,
            "startsWith" => Operator::StartsWith,
            "endsWith" => Operator::EndsWith,
            "matches" => Operator::Matches,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "includesAll" => Operator::IncludesAll,
            "includesAny" => Operator::IncludesAny,
            "isEmpty" => Operator::IsEmpty,
            "isNotEmpty" => Operator::IsNotEmpty,
            "isTrue" => Operator::IsTrue,
            "isFalse" => Operator::IsFalse,
            "isDefined" => Operator::IsDefined,
            "isUndefined" => Operator::IsUndefined,
            other => Operator::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqual => "greaterThanOrEqual",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqual => "lessThanOrEqual",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::Matches => "matches",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::IncludesAll => "includesAll",
            Operator::IncludesAny => "includesAny",
            Operator::IsEmpty => "isEmpty",
            Operator::IsNotEmpty => "isNotEmpty",
            Operator::IsTrue => "isTrue",
            Operator::IsFalse => "isFalse",
            Operator::IsDefined => "isDefined",
            Operator::IsUndefined => "isUndefined",
            Operator::Unknown(tag) => tag,
        }
    }
}

// ── Options ─────────────────────────────────────────────────────────

/// Default option cache lifetime in milliseconds (five minutes).
pub const DEFAULT_CACHE_DURATION_MS: u64 = 300_000;

/// `props.optionsFetcher`: binds a field to a named option source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsFetcherDecl {
    /// Name of the registered fetcher.
    pub source: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default = "default_cache_duration")]
    pub cache_duration: u64,
    #[serde(default = "default_value_key")]
    pub value_key: String,
    #[serde(default = "default_label_key")]
    pub label_key: String,
    #[serde(default = "default_disabled_key")]
    pub disabled_key: String,
}

fn default_cache_duration() -> u64 {
    DEFAULT_CACHE_DURATION_MS
}

fn default_value_key() -> String {
    "value".to_string()
}

fn default_label_key() -> String {
    "label".to_string()
}

fn default_disabled_key() -> String {
    "disabled".to_string()
}

/// An inline static option source (`optionSources.<name>`).
///
/// Either a fixed `options` list, or a `table` keyed by the string form
/// of the `by` dependency's value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSourceDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<String>,
    #[serde(default)]
    pub options: Vec<serde_json::Value>,
    #[serde(default)]
    pub table: BTreeMap<String, Vec<serde_json::Value>>,
}

// ── Settings ────────────────────────────────────────────────────────

/// Document-level engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSettings {
    #[serde(default = "default_true")]
    pub allow_back_navigation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_key: Option<String>,
    #[serde(default)]
    pub clear_on_complete: bool,
}

impl Default for FormSettings {
    fn default() -> Self {
        FormSettings {
            allow_back_navigation: true,
            persist_key: None,
            clear_on_complete: false,
        }
    }
}

fn default_true() -> bool {
    true
}
