//! Validation schema generation.
//!
//! A [`ValidationSchema`] is built from the *currently visible* descriptors
//! only and is rebuilt whenever the visible set changes, so a hidden field
//! can never block a submission and a field that appears is validated from
//! that moment on.
//!
//! Rule kinds map onto check functions through a closed dispatch table
//! ([`ValidationKind::check`]). Unknown kinds, unusable parameters, and
//! invalid patterns are skipped with a warning; they never fail the build.

use std::collections::BTreeMap;

use formwork_interchange::RuleDecl;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::fields::FieldDescriptor;
use crate::messages::{MessageParams, MessageResolver};
use crate::values::{display_string, is_empty, to_number, value_length, values_equal, FormValues};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const URL_PATTERN: &str = r"^https?://[^\s/$.?#][^\s]*$";

// ──────────────────────────────────────────────
// Validation kinds
// ──────────────────────────────────────────────

/// Known validation rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    Required,
    MinLength,
    MaxLength,
    Min,
    Max,
    Pattern,
    Email,
    Url,
    Integer,
    Positive,
    MinItems,
    MaxItems,
    OneOf,
    MatchesField,
    MustBeTrue,
}

/// Inputs available to a check function.
pub struct CheckInput<'a> {
    pub value: Option<&'a Value>,
    pub parameter: Option<&'a Value>,
    pub regex: Option<&'a Regex>,
    /// All current values, for cross-field checks.
    pub values: &'a FormValues,
}

/// A check: `true` means the value passes.
pub type CheckFn = fn(&CheckInput<'_>) -> bool;

impl ValidationKind {
    pub fn parse(tag: &str) -> Option<ValidationKind> {
        let kind = match tag {
            "required" => ValidationKind::Required,
            "minLength" => ValidationKind::MinLength,
            "maxLength" => ValidationKind::MaxLength,
            "min" => ValidationKind::Min,
            "max" => ValidationKind::Max,
            "pattern" => ValidationKind::Pattern,
            "email" => ValidationKind::Email,
            "url" => ValidationKind::Url,
            "integer" => ValidationKind::Integer,
            "positive" => ValidationKind::Positive,
            "minItems" => ValidationKind::MinItems,
            "maxItems" => ValidationKind::MaxItems,
            "oneOf" => ValidationKind::OneOf,
            "matchesField" => ValidationKind::MatchesField,
            "mustBeTrue" => ValidationKind::MustBeTrue,
            _ => return None,
        };
        Some(kind)
    }

    /// Dispatch table: rule kind → check function.
    pub fn check(self) -> CheckFn {
        match self {
            ValidationKind::Required => check_required,
            ValidationKind::MinLength => check_min_length,
            ValidationKind::MaxLength => check_max_length,
            ValidationKind::Min => check_min,
            ValidationKind::Max => check_max,
            ValidationKind::Pattern | ValidationKind::Email | ValidationKind::Url => check_regex,
            ValidationKind::Integer => check_integer,
            ValidationKind::Positive => check_positive,
            ValidationKind::MinItems => check_min_items,
            ValidationKind::MaxItems => check_max_items,
            ValidationKind::OneOf => check_one_of,
            ValidationKind::MatchesField => check_matches_field,
            ValidationKind::MustBeTrue => check_must_be_true,
        }
    }

    /// Whether the check also runs when the value is empty. Every other
    /// check passes on empty values; presence is `required`'s job.
    pub fn runs_on_empty(self) -> bool {
        matches!(self, ValidationKind::Required | ValidationKind::MustBeTrue)
    }

    /// Validate the rule's parameter, returning why it is unusable.
    fn parameter_problem(self, parameter: Option<&Value>) -> Option<&'static str> {
        let numeric = || to_number(parameter).is_some();
        match self {
            ValidationKind::MinLength
            | ValidationKind::MaxLength
            | ValidationKind::Min
            | ValidationKind::Max
            | ValidationKind::MinItems
            | ValidationKind::MaxItems => (!numeric()).then_some("expects a numeric parameter"),
            ValidationKind::Pattern => (!matches!(parameter, Some(Value::String(_))))
                .then_some("expects a string pattern parameter"),
            ValidationKind::OneOf => (!matches!(parameter, Some(Value::Array(_))))
                .then_some("expects an array parameter"),
            ValidationKind::MatchesField => (!matches!(parameter, Some(Value::String(_))))
                .then_some("expects a field name parameter"),
            _ => None,
        }
    }
}

fn param_len(input: &CheckInput<'_>) -> Option<usize> {
    to_number(input.parameter).and_then(|d| {
        use rust_decimal::prelude::ToPrimitive;
        d.trunc().to_usize()
    })
}

fn length_of(value: Option<&Value>) -> usize {
    match value {
        Some(v) => value_length(v).unwrap_or_else(|| display_string(Some(v)).chars().count()),
        None => 0,
    }
}

fn check_required(input: &CheckInput<'_>) -> bool {
    !is_empty(input.value)
}

fn check_min_length(input: &CheckInput<'_>) -> bool {
    param_len(input).map_or(true, |min| length_of(input.value) >= min)
}

fn check_max_length(input: &CheckInput<'_>) -> bool {
    param_len(input).map_or(true, |max| length_of(input.value) <= max)
}

fn check_min(input: &CheckInput<'_>) -> bool {
    match (to_number(input.value), to_number(input.parameter)) {
        (Some(v), Some(min)) => v >= min,
        _ => false,
    }
}

fn check_max(input: &CheckInput<'_>) -> bool {
    match (to_number(input.value), to_number(input.parameter)) {
        (Some(v), Some(max)) => v <= max,
        _ => false,
    }
}

fn check_regex(input: &CheckInput<'_>) -> bool {
    match input.regex {
        Some(re) => re.is_match(&display_string(input.value)),
        None => true,
    }
}

fn check_integer(input: &CheckInput<'_>) -> bool {
    to_number(input.value).is_some_and(|v| v.fract().is_zero())
}

fn check_positive(input: &CheckInput<'_>) -> bool {
    to_number(input.value).is_some_and(|v| v > rust_decimal::Decimal::ZERO)
}

fn check_min_items(input: &CheckInput<'_>) -> bool {
    match (input.value, param_len(input)) {
        (Some(Value::Array(items)), Some(min)) => items.len() >= min,
        (_, None) => true,
        _ => false,
    }
}

fn check_max_items(input: &CheckInput<'_>) -> bool {
    match (input.value, param_len(input)) {
        (Some(Value::Array(items)), Some(max)) => items.len() <= max,
        (_, None) => true,
        _ => false,
    }
}

fn check_one_of(input: &CheckInput<'_>) -> bool {
    let Some(Value::Array(allowed)) = input.parameter else {
        return true;
    };
    let allowed_contains = |v: &Value| allowed.iter().any(|a| values_equal(Some(a), Some(v)));
    match input.value {
        Some(Value::Array(items)) => items.iter().all(allowed_contains),
        Some(v) => allowed_contains(v),
        None => false,
    }
}

fn check_matches_field(input: &CheckInput<'_>) -> bool {
    match input.parameter {
        Some(Value::String(other)) => values_equal(input.value, input.values.get(other)),
        _ => true,
    }
}

fn check_must_be_true(input: &CheckInput<'_>) -> bool {
    matches!(input.value, Some(Value::Bool(true)))
}

// ──────────────────────────────────────────────
// Schema
// ──────────────────────────────────────────────

/// One rule compiled against a field.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub kind: ValidationKind,
    pub parameter: Option<Value>,
    /// Resolved user-facing message.
    pub message: String,
    regex: Option<Regex>,
}

/// All compiled rules of one visible field.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub field_name: String,
    pub rules: Vec<CompiledRule>,
}

impl FieldSchema {
    /// Messages of the failing rules, in rule declaration order.
    pub fn validate(&self, values: &FormValues) -> Vec<String> {
        let value = values.get(&self.field_name);
        let empty = is_empty(value);
        self.rules
            .iter()
            .filter(|rule| !empty || rule.kind.runs_on_empty())
            .filter(|rule| {
                let input = CheckInput {
                    value,
                    parameter: rule.parameter.as_ref(),
                    regex: rule.regex.as_ref(),
                    values,
                };
                !(rule.kind.check())(&input)
            })
            .map(|rule| rule.message.clone())
            .collect()
    }
}

/// Outcome of running a schema against a value map.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Failing field → messages.
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn field_errors(&self, field_name: &str) -> &[String] {
        self.errors
            .get(field_name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// The validation contract for one visible-field set.
#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    fields: Vec<FieldSchema>,
}

impl ValidationSchema {
    /// Build a schema from the visible descriptors.
    pub fn build<'a, I>(visible: I, resolver: &dyn MessageResolver) -> ValidationSchema
    where
        I: IntoIterator<Item = &'a FieldDescriptor>,
    {
        let fields = visible
            .into_iter()
            .map(|field| FieldSchema {
                field_name: field.field_name.clone(),
                rules: field
                    .validations
                    .iter()
                    .filter_map(|rule| compile_rule(field, rule, resolver))
                    .collect(),
            })
            .collect();
        ValidationSchema { fields }
    }

    /// Run every field's rules against `values`.
    pub fn validate(&self, values: &FormValues) -> ValidationReport {
        let errors: BTreeMap<String, Vec<String>> = self
            .fields
            .iter()
            .filter_map(|field| {
                let messages = field.validate(values);
                (!messages.is_empty()).then(|| (field.field_name.clone(), messages))
            })
            .collect();
        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Validate a single field; empty if the field is not covered.
    pub fn validate_field(&self, field_name: &str, values: &FormValues) -> Vec<String> {
        self.fields
            .iter()
            .find(|f| f.field_name == field_name)
            .map(|f| f.validate(values))
            .unwrap_or_default()
    }

    /// Whether the schema covers the field (i.e. it was visible at build time).
    pub fn covers(&self, field_name: &str) -> bool {
        self.fields.iter().any(|f| f.field_name == field_name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field_name.as_str())
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
}

fn compile_rule(
    field: &FieldDescriptor,
    rule: &RuleDecl,
    resolver: &dyn MessageResolver,
) -> Option<CompiledRule> {
    let Some(kind) = ValidationKind::parse(&rule.kind) else {
        tracing::warn!(
            field = %field.field_name,
            kind = %rule.kind,
            "unknown validation kind ignored"
        );
        return None;
    };

    if let Some(problem) = kind.parameter_problem(rule.parameter.as_ref()) {
        tracing::warn!(
            field = %field.field_name,
            kind = %rule.kind,
            "validation rule skipped: {}",
            problem
        );
        return None;
    }

    let regex = match kind {
        ValidationKind::Pattern => {
            let pattern = rule.parameter.as_ref().and_then(|p| p.as_str()).unwrap_or("");
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(
                        field = %field.field_name,
                        pattern = %pattern,
                        error = %e,
                        "invalid validation pattern, rule skipped"
                    );
                    return None;
                }
            }
        }
        ValidationKind::Email => Regex::new(EMAIL_PATTERN).ok(),
        ValidationKind::Url => Regex::new(URL_PATTERN).ok(),
        _ => None,
    };

    let mut params = MessageParams::new();
    let label = field
        .label()
        .map(|l| resolver.resolve(l, &MessageParams::new()))
        .unwrap_or_else(|| field.field_name.clone());
    params.insert("field".to_string(), Value::String(label));
    if let Some(p) = &rule.parameter {
        params.insert("value".to_string(), p.clone());
    }

    Some(CompiledRule {
        kind,
        parameter: rule.parameter.clone(),
        message: resolver.resolve(&rule.message_ref, &params),
        regex,
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
