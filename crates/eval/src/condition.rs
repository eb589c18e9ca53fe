//! Visibility condition evaluator.
//!
//! Evaluates a [`ConditionExpression`] against the current form values.
//! Evaluation is pure and total: every operator yields a boolean for any
//! input, including missing values. Two situations fail open (yield
//! `true`, logged as a warning) so a configuration mistake never hides a
//! field permanently:
//!
//! - an unrecognized operator or logic combinator
//! - a rule that cannot be evaluated, e.g. a malformed `matches` pattern
//!
//! Compound groups collect the result of every direct rule and every
//! nested group, then combine them: `AND` is all-true, `OR` is any-true,
//! and `NOT` is none-true. For a single-rule group `NOT` is plain negation;
//! for larger groups it means "none of the group", not "negate the AND".

use std::collections::BTreeSet;

use formwork_interchange::{CompoundCondition, ConditionExpression, ConditionRule, Logic, Operator};
use regex::Regex;
use serde_json::Value;

use crate::values::{display_string, is_empty, to_number, values_equal, FormValues};

/// A rule that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("invalid pattern '{pattern}' for field '{field_name}': {message}")]
    InvalidPattern {
        field_name: String,
        pattern: String,
        message: String,
    },
}

/// Evaluate a condition expression. Never fails.
pub fn evaluate(expr: &ConditionExpression, values: &FormValues) -> bool {
    match expr {
        ConditionExpression::Rule(rule) => evaluate_rule(rule, values),
        ConditionExpression::Compound(group) => evaluate_compound(group, values),
    }
}

/// Evaluate an optional condition; an absent condition is always true.
pub fn is_visible(condition: Option<&ConditionExpression>, values: &FormValues) -> bool {
    condition.map_or(true, |c| evaluate(c, values))
}

/// Evaluate a single rule, failing open on errors and unknown operators.
pub fn evaluate_rule(rule: &ConditionRule, values: &FormValues) -> bool {
    match eval_rule(rule, values) {
        Ok(Some(result)) => result,
        Ok(None) => {
            tracing::warn!(
                field = %rule.field_name,
                operator = %rule.operator.as_str(),
                "unknown condition operator, treating condition as true"
            );
            true
        }
        Err(err) => {
            tracing::warn!(error = %err, "condition evaluation failed, treating as true");
            true
        }
    }
}

/// Evaluate a compound group.
pub fn evaluate_compound(group: &CompoundCondition, values: &FormValues) -> bool {
    let results: Vec<bool> = group
        .rules
        .iter()
        .map(|rule| evaluate_rule(rule, values))
        .chain(group.nested.iter().map(|n| evaluate_compound(n, values)))
        .collect();

    match &group.logic {
        Logic::And => results.iter().all(|r| *r),
        Logic::Or => results.iter().any(|r| *r),
        Logic::Not => !results.iter().any(|r| *r),
        Logic::Unknown(tag) => {
            tracing::warn!(logic = %tag, "unknown condition logic, treating condition as true");
            true
        }
    }
}

/// Evaluate a rule. `Ok(None)` signals an unknown operator.
fn eval_rule(rule: &ConditionRule, values: &FormValues) -> Result<Option<bool>, ConditionError> {
    let field = values.get(&rule.field_name);
    let expected = rule.value.as_ref();

    let result = match &rule.operator {
        Operator::Equals => values_equal(field, expected),
        Operator::NotEquals => !values_equal(field, expected),

        Operator::GreaterThan => compare(field, expected, |a, b| a > b),
        Operator::GreaterThanOrEqual => compare(field, expected, |a, b| a >= b),
        Operator::LessThan => compare(field, expected, |a, b| a < b),
        Operator::LessThanOrEqual => compare(field, expected, |a, b| a <= b),

        Operator::Contains => match field {
            Some(Value::Array(items)) => items.iter().any(|item| values_equal(Some(item), expected)),
            Some(Value::String(s)) => expected.is_some() && s.contains(&display_string(expected)),
            _ => false,
        },
        Operator::StartsWith => match field {
            Some(Value::String(s)) => {
                expected.is_some() && s.starts_with(&display_string(expected))
            }
            _ => false,
        },
        Operator::EndsWith => match field {
            Some(Value::String(s)) => expected.is_some() && s.ends_with(&display_string(expected)),
            _ => false,
        },
        Operator::Matches => {
            let pattern = match (&rule.pattern, expected) {
                (Some(p), _) => p.clone(),
                (None, Some(Value::String(p))) => p.clone(),
                _ => return Ok(Some(false)),
            };
            let re = Regex::new(&pattern).map_err(|e| ConditionError::InvalidPattern {
                field_name: rule.field_name.clone(),
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            match field {
                None | Some(Value::Null) => false,
                Some(v) => re.is_match(&display_string(Some(v))),
            }
        }

        Operator::In => match expected {
            Some(Value::Array(items)) => items.iter().any(|item| values_equal(field, Some(item))),
            _ => false,
        },
        Operator::NotIn => match expected {
            Some(Value::Array(items)) => !items.iter().any(|item| values_equal(field, Some(item))),
            _ => true,
        },

        Operator::IncludesAll => match (field, expected) {
            (Some(Value::Array(have)), Some(Value::Array(want))) => want
                .iter()
                .all(|w| have.iter().any(|h| values_equal(Some(h), Some(w)))),
            _ => false,
        },
        Operator::IncludesAny => match (field, expected) {
            (Some(Value::Array(have)), Some(Value::Array(want))) => want
                .iter()
                .any(|w| have.iter().any(|h| values_equal(Some(h), Some(w)))),
            _ => false,
        },

        Operator::IsEmpty => is_empty(field),
        Operator::IsNotEmpty => !is_empty(field),
        Operator::IsTrue => matches!(field, Some(Value::Bool(true))),
        Operator::IsFalse => matches!(field, Some(Value::Bool(false))),
        Operator::IsDefined => !matches!(field, None | Some(Value::Null)),
        Operator::IsUndefined => matches!(field, None | Some(Value::Null)),

        Operator::Unknown(_) => return Ok(None),
    };

    Ok(Some(result))
}

fn compare(
    left: Option<&Value>,
    right: Option<&Value>,
    op: impl Fn(rust_decimal::Decimal, rust_decimal::Decimal) -> bool,
) -> bool {
    match (to_number(left), to_number(right)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// Field names an expression reads.
pub fn referenced_fields(expr: &ConditionExpression) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    match expr {
        ConditionExpression::Rule(rule) => {
            out.insert(rule.field_name.clone());
        }
        ConditionExpression::Compound(group) => collect_group_fields(group, &mut out),
    }
    out
}

fn collect_group_fields(group: &CompoundCondition, out: &mut BTreeSet<String>) {
    for rule in &group.rules {
        out.insert(rule.field_name.clone());
    }
    for nested in &group.nested {
        collect_group_fields(nested, out);
    }
}

/// Unknown operator and logic tags used anywhere in an expression.
pub fn unknown_tags(expr: &ConditionExpression) -> Vec<String> {
    let mut out = Vec::new();
    match expr {
        ConditionExpression::Rule(rule) => push_unknown_operator(rule, &mut out),
        ConditionExpression::Compound(group) => collect_unknown_tags(group, &mut out),
    }
    out
}

fn push_unknown_operator(rule: &ConditionRule, out: &mut Vec<String>) {
    if let Operator::Unknown(tag) = &rule.operator {
        out.push(format!("operator '{}'", tag));
    }
}

fn collect_unknown_tags(group: &CompoundCondition, out: &mut Vec<String>) {
    if let Logic::Unknown(tag) = &group.logic {
        out.push(format!("logic '{}'", tag));
    }
    for rule in &group.rules {
        push_unknown_operator(rule, out);
    }
    for nested in &group.nested {
        collect_unknown_tags(nested, out);
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
