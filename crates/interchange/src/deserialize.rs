//! Deserialization from configuration JSON into typed structs.
//!
//! The main entry point is [`from_interchange`], which takes a
//! `&serde_json::Value` and produces a [`FormDocument`].
//!
//! Parsing is lenient at the descriptor level: a malformed field, rule,
//! or condition is skipped and recorded in `FormDocument::warnings` so a
//! single bad entry never breaks the whole form. Only a document whose
//! field or step list is not an array is rejected outright.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::*;

/// Errors during configuration deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    /// The document is missing a required top-level field.
    MissingField { field: String },
    /// A step could not be read.
    StepError { id: String, message: String },
    /// The document structure is invalid.
    InvalidDocument(String),
}

impl fmt::Display for InterchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeError::MissingField { field } => {
                write!(f, "document missing required field: '{}'", field)
            }
            InterchangeError::StepError { id, message } => {
                write!(f, "step '{}': {}", id, message)
            }
            InterchangeError::InvalidDocument(msg) => {
                write!(f, "invalid document: {}", msg)
            }
        }
    }
}

impl std::error::Error for InterchangeError {}

/// Default document id used when the configuration is a bare field array.
pub const DEFAULT_FORM_ID: &str = "form";

/// Deserialize a configuration document into typed structs.
///
/// Accepts either an object (`{id, fields | steps, ...}`) or a bare array
/// of field descriptors, which is read as a single form.
pub fn from_interchange(doc: &serde_json::Value) -> Result<FormDocument, InterchangeError> {
    let mut warnings = Vec::new();

    if doc.is_array() {
        let fields = parse_fields(doc, &mut warnings)?;
        return Ok(FormDocument {
            id: DEFAULT_FORM_ID.to_string(),
            title: None,
            layout: FormLayout::Single(fields),
            option_sources: BTreeMap::new(),
            settings: FormSettings::default(),
            warnings,
        });
    }

    if !doc.is_object() {
        return Err(InterchangeError::InvalidDocument(
            "expected an object or an array of fields".to_string(),
        ));
    }

    let id = doc
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "id".to_string(),
        })?
        .to_string();

    let title = optional_str(doc, "title");

    let layout = if let Some(steps) = doc.get("steps") {
        let steps_arr = steps.as_array().ok_or_else(|| {
            InterchangeError::InvalidDocument("'steps' must be an array".to_string())
        })?;
        let mut parsed = Vec::with_capacity(steps_arr.len());
        for (index, step) in steps_arr.iter().enumerate() {
            if let Some(step) = parse_step(step, index, &mut warnings)? {
                parsed.push(step);
            }
        }
        FormLayout::Steps(parsed)
    } else {
        let fields = doc
            .get("fields")
            .ok_or_else(|| InterchangeError::MissingField {
                field: "fields".to_string(),
            })?;
        FormLayout::Single(parse_fields(fields, &mut warnings)?)
    };

    let option_sources = parse_option_sources(doc.get("optionSources"), &mut warnings);

    let settings = match doc.get("settings") {
        Some(raw) => serde_json::from_value(raw.clone()).unwrap_or_else(|e| {
            warnings.push(format!("settings ignored: {}", e));
            FormSettings::default()
        }),
        None => FormSettings::default(),
    };

    Ok(FormDocument {
        id,
        title,
        layout,
        option_sources,
        settings,
        warnings,
    })
}

/// Parse a field descriptor array.
///
/// Returns `InvalidDocument` if `value` is not an array. Entries that are
/// not usable descriptors are skipped with a warning.
pub fn parse_fields(
    value: &serde_json::Value,
    warnings: &mut Vec<String>,
) -> Result<Vec<RawField>, InterchangeError> {
    let arr = value.as_array().ok_or_else(|| {
        InterchangeError::InvalidDocument("field list must be an array".to_string())
    })?;

    let mut fields = Vec::with_capacity(arr.len());
    for (index, obj) in arr.iter().enumerate() {
        match parse_field(obj, warnings) {
            Some(field) => fields.push(field),
            None => warnings.push(format!("field #{} skipped: missing 'fieldName'", index)),
        }
    }
    Ok(fields)
}

/// Parse a standalone condition expression.
///
/// Returns `None` (with a warning) when the value is neither a rule nor a
/// compound group.
pub fn parse_condition(
    value: &serde_json::Value,
    warnings: &mut Vec<String>,
) -> Option<ConditionExpression> {
    if value.get("logic").is_some() {
        return parse_compound(value, warnings).map(ConditionExpression::Compound);
    }
    if value.get("fieldName").is_some() {
        return parse_condition_rule(value, warnings).map(ConditionExpression::Rule);
    }
    warnings.push("condition ignored: neither a rule nor a compound group".to_string());
    None
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn optional_str(obj: &serde_json::Value, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn parse_step(
    obj: &serde_json::Value,
    index: usize,
    warnings: &mut Vec<String>,
) -> Result<Option<StepDecl>, InterchangeError> {
    let Some(id) = optional_str(obj, "id") else {
        warnings.push(format!("step #{} skipped: missing 'id'", index));
        return Ok(None);
    };
    let title = optional_str(obj, "title").unwrap_or_else(|| id.clone());
    let description = optional_str(obj, "description");
    let optional = obj
        .get("optional")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let raw_fields = obj.get("fields").ok_or_else(|| InterchangeError::StepError {
        id: id.clone(),
        message: "missing 'fields'".to_string(),
    })?;
    let mut step_warnings = Vec::new();
    let fields = parse_fields(raw_fields, &mut step_warnings).map_err(|e| {
        InterchangeError::StepError {
            id: id.clone(),
            message: e.to_string(),
        }
    })?;
    warnings.extend(
        step_warnings
            .into_iter()
            .map(|w| format!("step '{}': {}", id, w)),
    );

    Ok(Some(StepDecl {
        id,
        title,
        description,
        fields,
        optional,
    }))
}

fn parse_field(obj: &serde_json::Value, warnings: &mut Vec<String>) -> Option<RawField> {
    let field_name = optional_str(obj, "fieldName")?;
    let component_kind = optional_str(obj, "componentKind").unwrap_or_default();

    let mut props = obj
        .get("props")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    // The shared subset may sit inside props or beside it; the outer one wins.
    let raw_validations = obj
        .get("validations")
        .cloned()
        .or_else(|| props.remove("validations"));
    props.remove("validations");
    let raw_condition = obj
        .get("condition")
        .cloned()
        .or_else(|| props.remove("condition"));
    props.remove("condition");
    let raw_fetcher = props.remove("optionsFetcher");

    let mut field_warnings = Vec::new();

    let validations = raw_validations
        .map(|v| parse_validations(&v, &mut field_warnings))
        .unwrap_or_default();

    let condition = raw_condition
        .filter(|c| !c.is_null())
        .and_then(|c| parse_condition(&c, &mut field_warnings));

    let options_fetcher = raw_fetcher.and_then(|raw| {
        serde_json::from_value::<OptionsFetcherDecl>(raw)
            .map_err(|e| field_warnings.push(format!("optionsFetcher ignored: {}", e)))
            .ok()
    });

    warnings.extend(
        field_warnings
            .into_iter()
            .map(|w| format!("field '{}': {}", field_name, w)),
    );

    Some(RawField {
        field_name,
        component_kind,
        props,
        validations,
        condition,
        options_fetcher,
    })
}

fn parse_validations(value: &serde_json::Value, warnings: &mut Vec<String>) -> Vec<RuleDecl> {
    let Some(arr) = value.as_array() else {
        warnings.push("'validations' must be an array".to_string());
        return Vec::new();
    };

    arr.iter()
        .filter_map(|rule| {
            let Some(kind) = optional_str(rule, "kind") else {
                warnings.push("validation rule skipped: missing 'kind'".to_string());
                return None;
            };
            let message_ref =
                optional_str(rule, "messageRef").unwrap_or_else(|| format!("validation.{}", kind));
            let parameter = rule.get("parameter").cloned();
            Some(RuleDecl {
                kind,
                parameter,
                message_ref,
            })
        })
        .collect()
}

fn parse_condition_rule(
    obj: &serde_json::Value,
    warnings: &mut Vec<String>,
) -> Option<ConditionRule> {
    let Some(field_name) = optional_str(obj, "fieldName") else {
        warnings.push("condition rule skipped: missing 'fieldName'".to_string());
        return None;
    };
    let operator = match obj.get("operator").and_then(|v| v.as_str()) {
        Some(tag) => Operator::parse(tag),
        None => Operator::Unknown(String::new()),
    };
    Some(ConditionRule {
        field_name,
        operator,
        value: obj.get("value").cloned(),
        pattern: optional_str(obj, "pattern"),
    })
}

fn parse_compound(
    obj: &serde_json::Value,
    warnings: &mut Vec<String>,
) -> Option<CompoundCondition> {
    let logic = match obj.get("logic").and_then(|v| v.as_str()) {
        Some(tag) => Logic::parse(tag),
        None => {
            warnings.push("compound condition skipped: 'logic' must be a string".to_string());
            return None;
        }
    };

    let rules = obj
        .get("rules")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|r| parse_condition_rule(r, warnings))
                .collect()
        })
        .unwrap_or_default();

    let nested = obj
        .get("nested")
        .and_then(|n| n.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|n| parse_compound(n, warnings))
                .collect()
        })
        .unwrap_or_default();

    Some(CompoundCondition {
        logic,
        rules,
        nested,
    })
}

fn parse_option_sources(
    value: Option<&serde_json::Value>,
    warnings: &mut Vec<String>,
) -> BTreeMap<String, OptionSourceDecl> {
    let Some(map) = value.and_then(|v| v.as_object()) else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(name, raw)| {
            serde_json::from_value::<OptionSourceDecl>(raw.clone())
                .map_err(|e| warnings.push(format!("option source '{}' ignored: {}", name, e)))
                .ok()
                .map(|decl| (name.clone(), decl))
        })
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
