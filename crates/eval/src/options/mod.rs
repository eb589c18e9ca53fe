//! Async option lists for select-like fields.
//!
//! - [`OptionsFetcher`]: fetches ONE raw option list from ONE source, given
//!   a snapshot of the field's dependency values
//! - [`OptionsRegistry`]: maps source names (as referenced by
//!   `props.optionsFetcher.source`) to fetchers and binds descriptors to
//!   an [`OptionsSpec`]
//! - [`OptionsResolver`]: per-field `{options, isLoading, error}` state with
//!   dependency gating over a shared TTL cache
//!
//! The fetcher receives the dependency snapshot as an argument and the cache
//! key is derived from the same snapshot. A resolved fetch is applied only
//! if its key is still the one last requested for that field.

pub mod cache;
pub mod resolver;
pub mod static_fetcher;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use formwork_interchange::OptionSourceDecl;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::fields::FieldDescriptor;
use crate::values::{display_string, FormValues};

pub use cache::{cache_key, OptionsCache};
pub use resolver::{FieldOptionsState, OptionsRequest, OptionsResolver, OptionsResponse};
pub use static_fetcher::StaticOptionsFetcher;

// ──────────────────────────────────────────────
// SelectOption
// ──────────────────────────────────────────────

/// One entry of an option list, as handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: Value,
    pub label: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        SelectOption {
            value: value.into(),
            label: label.into(),
            disabled: false,
        }
    }
}

/// Keys used by the default transform to read raw option objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMapping {
    pub value_key: String,
    pub label_key: String,
    pub disabled_key: String,
}

impl Default for OptionMapping {
    fn default() -> Self {
        OptionMapping {
            value_key: "value".to_string(),
            label_key: "label".to_string(),
            disabled_key: "disabled".to_string(),
        }
    }
}

/// Default raw → option transform.
///
/// Object items read `value_key` / `label_key` / `disabled_key` (a missing
/// label falls back to the value's string form; items without a value are
/// skipped). Scalar items become both value and label.
pub fn default_transform(raw: Vec<Value>, mapping: &OptionMapping) -> Vec<SelectOption> {
    raw.into_iter()
        .filter_map(|item| match item {
            Value::Object(mut obj) => {
                let value = obj.remove(&mapping.value_key)?;
                let label = obj
                    .get(&mapping.label_key)
                    .map(|l| display_string(Some(l)))
                    .unwrap_or_else(|| display_string(Some(&value)));
                let disabled = obj
                    .get(&mapping.disabled_key)
                    .and_then(|d| d.as_bool())
                    .unwrap_or(false);
                Some(SelectOption {
                    value,
                    label,
                    disabled,
                })
            }
            Value::Null => None,
            scalar => {
                let label = display_string(Some(&scalar));
                Some(SelectOption {
                    value: scalar,
                    label,
                    disabled: false,
                })
            }
        })
        .collect()
}

// ──────────────────────────────────────────────
// FetchError
// ──────────────────────────────────────────────

/// Errors a fetcher can report. Recorded per field, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The fetch itself failed (transport, remote error, ...).
    Failed { source_id: String, message: String },
    /// The payload could not be interpreted as an option list.
    InvalidPayload { source_id: String, message: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Failed { source_id, message } => {
                write!(f, "options fetch failed for source '{}': {}", source_id, message)
            }
            FetchError::InvalidPayload { source_id, message } => {
                write!(f, "invalid options payload from source '{}': {}", source_id, message)
            }
        }
    }
}

impl std::error::Error for FetchError {}

// ──────────────────────────────────────────────
// OptionsFetcher trait
// ──────────────────────────────────────────────

/// Fetches ONE raw option list from ONE source.
///
/// `dependencies` holds exactly the values of the field's `dependsOn`
/// fields at the moment the fetch was requested.
#[async_trait]
pub trait OptionsFetcher: Send + Sync {
    async fn fetch(&self, dependencies: &FormValues) -> Result<Vec<Value>, FetchError>;

    /// Turn the raw payload into options. Override for custom payloads.
    fn transform(&self, raw: Vec<Value>, mapping: &OptionMapping) -> Vec<SelectOption> {
        default_transform(raw, mapping)
    }

    /// Identifier of this fetcher implementation (e.g. "static").
    fn fetcher_id(&self) -> &str;
}

// ──────────────────────────────────────────────
// OptionsSpec
// ──────────────────────────────────────────────

/// A field's resolved options binding.
#[derive(Clone)]
pub struct OptionsSpec {
    pub source: String,
    pub fetcher: Arc<dyn OptionsFetcher>,
    /// Every one of these must hold a truthy value before fetching.
    pub depends_on: Vec<String>,
    /// Cache key prefix: the configured `cacheKey`, else the field name.
    pub cache_prefix: String,
    pub cache_duration: Duration,
    pub mapping: OptionMapping,
}

impl fmt::Debug for OptionsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsSpec")
            .field("source", &self.source)
            .field("fetcher", &self.fetcher.fetcher_id())
            .field("depends_on", &self.depends_on)
            .field("cache_prefix", &self.cache_prefix)
            .field("cache_duration", &self.cache_duration)
            .finish()
    }
}

// ──────────────────────────────────────────────
// OptionsRegistry
// ──────────────────────────────────────────────

/// Maps source names to fetchers.
#[derive(Clone, Default)]
pub struct OptionsRegistry {
    fetchers: HashMap<String, Arc<dyn OptionsFetcher>>,
}

impl OptionsRegistry {
    /// Create an empty registry (no fetchers registered).
    pub fn empty() -> Self {
        OptionsRegistry::default()
    }

    /// Build a registry of static fetchers from inline `optionSources`.
    pub fn from_sources<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a OptionSourceDecl)>,
    {
        let mut registry = OptionsRegistry::empty();
        for (name, decl) in sources {
            registry.register(name.clone(), StaticOptionsFetcher::from_decl(decl));
        }
        registry
    }

    /// Register (or replace) a fetcher under `source`.
    pub fn register<F>(&mut self, source: impl Into<String>, fetcher: F)
    where
        F: OptionsFetcher + 'static,
    {
        self.fetchers.insert(source.into(), Arc::new(fetcher));
    }

    /// Register an already shared fetcher.
    pub fn register_shared(&mut self, source: impl Into<String>, fetcher: Arc<dyn OptionsFetcher>) {
        self.fetchers.insert(source.into(), fetcher);
    }

    pub fn get(&self, source: &str) -> Option<Arc<dyn OptionsFetcher>> {
        self.fetchers.get(source).cloned()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.fetchers.contains_key(source)
    }

    /// Resolve a descriptor's `optionsFetcher` binding.
    ///
    /// `Ok(None)` when the field declares no fetcher; `Err` (a diagnostic)
    /// when it names a source that is not registered.
    pub fn bind(&self, field: &FieldDescriptor) -> Result<Option<OptionsSpec>, Diagnostic> {
        let Some(decl) = &field.options_fetcher else {
            return Ok(None);
        };
        let fetcher = self.get(&decl.source).ok_or_else(|| {
            Diagnostic::warn(
                DiagnosticKind::UnknownOptionSource,
                Some(&field.field_name),
                format!(
                    "options source '{}' is not registered, static options kept",
                    decl.source
                ),
            )
        })?;
        Ok(Some(OptionsSpec {
            source: decl.source.clone(),
            fetcher,
            depends_on: decl.depends_on.clone(),
            cache_prefix: decl
                .cache_key
                .clone()
                .unwrap_or_else(|| field.field_name.clone()),
            cache_duration: Duration::from_millis(decl.cache_duration),
            mapping: OptionMapping {
                value_key: decl.value_key.clone(),
                label_key: decl.label_key.clone(),
                disabled_key: decl.disabled_key.clone(),
            },
        }))
    }
}

impl fmt::Debug for OptionsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.fetchers.keys().collect();
        names.sort();
        f.debug_struct("OptionsRegistry")
            .field("sources", &names)
            .finish()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ComponentKind;
    use formwork_interchange::OptionsFetcherDecl;
    use serde_json::{json, Map};

    #[test]
    fn default_transform_maps_objects_and_scalars() {
        let raw = vec![
            json!({ "id": 1, "name": "One", "inactive": true }),
            json!({ "id": 2 }),
            json!({ "name": "no id" }),
            json!("three"),
            json!(null),
        ];
        let mapping = OptionMapping {
            value_key: "id".to_string(),
            label_key: "name".to_string(),
            disabled_key: "inactive".to_string(),
        };
        let options = default_transform(raw, &mapping);
        assert_eq!(
            options,
            vec![
                SelectOption {
                    value: json!(1),
                    label: "One".to_string(),
                    disabled: true
                },
                SelectOption::new(2, "2"),
                SelectOption::new("three", "three"),
            ]
        );
    }

    fn select_with_fetcher(source: &str, cache_key: Option<&str>) -> FieldDescriptor {
        FieldDescriptor {
            field_name: "city".to_string(),
            kind: ComponentKind::Select,
            props: Map::new(),
            validations: vec![],
            condition: None,
            options_fetcher: Some(OptionsFetcherDecl {
                source: source.to_string(),
                depends_on: vec!["country".to_string()],
                cache_key: cache_key.map(|s| s.to_string()),
                cache_duration: 1_000,
                value_key: "value".to_string(),
                label_key: "label".to_string(),
                disabled_key: "disabled".to_string(),
            }),
        }
    }

    #[test]
    fn bind_resolves_registered_sources() {
        let mut registry = OptionsRegistry::empty();
        registry.register("cities", StaticOptionsFetcher::fixed(vec![json!("Hanoi")]));

        let spec = registry
            .bind(&select_with_fetcher("cities", Some("geo")))
            .unwrap()
            .unwrap();
        assert_eq!(spec.cache_prefix, "geo");
        assert_eq!(spec.cache_duration, Duration::from_millis(1_000));
        assert_eq!(spec.depends_on, vec!["country"]);

        let spec = registry
            .bind(&select_with_fetcher("cities", None))
            .unwrap()
            .unwrap();
        assert_eq!(spec.cache_prefix, "city");
    }

    #[test]
    fn bind_reports_unknown_sources() {
        let registry = OptionsRegistry::empty();
        let err = registry
            .bind(&select_with_fetcher("nowhere", None))
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::UnknownOptionSource);
    }
}
