//! Per-field option state with dependency gating and stale-result discard.
//!
//! The resolver never awaits. [`OptionsResolver::sync`] inspects the
//! current values and returns the fetches that are needed as
//! [`OptionsRequest`]s; the caller runs them (concurrently if it likes,
//! without holding any borrow of the resolver) and hands each
//! [`OptionsResponse`] back to [`OptionsResolver::apply`]. A response is
//! applied only if its cache key is still the last key requested for the
//! field, so a slow fetch for an old dependency value cannot overwrite the
//! options of a newer one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::cache::{cache_key, OptionsCache};
use super::{FetchError, OptionMapping, OptionsFetcher, OptionsRegistry, OptionsSpec, SelectOption};
use crate::diagnostics::Diagnostic;
use crate::fields::FieldDescriptor;
use crate::values::{is_truthy, FormValues};

/// Options state of one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOptionsState {
    pub options: Vec<SelectOption>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Cache key of the last fetch started (or served from cache).
    #[serde(skip)]
    pub requested_key: Option<String>,
}

/// A fetch the caller must run.
pub struct OptionsRequest {
    pub field_name: String,
    pub key: String,
    pub dependencies: FormValues,
    fetcher: Arc<dyn OptionsFetcher>,
    mapping: OptionMapping,
}

impl std::fmt::Debug for OptionsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionsRequest")
            .field("field_name", &self.field_name)
            .field("key", &self.key)
            .field("dependencies", &self.dependencies)
            .field("fetcher", &self.fetcher.fetcher_id())
            .finish()
    }
}

impl OptionsRequest {
    /// Fetch and transform. Consumes the request; borrows nothing else.
    pub async fn run(self) -> OptionsResponse {
        debug!(field = %self.field_name, key = %self.key, "fetching options");
        let result = self
            .fetcher
            .fetch(&self.dependencies)
            .await
            .map(|raw| self.fetcher.transform(raw, &self.mapping));
        OptionsResponse {
            field_name: self.field_name,
            key: self.key,
            result,
        }
    }
}

/// Outcome of a finished [`OptionsRequest`].
#[derive(Debug, Clone)]
pub struct OptionsResponse {
    pub field_name: String,
    pub key: String,
    pub result: Result<Vec<SelectOption>, FetchError>,
}

/// Options state for every field with an options binding.
#[derive(Debug, Clone)]
pub struct OptionsResolver {
    specs: BTreeMap<String, OptionsSpec>,
    states: BTreeMap<String, FieldOptionsState>,
    cache: OptionsCache,
}

impl OptionsResolver {
    pub fn new(specs: BTreeMap<String, OptionsSpec>, cache: OptionsCache) -> Self {
        let states = specs
            .keys()
            .map(|name| (name.clone(), FieldOptionsState::default()))
            .collect();
        OptionsResolver {
            specs,
            states,
            cache,
        }
    }

    /// Bind every descriptor that declares an `optionsFetcher`. Fields that
    /// reference an unregistered source are left out and reported.
    pub fn from_fields(
        fields: &[FieldDescriptor],
        registry: &OptionsRegistry,
        cache: OptionsCache,
    ) -> (Self, Vec<Diagnostic>) {
        let mut specs = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for field in fields {
            match registry.bind(field) {
                Ok(Some(spec)) => {
                    specs.insert(field.field_name.clone(), spec);
                }
                Ok(None) => {}
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        (OptionsResolver::new(specs, cache), diagnostics)
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.specs.contains_key(field_name)
    }

    pub fn spec(&self, field_name: &str) -> Option<&OptionsSpec> {
        self.specs.get(field_name)
    }

    pub fn state(&self, field_name: &str) -> Option<&FieldOptionsState> {
        self.states.get(field_name)
    }

    pub fn states(&self) -> &BTreeMap<String, FieldOptionsState> {
        &self.states
    }

    pub fn cache(&self) -> &OptionsCache {
        &self.cache
    }

    /// True while any field has a fetch in flight.
    pub fn is_loading(&self) -> bool {
        self.states.values().any(|s| s.is_loading)
    }

    /// Recompute the options state of every visible bound field.
    ///
    /// - a falsy or missing dependency empties the options, no fetch
    /// - an unchanged dependency key does nothing
    /// - a fresh cache entry is applied immediately
    /// - otherwise the field is marked loading and a request is returned
    pub fn sync(&mut self, values: &FormValues, visible: &BTreeSet<String>) -> Vec<OptionsRequest> {
        let mut requests = Vec::new();
        for (field_name, spec) in &self.specs {
            if !visible.contains(field_name) {
                continue;
            }
            let state = self.states.entry(field_name.clone()).or_default();

            if !spec.depends_on.iter().all(|dep| is_truthy(values.get(dep))) {
                if state.requested_key.is_some() || !state.options.is_empty() {
                    debug!(field = %field_name, "options dependencies not satisfied, clearing");
                }
                *state = FieldOptionsState::default();
                continue;
            }

            let dependencies: FormValues = spec
                .depends_on
                .iter()
                .filter_map(|dep| values.get(dep).map(|v| (dep.clone(), v.clone())))
                .collect();
            let key = cache_key(&spec.cache_prefix, &dependencies);
            if state.requested_key.as_deref() == Some(key.as_str()) {
                continue;
            }
            state.requested_key = Some(key.clone());

            if let Some(options) = self.cache.get(&key, spec.cache_duration) {
                debug!(field = %field_name, key = %key, "options served from cache");
                state.options = options;
                state.is_loading = false;
                state.error = None;
                continue;
            }

            state.is_loading = true;
            requests.push(OptionsRequest {
                field_name: field_name.clone(),
                key,
                dependencies,
                fetcher: Arc::clone(&spec.fetcher),
                mapping: spec.mapping.clone(),
            });
        }
        requests
    }

    /// Apply a finished fetch. Returns `false` if the response was stale
    /// (or for an unknown field) and was discarded.
    pub fn apply(&mut self, response: OptionsResponse) -> bool {
        let Some(state) = self.states.get_mut(&response.field_name) else {
            return false;
        };
        if state.requested_key.as_deref() != Some(response.key.as_str()) {
            debug!(
                field = %response.field_name,
                key = %response.key,
                "discarding stale options response"
            );
            return false;
        }
        state.is_loading = false;
        match response.result {
            Ok(options) => {
                if let Some(spec) = self.specs.get(&response.field_name) {
                    self.cache
                        .insert(response.key, options.clone(), spec.cache_duration);
                }
                state.options = options;
                state.error = None;
            }
            Err(e) => {
                warn!(field = %response.field_name, error = %e, "options fetch failed");
                state.error = Some(e.to_string());
            }
        }
        true
    }

    /// Forget the field's cached lists and last request so the next
    /// [`sync`](Self::sync) fetches again.
    pub fn invalidate(&mut self, field_name: &str) -> bool {
        let Some(spec) = self.specs.get(field_name) else {
            return false;
        };
        self.cache.invalidate_prefix(&spec.cache_prefix);
        if let Some(state) = self.states.get_mut(field_name) {
            state.requested_key = None;
        }
        true
    }

    /// Drop all per-field state (the shared cache is kept).
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            *state = FieldOptionsState::default();
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
