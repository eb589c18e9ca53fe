//! Static options fetcher, backed by inline `optionSources` entries.
//!
//! A source either carries one fixed list, or a table of lists keyed by the
//! string form of one dependency value (`by`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use formwork_interchange::OptionSourceDecl;
use serde_json::Value;

use super::{FetchError, OptionsFetcher};
use crate::values::{display_string, FormValues};

/// Fetcher that serves options from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticOptionsFetcher {
    by: Option<String>,
    options: Vec<Value>,
    table: BTreeMap<String, Vec<Value>>,
}

impl StaticOptionsFetcher {
    /// Always returns `options`.
    pub fn fixed(options: Vec<Value>) -> Self {
        StaticOptionsFetcher {
            by: None,
            options,
            table: BTreeMap::new(),
        }
    }

    /// Returns `table[str(dependencies[by])]`, or an empty list when the
    /// table has no entry for that value.
    pub fn keyed(by: impl Into<String>, table: BTreeMap<String, Vec<Value>>) -> Self {
        StaticOptionsFetcher {
            by: Some(by.into()),
            options: Vec::new(),
            table,
        }
    }

    pub fn from_decl(decl: &OptionSourceDecl) -> Self {
        match &decl.by {
            Some(by) => StaticOptionsFetcher::keyed(by.clone(), decl.table.clone()),
            None => StaticOptionsFetcher::fixed(decl.options.clone()),
        }
    }
}

#[async_trait]
impl OptionsFetcher for StaticOptionsFetcher {
    async fn fetch(&self, dependencies: &FormValues) -> Result<Vec<Value>, FetchError> {
        let Some(by) = &self.by else {
            return Ok(self.options.clone());
        };
        let key = display_string(dependencies.get(by));
        Ok(self.table.get(&key).cloned().unwrap_or_default())
    }

    fn fetcher_id(&self) -> &str {
        "static"
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
