//! Optional TOML settings file for the CLI.
//!
//! ```toml
//! store_dir = ".formwork"
//! persist_key = "onboarding-v1"
//! messages = "fixtures/messages.en.json"
//! allow_back_navigation = false
//! ```

use std::path::{Path, PathBuf};

use formwork_eval::MultiStepConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CliSettings {
    /// Directory for persisted multi-step progress.
    pub store_dir: Option<PathBuf>,
    /// Persistence key, overriding the document's `persistKey`.
    pub persist_key: Option<String>,
    /// JSON message catalog used to resolve labels and validation messages.
    pub messages: Option<PathBuf>,
    pub allow_back_navigation: Option<bool>,
}

impl CliSettings {
    pub fn load(path: &Path) -> Result<Self, String> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| format!("error: cannot read settings file {}: {}", path.display(), e))?;
        Self::parse(&src).map_err(|e| format!("error: invalid settings in {}: {}", path.display(), e))
    }

    fn parse(src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(src)
    }

    /// Apply these settings over a document's multi-step configuration.
    pub fn apply(&self, mut config: MultiStepConfig) -> MultiStepConfig {
        if let Some(key) = &self.persist_key {
            config.persist_key = Some(key.clone());
        }
        if let Some(allow) = self.allow_back_navigation {
            config.allow_back_navigation = allow;
        }
        config
    }
}
