//! Non-fatal configuration diagnostics.
//!
//! Configuration problems (unknown component kinds, unknown validation
//! kinds, unknown condition operators, ...) never abort processing. Each
//! one is logged through `tracing` and collected here so callers (and the
//! CLI `check` command) can report them.

use std::fmt;

use serde::Serialize;

/// Category of a configuration diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A descriptor was skipped while parsing the document.
    Parse,
    /// The component kind is unknown or not supported by the renderer.
    UnsupportedComponent,
    /// A later descriptor reused an existing field name.
    DuplicateField,
    /// A validation rule kind is not recognized.
    UnknownValidation,
    /// A condition uses an unknown operator or logic combinator.
    UnknownConditionTag,
    /// A condition references a field that does not exist.
    UnknownConditionField,
    /// An options fetcher references an unregistered source.
    UnknownOptionSource,
}

/// One configuration diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic and log it as a warning.
    pub fn warn(kind: DiagnosticKind, field_name: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(kind = ?kind, field = field_name.unwrap_or("-"), "{}", message);
        Diagnostic {
            kind,
            field_name: field_name.map(|s| s.to_string()),
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field_name {
            Some(name) => write!(f, "field '{}': {}", name, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
