use formwork_interchange::InterchangeError;

/// Errors that abort building an engine. Everything else (unknown kinds,
/// bad rules, failed fetches) is reported and skipped.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid form configuration: {0}")]
    Interchange(#[from] InterchangeError),

    #[error("form '{0}' has no steps")]
    NoSteps(String),

    #[error("step index {index} out of range (form has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },
}

/// Failure reported by a submit handler or step callback.
///
/// Never fatal: the form keeps its values and the action can be retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CallbackError {
    pub message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        CallbackError {
            message: message.into(),
        }
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        CallbackError { message }
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        CallbackError::new(message)
    }
}
