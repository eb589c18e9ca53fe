pub(crate) mod check;
pub(crate) mod inspect;
pub(crate) mod run;
pub(crate) mod submit;

use std::path::Path;
use std::process;
use std::sync::Arc;

use formwork_eval::{context_for, load_document, EngineContext, FormOrchestrator, MessageCatalog};
use formwork_interchange::FormDocument;

use crate::settings::CliSettings;
use crate::{read_json, report_error, OutputFormat};

/// Load a configuration document and the engine context for it: the
/// document's inline option sources plus the settings' message catalog.
pub(crate) fn load(
    config: &Path,
    settings: &CliSettings,
    output: OutputFormat,
    quiet: bool,
) -> (FormDocument, EngineContext) {
    let json = read_json(config, "config", output, quiet);
    let doc = match load_document(&json) {
        Ok(doc) => doc,
        Err(e) => {
            let msg = format!("error: {}: {}", config.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let mut ctx = context_for(&doc);
    if let Some(path) = &settings.messages {
        let catalog = MessageCatalog::from_json(&read_json(path, "messages", output, quiet));
        tracing::debug!(entries = catalog.len(), path = %path.display(), "message catalog loaded");
        ctx = ctx.with_messages(Arc::new(catalog));
    }
    (doc, ctx)
}

/// Build the form for `step` (by id), or the first step.
pub(crate) fn step_form(
    doc: &FormDocument,
    ctx: &EngineContext,
    step: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) -> FormOrchestrator {
    let steps = doc.steps();
    let found = match step {
        Some(id) => steps.iter().find(|s| s.id == id),
        None => steps.first(),
    };
    match found {
        Some(step) => FormOrchestrator::new(step.id.clone(), &step.fields, ctx),
        None => {
            let known: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
            let msg = match step {
                Some(id) => format!("error: unknown step '{}'. Steps: {}", id, known.join(", ")),
                None => format!("error: document '{}' has no steps", doc.id),
            };
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Current-thread runtime for the option fetches and store calls.
pub(crate) fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("error: failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    }
}
