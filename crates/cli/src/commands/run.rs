use std::collections::BTreeMap;
use std::path::Path;
use std::process;
use std::sync::Arc;

use formwork_eval::values::{values_from_json, FormValues};
use formwork_eval::{MultiStepConfig, MultiStepForm, Navigation, ValidationReport};
use formwork_storage::FileStore;
use serde::Serialize;
use serde_json::Value;

use crate::commands::{load, runtime};
use crate::settings::CliSettings;
use crate::{print_json, read_json, report_error, OutputFormat};

/// One submitted step.
#[derive(Debug, Serialize)]
struct Transition {
    step: String,
    result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    id: String,
    resumed: bool,
    transitions: Vec<Transition>,
    current_step: String,
    complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<String, FormValues>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub(crate) fn cmd_run(
    config: &Path,
    answers: &Path,
    max_steps: Option<usize>,
    settings: &CliSettings,
    output: OutputFormat,
    quiet: bool,
) {
    let (doc, ctx) = load(config, settings, output, quiet);
    let answers = read_json(answers, "answers", output, quiet);
    let Value::Object(answers) = answers else {
        report_error(
            "error: answers must be a JSON object keyed by step id",
            output,
            quiet,
        );
        process::exit(1);
    };

    let step_config = settings.apply(MultiStepConfig::from(&doc.settings));
    let mut flow = match MultiStepForm::new(doc.id.clone(), &doc.steps(), &ctx, step_config) {
        Ok(flow) => flow,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    if let Some(dir) = &settings.store_dir {
        flow = flow.with_store(Arc::new(FileStore::new(dir)));
    }

    let limit = max_steps.unwrap_or(flow.step_count());
    let summary = runtime(output, quiet).block_on(drive(&flow, &answers, limit));
    let failed = summary.rejected.is_some() || summary.error.is_some();

    if !quiet {
        match output {
            OutputFormat::Json => print_json(&summary),
            OutputFormat::Text => print_text(&summary),
        }
    }
    if failed {
        process::exit(1);
    }
}

/// Restore saved progress, then submit up to `limit` steps with their
/// answers.
async fn drive(
    flow: &MultiStepForm,
    answers: &serde_json::Map<String, Value>,
    limit: usize,
) -> RunSummary {
    let resumed = flow.restore().await;
    let mut summary = RunSummary {
        id: flow.id().to_string(),
        resumed,
        transitions: Vec::new(),
        current_step: String::new(),
        complete: false,
        data: None,
        rejected: None,
        error: None,
    };

    for _ in 0..limit {
        let index = flow.current_step();
        let step_id = flow.steps()[index].id.clone();
        if let Some(values) = answers.get(&step_id) {
            let change = flow.with_current(|form| form.load_values(&values_from_json(values)));
            flow.run_requests(index, change.option_requests).await;
        }

        match flow.go_to_next_step().await {
            Navigation::Advanced { to, .. } => summary.transitions.push(Transition {
                step: step_id,
                result: "advanced",
                next: Some(flow.steps()[to].id.clone()),
            }),
            Navigation::Completed { data } => {
                summary.transitions.push(Transition {
                    step: step_id,
                    result: "completed",
                    next: None,
                });
                summary.complete = true;
                summary.data = Some(data);
                break;
            }
            Navigation::Rejected(report) => {
                summary.transitions.push(Transition {
                    step: step_id,
                    result: "rejected",
                    next: None,
                });
                summary.rejected = Some(report);
                break;
            }
            Navigation::Blocked(reason) => {
                summary.error = Some(format!("step '{}' blocked: {:?}", step_id, reason));
                break;
            }
            Navigation::Busy => {
                summary.error = Some("another transition is in progress".to_string());
                break;
            }
            Navigation::Failed(message) => {
                summary.error = Some(message);
                break;
            }
            // go_to_next_step never moves without submitting.
            Navigation::Moved { .. } => {}
        }
    }

    if let Some(e) = flow.state().last_error {
        tracing::warn!(form = %summary.id, error = %e, "flow finished with an error recorded");
    }
    summary.current_step = flow.steps()[flow.current_step()].id.clone();
    summary
}

fn print_text(summary: &RunSummary) {
    if summary.resumed {
        println!("{}: resumed saved progress", summary.id);
    }
    for t in &summary.transitions {
        match &t.next {
            Some(next) => println!("  {}: {} to {}", t.step, t.result, next),
            None => println!("  {}: {}", t.step, t.result),
        }
    }
    if let Some(report) = &summary.rejected {
        for (field, messages) in &report.errors {
            for message in messages {
                println!("    {}: {}", field, message);
            }
        }
    }
    if let Some(error) = &summary.error {
        println!("  error: {}", error);
    }
    if let Some(data) = &summary.data {
        print_json(data);
    } else if !summary.complete {
        println!("{}: stopped at step {}", summary.id, summary.current_step);
    }
}
