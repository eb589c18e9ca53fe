use std::path::Path;
use std::process;

use formwork_eval::{check_document, FormOrchestrator};
use serde_json::json;

use crate::commands::load;
use crate::settings::CliSettings;
use crate::{print_json, OutputFormat};

pub(crate) fn cmd_check(
    config: &Path,
    strict: bool,
    settings: &CliSettings,
    output: OutputFormat,
    quiet: bool,
) {
    let (doc, ctx) = load(config, settings, output, quiet);
    let diagnostics = check_document(&doc, &ctx);

    let steps = doc.steps();
    let field_count: usize = steps
        .iter()
        .map(|s| FormOrchestrator::new(s.id.clone(), &s.fields, &ctx).fields().len())
        .sum();

    if !quiet {
        match output {
            OutputFormat::Json => print_json(&json!({
                "id": doc.id,
                "steps": steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                "fields": field_count,
                "diagnostics": diagnostics,
            })),
            OutputFormat::Text => {
                println!(
                    "{}: {} field(s) in {} step(s)",
                    doc.id,
                    field_count,
                    steps.len()
                );
                if diagnostics.is_empty() {
                    println!("  no problems found");
                } else {
                    for d in &diagnostics {
                        println!("  warning [{:?}]: {}", d.kind, d);
                    }
                    println!("  {} diagnostic(s)", diagnostics.len());
                }
            }
        }
    }

    if strict && !diagnostics.is_empty() {
        process::exit(1);
    }
}
