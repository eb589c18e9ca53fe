use std::path::Path;
use std::process;

use formwork_eval::values::{values_from_json, values_to_json};
use serde_json::json;

use crate::commands::{load, runtime, step_form};
use crate::settings::CliSettings;
use crate::{print_json, read_json, OutputFormat};

pub(crate) fn cmd_submit(
    config: &Path,
    values: &Path,
    step: Option<&str>,
    settings: &CliSettings,
    output: OutputFormat,
    quiet: bool,
) {
    let (doc, ctx) = load(config, settings, output, quiet);
    let mut form = step_form(&doc, &ctx, step, output, quiet);
    form.load_values(&values_from_json(&read_json(values, "values", output, quiet)));
    runtime(output, quiet).block_on(form.refresh_options());

    match form.submit() {
        Ok(cleaned) => {
            if !quiet {
                match output {
                    OutputFormat::Json => print_json(&json!({
                        "valid": true,
                        "values": values_to_json(&cleaned),
                    })),
                    OutputFormat::Text => print_json(&values_to_json(&cleaned)),
                }
            }
        }
        Err(report) => {
            if !quiet {
                match output {
                    OutputFormat::Json => print_json(&report),
                    OutputFormat::Text => {
                        println!("{}: {} invalid field(s)", form.id(), report.errors.len());
                        for (field, messages) in &report.errors {
                            for message in messages {
                                println!("  {}: {}", field, message);
                            }
                        }
                    }
                }
            }
            process::exit(1);
        }
    }
}
