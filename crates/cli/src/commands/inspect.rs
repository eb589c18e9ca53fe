use std::path::Path;

use formwork_eval::values::{display_string, values_from_json};
use formwork_eval::FieldView;
use serde_json::json;

use crate::commands::{load, runtime, step_form};
use crate::settings::CliSettings;
use crate::{print_json, read_json, OutputFormat};

pub(crate) fn cmd_inspect(
    config: &Path,
    values: Option<&Path>,
    step: Option<&str>,
    settings: &CliSettings,
    output: OutputFormat,
    quiet: bool,
) {
    let (doc, ctx) = load(config, settings, output, quiet);
    let mut form = step_form(&doc, &ctx, step, output, quiet);
    if let Some(path) = values {
        form.load_values(&values_from_json(&read_json(path, "values", output, quiet)));
    }
    runtime(output, quiet).block_on(form.refresh_options());

    if quiet {
        return;
    }
    let views = form.visible_views();
    let hidden: Vec<&str> = form
        .fields()
        .iter()
        .map(|f| f.field_name.as_str())
        .filter(|name| !form.is_visible(name))
        .collect();

    match output {
        OutputFormat::Json => print_json(&json!({
            "step": form.id(),
            "visible": views,
            "hidden": hidden,
        })),
        OutputFormat::Text => {
            println!("{}: {} visible field(s)", form.id(), views.len());
            for view in &views {
                println!("  {}", describe(view));
                if let Some(options) = &view.options {
                    let labels: Vec<String> = options
                        .iter()
                        .map(|o| {
                            if o.disabled {
                                format!("{} (disabled)", o.label)
                            } else {
                                o.label.clone()
                            }
                        })
                        .collect();
                    println!("      options: {}", labels.join(", "));
                }
                if let Some(err) = &view.options_error {
                    println!("      options error: {}", err);
                }
            }
            if !hidden.is_empty() {
                println!("  hidden: {}", hidden.join(", "));
            }
        }
    }
}

fn describe(view: &FieldView) -> String {
    let mut line = format!("{} ({})", view.field_name, view.component_kind);
    if let Some(label) = &view.label {
        line.push_str(&format!(" \"{}\"", label));
    }
    if view.required {
        line.push_str(" required");
    }
    if view.value.is_some() {
        line.push_str(&format!(" = {}", display_string(view.value.as_ref())));
    }
    line
}
