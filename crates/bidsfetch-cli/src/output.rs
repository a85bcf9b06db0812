use atty::Stream;
use bidsfetch_core::{format_status_message, to_json_response, CommandStatus, ExecutionOutcome};
use color_eyre::Result;
use serde_json::Value;

use crate::style::Style;

const LABEL_WIDTH: usize = 12;
/// Keys listed individually before collapsing into a count.
const MAX_LISTED_KEYS: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub quiet: bool,
    pub json: bool,
    pub no_color: bool,
}

/// Prints the outcome and returns the process exit code.
pub fn emit_output(options: OutputOptions, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();

    if options.json {
        let payload = to_json_response(outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    let message = format_status_message(&outcome.message);
    if options.quiet {
        if outcome.status != CommandStatus::Ok {
            eprintln!("{message}");
        }
        return Ok(code);
    }

    let style = Style::new(options.no_color, atty::is(Stream::Stdout));
    println!("{}", style.status(&outcome.status, &message));
    for line in render_details(&style, &outcome.details) {
        println!("{line}");
    }
    Ok(code)
}

fn render_details(style: &Style, details: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(jobs) = details.get("jobs").and_then(Value::as_array) {
        for job in jobs {
            render_job(style, job, &mut lines);
        }
    }
    if let Some(retry) = details.get("retry").and_then(Value::as_str) {
        lines.push(style.info(&format!("Hint: retry with `{retry}`")));
    } else if let Some(hint) = hint_from_details(details) {
        lines.push(style.info(&format!("Hint: {hint}")));
    }
    lines
}

fn render_job(style: &Style, job: &Value, lines: &mut Vec<String>) {
    let hierarchy = str_field(job, "hierarchy");
    let remote = str_field(job, "remote");
    let local = str_field(job, "local_root");
    let label = style.label(hierarchy, LABEL_WIDTH);

    if let Some(error) = job.get("error") {
        let message = error.get("message").and_then(Value::as_str).unwrap_or("failed");
        lines.push(format!("  {label}{}", style.error(message)));
        return;
    }

    let count = |key: &str| job.get(key).and_then(Value::as_u64).unwrap_or(0);
    let planned = job
        .get("planned")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let tally = if planned.is_empty() {
        format!(
            "{} copied ({}), {} up to date",
            count("copied"),
            format_bytes(count("bytes_copied")),
            count("skipped")
        )
    } else {
        format!("{} to copy, {} up to date", planned.len(), count("skipped"))
    };
    lines.push(format!(
        "  {label}{remote} → {local}  {}",
        style.dim(&format!("({tally})"))
    ));

    let keys: Vec<&str> = planned.iter().filter_map(Value::as_str).collect();
    push_keys(lines, "would copy", &keys);

    if let Some(unmatched) = job.get("unmatched_patterns").and_then(Value::as_array) {
        let patterns: Vec<&str> = unmatched.iter().filter_map(Value::as_str).collect();
        if !patterns.is_empty() {
            lines.push(style.warning(&format!(
                "    no remote match for: {}",
                patterns.join(", ")
            )));
        }
    }

    if let Some(failures) = job.get("failures").and_then(Value::as_array) {
        for failure in failures {
            lines.push(style.error(&format!(
                "    failed {}: {}",
                str_field(failure, "key"),
                str_field(failure, "reason")
            )));
        }
    }
}

fn push_keys(lines: &mut Vec<String>, verb: &str, keys: &[&str]) {
    for key in keys.iter().take(MAX_LISTED_KEYS) {
        lines.push(format!("    {verb} {key}"));
    }
    if keys.len() > MAX_LISTED_KEYS {
        lines.push(format!("    … and {} more", keys.len() - MAX_LISTED_KEYS));
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("?")
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
