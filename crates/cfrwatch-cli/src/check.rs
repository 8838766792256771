use crate::cli::Cli;
use cfrwatch_core::{
    CheckConfig, CheckError, CheckOptions, CheckReport, DocumentFetcher, DocumentRequest,
    FileFetcher, HttpFetcher, run_check,
};
use serde_json::{Value, json};
use tracing::debug;

const CHECK_KIND: &str = "cfrwatch.check.v1";
const FAILURE_CLASS_UPDATE: &str = "cfr.update_available";
const FAILURE_CLASS_NEW: &str = "cfr.new_record";

fn exit_with_error(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(2);
}

fn load_config(args: &Cli) -> CheckConfig {
    let mut config = CheckConfig::load_or_default(args.config.as_deref())
        .unwrap_or_else(|err| exit_with_error(err));
    if !args.dirs.is_empty() {
        config.snapshots.directories = args.dirs.clone();
    }
    if let Some(selection) = args.selection {
        config.snapshots.selection = selection;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.source.timeout_secs = timeout_secs;
    }
    config.validate().unwrap_or_else(|err| exit_with_error(err));
    config
}

fn failure_classes(report: &CheckReport) -> Vec<&'static str> {
    let mut classes = Vec::new();
    if !report.updates.is_empty() {
        classes.push(FAILURE_CLASS_UPDATE);
    }
    if !report.new_records.is_empty() {
        classes.push(FAILURE_CLASS_NEW);
    }
    classes
}

pub fn render_json(report: &CheckReport) -> Value {
    json!({
        "schema": 1,
        "checkKind": CHECK_KIND,
        "result": if report.has_findings() { "rejected" } else { "accepted" },
        "failureClasses": failure_classes(report),
        "shape": report.shape,
        "source": report.source,
        "recordCount": report.record_count,
        "directories": report.directories,
        "snapshotCount": report.snapshot_count,
        "watermark": report.watermark,
        "updates": report.updates,
        "newRecords": report.new_records,
    })
}

fn render_error_json(err: &CheckError) -> Value {
    json!({
        "schema": 1,
        "checkKind": CHECK_KIND,
        "result": "error",
        "failureClasses": [format!("cfr.{}", err.class())],
        "error": err.to_string(),
    })
}

pub fn render_text(report: &CheckReport) -> String {
    let mut lines = Vec::new();
    for update in &report.updates {
        lines.push(format!(
            "[cfrwatch] update available: {} {} -> {}",
            update.identifier,
            update.name,
            update.path.display()
        ));
        lines.push(format!("    local:  {}", update.local_fingerprint));
        lines.push(format!("    remote: {}", update.remote_fingerprint));
    }
    for record in &report.new_records {
        lines.push(format!(
            "[cfrwatch] new record available: {} {}",
            record.identifier, record.name
        ));
    }

    let counts = format!(
        "shape={}, records={}, snapshots={}, watermark={}",
        report.shape,
        report.record_count,
        report.snapshot_count,
        report.watermark.value()
    );
    if report.has_findings() {
        lines.push(format!(
            "[cfrwatch] FAIL ({counts}, updates={}, new={})",
            report.updates.len(),
            report.new_records.len()
        ));
    } else {
        lines.push(format!("[cfrwatch] OK ({counts})"));
    }
    lines.join("\n")
}

fn print_json(payload: &Value) {
    let rendered = serde_json::to_string_pretty(payload).unwrap_or_else(|err| {
        eprintln!("error: failed to render check payload: {err}");
        std::process::exit(2);
    });
    println!("{rendered}");
}

pub fn run(args: Cli) {
    let config = load_config(&args);
    let request = DocumentRequest::for_year(&config.source, args.year.as_deref())
        .unwrap_or_else(|err| exit_with_error(err));

    let fetcher: Box<dyn DocumentFetcher> = match &args.document {
        Some(_) => Box::new(FileFetcher),
        None => Box::new(HttpFetcher::new(config.source.timeout())),
    };
    let request = match &args.document {
        Some(path) => request.with_location(path.display().to_string()),
        None => request,
    };
    let options = CheckOptions::from_config(&config.snapshots);

    let report = match run_check(fetcher.as_ref(), &request, &options) {
        Ok(report) => report,
        Err(err) => {
            debug!(class = err.class(), "check aborted");
            if args.json {
                print_json(&render_error_json(&err));
            }
            eprintln!("error: {}: {err}", err.class());
            std::process::exit(2);
        }
    };

    if args.json {
        print_json(&render_json(&report));
    } else {
        println!("{}", render_text(&report));
    }

    if report.has_findings() {
        std::process::exit(1);
    }
}
