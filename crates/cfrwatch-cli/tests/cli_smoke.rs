use serde_json::{Value, json};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const ANNUAL_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CFRGRANULE><SUBPART>
<HD SOURCE="HED">Subpart C—Approved American Viticultural Areas</HD>
<SECTION><SECTNO>§ 9.21</SECTNO><SUBJECT>General.</SUBJECT></SECTION>
<SECTION><SECTNO>§ 9.12</SECTNO><SUBJECT>Santa Maria Valley.</SUBJECT><CITA>Jun 5 2021</CITA></SECTION>
<SECTION><SECTNO>§ 9.24</SECTNO><SUBJECT>Knights Valley.</SUBJECT><CITA>[T.D. ATF-128]</CITA></SECTION>
<SECTION><SECTNO>§ 9.25</SECTNO><SUBJECT>Shenandoah Valley.</SUBJECT><CITA>Authority: 27 CFR 9</CITA></SECTION>
</SUBPART></CFRGRANULE>"#;

fn run_cfrwatch<I, S>(cwd: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_cfrwatch");
    Command::new(bin)
        .args(args)
        .current_dir(cwd)
        .env_remove("CFRWATCH_LOG")
        .output()
        .expect("cfrwatch command should execute")
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}\nstderr:\n{}",
            stdout_text(output),
            stderr_text(output)
        )
    })
}

fn write_snapshot(dir: &Path, identifier: &str, fingerprint: &str) {
    fs::create_dir_all(dir).expect("snapshot dir should be created");
    let body = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {
                "cfr_index": identifier,
                "name": format!("Area {identifier}"),
                "cfr_revision_history": fingerprint,
            },
            "geometry": null
        }]
    });
    fs::write(
        dir.join(format!("{identifier}.geojson")),
        serde_json::to_vec(&body).expect("snapshot should serialize"),
    )
    .expect("snapshot should be written");
}

fn workspace() -> TempDir {
    let root = tempfile::tempdir().expect("temp dir should be created");
    fs::write(root.path().join("CFR-2021.xml"), ANNUAL_XML).expect("document should be written");
    root
}

#[test]
fn json_run_reports_updates_and_new_records() {
    let root = workspace();
    write_snapshot(&root.path().join("avas"), "9.12", "Jan 1 1990");
    write_snapshot(&root.path().join("tbd"), "9.24", "[T.D. ATF-128]");

    let output = run_cfrwatch(
        root.path(),
        ["2021", "--document", "CFR-2021.xml", "--json"],
    );
    assert_eq!(output.status.code(), Some(1), "stderr:\n{}", stderr_text(&output));

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["checkKind"], "cfrwatch.check.v1");
    assert_eq!(payload["result"], "rejected");
    assert_eq!(payload["shape"], "annual");
    assert_eq!(payload["recordCount"], 3);
    assert_eq!(payload["snapshotCount"], 2);
    assert_eq!(payload["watermark"], 24);
    assert_eq!(payload["updates"].as_array().map(Vec::len), Some(1));
    assert_eq!(payload["updates"][0]["identifier"], "9.12");
    assert_eq!(payload["updates"][0]["localFingerprint"], "Jan 1 1990");
    assert_eq!(payload["updates"][0]["remoteFingerprint"], "Jun 5 2021");
    assert_eq!(
        payload["newRecords"],
        json!([{ "identifier": "9.25", "name": "Shenandoah Valley" }])
    );
}

#[test]
fn in_sync_snapshots_exit_cleanly() {
    let root = workspace();
    let boundaries = root.path().join("boundaries");
    write_snapshot(&boundaries, "9.12", "Jun 5 2021");
    write_snapshot(&boundaries, "9.24", "[T.D. ATF-128]");
    write_snapshot(&boundaries, "9.25", "Authority: 27 CFR 9");

    let output = run_cfrwatch(
        root.path(),
        ["2021", "--document", "CFR-2021.xml", "--dir", "boundaries"],
    );
    assert!(output.status.success(), "stderr:\n{}", stderr_text(&output));
    let stdout = stdout_text(&output);
    assert!(stdout.contains("[cfrwatch] OK"), "stdout:\n{stdout}");
    assert!(stdout.contains("watermark=25"), "stdout:\n{stdout}");
}

#[test]
fn config_file_supplies_directories() {
    let root = workspace();
    write_snapshot(&root.path().join("final"), "9.25", "stale");
    fs::write(
        root.path().join("cfrwatch.toml"),
        "[snapshots]\ndirectories = [\"final\"]\n",
    )
    .expect("config should be written");

    let output = run_cfrwatch(root.path(), ["2021", "--document", "CFR-2021.xml"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = stdout_text(&output);
    assert!(
        stdout.contains("[cfrwatch] update available: 9.25 Area 9.25 -> final/9.25.geojson"),
        "stdout:\n{stdout}"
    );
    assert!(!stdout.contains("new record available"), "stdout:\n{stdout}");
}

#[test]
fn malformed_year_is_a_usage_error() {
    let root = workspace();
    for bad in ["21", "twenty", "20211"] {
        let output = run_cfrwatch(root.path(), [bad]);
        assert_eq!(output.status.code(), Some(2), "year {bad:?}");
        assert!(stderr_text(&output).contains("four-digit year required"));
        assert!(stdout_text(&output).is_empty());
    }
}

#[test]
fn unreadable_document_reports_single_error_and_no_findings() {
    let root = workspace();
    write_snapshot(&root.path().join("avas"), "9.12", "Jan 1 1990");

    let output = run_cfrwatch(root.path(), ["2021", "--document", "missing.xml"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout_text(&output).is_empty());
    let stderr = stderr_text(&output);
    assert_eq!(stderr.matches("error: transport:").count(), 1, "stderr:\n{stderr}");
}

#[test]
fn garbage_document_is_a_parse_error() {
    let root = workspace();
    fs::write(root.path().join("garbage.xml"), "<<<not xml").expect("garbage should be written");

    let output = run_cfrwatch(
        root.path(),
        ["2021", "--document", "garbage.xml", "--json"],
    );
    assert_eq!(output.status.code(), Some(2));
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["result"], "error");
    assert_eq!(payload["failureClasses"], json!(["cfr.parse"]));
}

#[test]
fn historical_shape_rejects_annual_document() {
    let root = workspace();
    let output = run_cfrwatch(root.path(), ["--document", "CFR-2021.xml"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_text(&output).contains("error: shape:"));
}
