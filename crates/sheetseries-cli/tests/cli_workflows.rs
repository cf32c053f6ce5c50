#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const READINGS: &str = "\
DATE,TIME,ITEM,Temp,Humidity
2024-01-01,09:00:00,A,20.5,40
2024-01-01,10:00:00,A,21,42
2024-01-01,11:00:00,B,21.5,45
2024-01-01,12:00:00,B,22.25,47
2024-01-01,13:00:00,A,23,50
";

fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_sheetseries")
}

fn cli() -> Command {
    Command::new(cli_bin())
}

fn write_csv(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join("readings.csv");
    std::fs::write(&path, READINGS)?;
    Ok(path)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[test]
fn inspect_prints_schema_and_preview() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_csv(tmp.path())?;

    cli()
        .args(["inspect", "--csv", "--max-rows", "2", "--file"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("rows: 5"))
        .stdout(predicate::str::contains("Temp: number"))
        .stdout(predicate::str::contains("DATE: date"))
        .stdout(predicate::str::contains("Preview"))
        .stdout(predicate::str::contains("(3 more rows)"));
    Ok(())
}

#[test]
fn chart_prints_per_metric_specs() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_csv(tmp.path())?;

    let output = cli()
        .args([
            "chart",
            "--csv",
            "--date-column",
            "DATE",
            "--time-column",
            "TIME",
            "--drop-sources",
            "--id-column",
            "ITEM",
            "--file",
        ])
        .arg(&csv)
        .output()?;
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let specs: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let specs = specs.as_array().ok_or("spec array")?;
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0]["x"], "DateTime");
    assert_eq!(specs[0]["y"][0], "Temp");
    assert_eq!(specs[1]["y"][0], "Humidity");
    assert_eq!(specs[1]["slot"], 1);
    assert_eq!(specs[0]["width"], 700);
    Ok(())
}

#[test]
fn chart_writes_specs_and_filtered_data() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_csv(tmp.path())?;
    let specs_path = tmp.path().join("specs.json");
    let data_path = tmp.path().join("data.csv");

    cli()
        .args([
            "chart",
            "--csv",
            "--date-column",
            "DATE",
            "--time-column",
            "TIME",
            "--start",
            "2024-01-01 10:00",
            "--end",
            "2024-01-01 12:00",
            "--metric",
            "Humidity",
            "--color",
            "ITEM",
            "--marker-row",
            "1",
            "--output",
            &path_arg(&specs_path),
            "--data-out",
            &path_arg(&data_path),
            "--file",
        ])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote:"));

    let specs: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&specs_path)?)?;
    assert_eq!(specs[0]["color"], "ITEM");
    assert_eq!(specs[0]["marker"], "2024-01-01T11:00:00");

    let data = std::fs::read_to_string(&data_path)?;
    let lines: Vec<&str> = data.lines().collect();
    assert_eq!(lines.len(), 4, "header plus three rows:\n{data}");
    assert_eq!(lines[0], "DateTime,Humidity,ITEM");
    Ok(())
}

#[test]
fn config_file_supplies_pipeline_and_flags_override() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_csv(tmp.path())?;
    let config = tmp.path().join("pipeline.json");
    std::fs::write(
        &config,
        r#"{
            "load": {"format": "csv"},
            "timestamp": {"source": {"kind": "split", "date": "DATE", "time": "TIME"}},
            "metrics": {"kind": "numeric"},
            "layout": {"mode": "combined", "width": 500}
        }"#,
    )?;

    let output = cli()
        .args(["chart", "--width", "640", "--title", "Climate", "--config"])
        .arg(&config)
        .arg("--file")
        .arg(&csv)
        .output()?;
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let specs: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(specs.as_array().map(Vec::len), Some(1));
    assert_eq!(specs[0]["y"], serde_json::json!(["Temp", "Humidity"]));
    assert_eq!(specs[0]["y_title"], "value");
    assert_eq!(specs[0]["width"], 640);
    assert_eq!(specs[0]["title"], "Climate");
    Ok(())
}

#[test]
fn missing_column_is_reported_with_exit_code_one() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_csv(tmp.path())?;

    cli()
        .args([
            "chart",
            "--csv",
            "--date-column",
            "Date",
            "--time-column",
            "Time",
            "--file",
        ])
        .arg(&csv)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Missing column(s): Date, Time"));
    Ok(())
}

#[test]
fn empty_text_filter_match_is_an_error() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_csv(tmp.path())?;

    cli()
        .args([
            "chart",
            "--csv",
            "--datetime-column",
            "DATE",
            "--filter",
            "wind",
            "--file",
        ])
        .arg(&csv)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No series selected"));
    Ok(())
}

#[test]
fn unreadable_inputs_fail_cleanly() -> TestResult {
    let tmp = TempDir::new()?;
    let bogus = tmp.path().join("notes.txt");
    std::fs::write(&bogus, "just some text")?;

    cli()
        .args(["inspect", "--file"])
        .arg(&bogus)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unreadable file"));

    cli()
        .args(["inspect", "--file"])
        .arg(tmp.path().join("absent.xlsx"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found or not readable"));

    let csv = write_csv(tmp.path())?;
    cli()
        .args(["chart", "--csv", "--start", "soon", "--file"])
        .arg(&csv)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid --start 'soon'"));
    Ok(())
}
