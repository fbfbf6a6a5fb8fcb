//! Integration tests for the FCT CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Helper to get an fct command
fn fct() -> Command {
    Command::cargo_bin("fct").unwrap()
}

/// Helper to create a test project in a temp directory
fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fct().current_dir(tmp.path()).arg("init").assert().success();
    tmp
}

/// Run a command with `--format id` and return the single line it prints
fn create_id(tmp: &TempDir, args: &[&str]) -> String {
    let output = fct()
        .current_dir(tmp.path())
        .args(args)
        .args(["--format", "id"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A job on one site with two assets, a calibrated meter and an IR form
struct Fixture {
    tmp: TempDir,
    meter: String,
    form: String,
}

fn setup_fixture() -> Fixture {
    let tmp = setup_test_project();
    create_id(&tmp, &["asset", "new", "--label", "DB-1", "--site", "Main St"]);
    create_id(&tmp, &["asset", "new", "--label", "DB-2", "--site", "Main St"]);
    create_id(&tmp, &["asset", "new", "--label", "Pump", "--site", "Depot"]);
    fct()
        .current_dir(tmp.path())
        .args(["job", "new", "--id", "J-1", "--title", "Annual", "--site", "Main St"])
        .assert()
        .success();
    let meter = create_id(
        &tmp,
        &["meter", "new", "--name", "Megger MFT1741", "--serial", "101174"],
    );
    let form = create_id(
        &tmp,
        &[
            "form",
            "new",
            "--title",
            "Insulation resistance",
            "--unit",
            "MΩ",
            "--pass-threshold",
            "1",
        ],
    );
    Fixture { tmp, meter, form }
}

/// Start and instantiate a submission; returns the submission ID and the
/// per-asset instance IDs
fn start_submission(fx: &Fixture) -> (String, Vec<String>) {
    let sub = create_id(&fx.tmp, &["sub", "start", "--job", "J-1", "--form", &fx.form]);
    let output = fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "instantiate", &sub, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let outcome: Value = serde_json::from_slice(&output.stdout).unwrap();
    let per_asset = outcome["instances"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|i| i.get("asset_id").is_some())
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect();
    (sub, per_asset)
}

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_init_creates_project_structure() {
    let tmp = TempDir::new().unwrap();
    fct()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    assert!(tmp.path().join(".fct/config.yaml").is_file());
    for dir in ["forms", "assets", "jobs", "meters", "exports"] {
        assert!(tmp.path().join(dir).is_dir(), "{} missing", dir);
    }
}

#[test]
fn test_init_twice_requires_force() {
    let tmp = setup_test_project();
    fct()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .stdout(predicate::str::contains("--force"));
    fct()
        .current_dir(tmp.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_commands_outside_project_fail() {
    let tmp = TempDir::new().unwrap();
    fct()
        .current_dir(tmp.path())
        .args(["sub", "list"])
        .assert()
        .failure();
}

// ============================================================================
// Catalog
// ============================================================================

#[test]
fn test_catalog_entities_pass_validation() {
    let fx = setup_fixture();
    fct()
        .current_dir(fx.tmp.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("All files passed validation!"));
}

#[test]
fn test_validate_reports_broken_form() {
    let fx = setup_fixture();
    fs::write(
        fx.tmp.path().join("forms").join("broken.fct.yaml"),
        "id: FORM-nope\ntitle: Broken\n",
    )
    .unwrap();

    fct()
        .current_dir(fx.tmp.path())
        .args(["validate", "--keep-going"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("broken.fct.yaml"));
}

#[test]
fn test_asset_list_for_job_is_site_scoped() {
    let fx = setup_fixture();
    fct()
        .current_dir(fx.tmp.path())
        .args(["asset", "list", "--job", "J-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DB-1"))
        .stdout(predicate::str::contains("DB-2"))
        .stdout(predicate::str::contains("Pump").not());
}

#[test]
fn test_meter_list_shows_valid_calibration() {
    let fx = setup_fixture();
    fct()
        .current_dir(fx.tmp.path())
        .args(["meter", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&fx.meter))
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn test_duplicate_job_rejected() {
    let fx = setup_fixture();
    fct()
        .current_dir(fx.tmp.path())
        .args(["job", "new", "--id", "J-1", "--title", "Again", "--site", "Main St"])
        .assert()
        .failure();
}

// ============================================================================
// Submissions
// ============================================================================

#[test]
fn test_instantiate_fans_out_per_asset() {
    let fx = setup_fixture();
    let (sub, per_asset) = start_submission(&fx);
    assert_eq!(per_asset.len(), 2);

    // A second run creates nothing new
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "instantiate", &sub])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 new instance(s), 3 in total"));
}

#[test]
fn test_start_is_idempotent_per_job_and_form() {
    let fx = setup_fixture();
    let first = create_id(&fx.tmp, &["sub", "start", "--job", "J-1", "--form", &fx.form]);
    let second = create_id(&fx.tmp, &["sub", "start", "--job", "J-1", "--form", &fx.form]);
    assert_eq!(first, second);
}

#[test]
fn test_start_unknown_job_fails() {
    let fx = setup_fixture();
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "start", "--job", "J-404", "--form", &fx.form])
        .assert()
        .failure()
        .stderr(predicate::str::contains("J-404"));
}

#[test]
fn test_full_submission_lifecycle() {
    let fx = setup_fixture();
    let (sub, per_asset) = start_submission(&fx);

    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "reading", &per_asset[0], "--meter", &fx.meter, "--value", "250"])
        .assert()
        .success();
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "reading", &per_asset[1], "--meter", &fx.meter, "--value", "0.5"])
        .assert()
        .success();
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "answer", &per_asset[0], "visual=pass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved 1 answer(s)"));

    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "status", &sub])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 pass, 1 fail"))
        .stdout(predicate::str::contains("FAIL"));

    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "submit", &sub])
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted"));

    // Locked after submission
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "answer", &per_asset[1], "visual=pass"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("submitted"));
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "submit", &sub])
        .assert()
        .failure();

    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "verify", &sub])
        .assert()
        .success()
        .stdout(predicate::str::contains("matches"));

    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("submitted"))
        .stdout(predicate::str::contains("J-1"));
}

#[test]
fn test_reading_on_unknown_field_rejected() {
    let fx = setup_fixture();
    let (_, per_asset) = start_submission(&fx);
    fct()
        .current_dir(fx.tmp.path())
        .args([
            "sub",
            "reading",
            &per_asset[0],
            "--meter",
            &fx.meter,
            "--value",
            "12",
            "--field",
            "earth_loop",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("earth_loop"));
}

#[test]
fn test_unknown_calibration_rejected() {
    let fx = setup_fixture();
    let (_, per_asset) = start_submission(&fx);
    fct()
        .current_dir(fx.tmp.path())
        .args([
            "sub",
            "reading",
            &per_asset[0],
            "--meter",
            &fx.meter,
            "--calibration",
            "CAL-01HC2JB7SMQX7RS1Y0GFKBHPTD",
            "--value",
            "12",
        ])
        .assert()
        .failure();
}

#[test]
fn test_answer_requires_assignments() {
    let fx = setup_fixture();
    let (_, per_asset) = start_submission(&fx);
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "answer", &per_asset[0]])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to record"));
}

#[test]
fn test_export_csv_to_file() {
    let fx = setup_fixture();
    let (sub, per_asset) = start_submission(&fx);
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "reading", &per_asset[0], "--meter", &fx.meter, "--value", "250"])
        .assert()
        .success();

    let out = fx.tmp.path().join("exports").join("sub.csv");
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "export", &sub, "--format", "csv", "--output"])
        .arg(&out)
        .assert()
        .success();

    let csv = fs::read_to_string(&out).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("instance,template,asset,field,value,unit,verdict")
    );
    assert!(csv.contains(",reading,250,MΩ,pass"));
}

#[test]
fn test_export_json_includes_readings() {
    let fx = setup_fixture();
    let (sub, per_asset) = start_submission(&fx);
    fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "reading", &per_asset[0], "--meter", &fx.meter, "--value", "3.2"])
        .assert()
        .success();

    let output = fct()
        .current_dir(fx.tmp.path())
        .args(["sub", "export", &sub, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let export: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(export["readings"].as_array().unwrap().len(), 1);
    assert_eq!(export["instances"].as_array().unwrap().len(), 3);
    assert_eq!(export["submission"]["status"], "active");
}

#[test]
fn test_completions_generate() {
    fct()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fct"));
}
