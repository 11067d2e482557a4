/// Acceptance tests for the takt CLI
///
/// Plan inspection and cache maintenance only: routine implementations are
/// registered by host applications, so the CLI never executes a plan.
use predicates::prelude::*;
use serde_json::Value;

mod common;
use common::TestProject;

const MANIFEST: &str = r#"[
    ["double", "x"],
    "addOne",
    {"_noncached": ["addOne"]}
]"#;

const PLAN: &str = r#"{
    "_sequence": ["A", {"B": ["A"]}],
    "$A": "double",
    "$B": "addOne",
    "x": 5
}"#;

#[test]
fn test_plan_validate() {
    let project = TestProject::new();
    project.write_manifest(MANIFEST);
    project.write_config("plan.json", PLAN);

    project
        .takt()
        .args(["plan", "validate", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan is valid"))
        .stdout(predicate::str::contains("Steps: 2"))
        .stdout(predicate::str::contains("Cached: 1"));
}

#[test]
fn test_plan_validate_appends_json_extension() {
    let project = TestProject::new();
    project.write_manifest(MANIFEST);
    project.write_config("plan.json", PLAN);

    project
        .takt()
        .args(["plan", "validate", "plan"])
        .assert()
        .success();
}

#[test]
fn test_plan_validate_rejects_duplicate_step() {
    let project = TestProject::new();
    project.write_manifest(MANIFEST);
    project.write_config(
        "bad.json",
        r#"{"_sequence": ["A", "A"], "$A": "double"}"#,
    );

    project
        .takt()
        .args(["plan", "validate", "bad.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate step name"));
}

#[test]
fn test_plan_validate_rejects_out_of_order_dependency() {
    let project = TestProject::new();
    project.write_manifest(MANIFEST);
    project.write_config(
        "bad.json",
        r#"{"_sequence": [{"A": ["B"]}, "B"], "$A": "double", "$B": "addOne"}"#,
    );

    project
        .takt()
        .args(["plan", "validate", "bad.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an earlier step"));
}

#[test]
fn test_plan_show_json() {
    let project = TestProject::new();
    project.write_manifest(MANIFEST);
    project.write_config("plan.json", PLAN);

    let output = project
        .takt()
        .args(["plan", "show", "plan.json", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let steps: Value = serde_json::from_slice(&output).unwrap();
    let steps = steps.as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["name"], "A");
    assert_eq!(steps[0]["routine"], "double");
    assert!(steps[0]["hash"].is_string());
    assert_eq!(steps[1]["cached"], Value::Bool(false));
    assert!(steps[1]["hash"].is_null());
}

#[test]
fn test_cache_status_reports_miss() {
    let project = TestProject::new();
    project.write_manifest(MANIFEST);
    project.write_config("plan.json", PLAN);

    project
        .takt()
        .args(["cache", "status", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MISS"))
        .stdout(predicate::str::contains("(not cached)"));
}

#[test]
fn test_cache_list_empty() {
    let project = TestProject::new();

    project
        .takt()
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cache entries."));
}

#[test]
fn test_cache_stats_empty() {
    let project = TestProject::new();

    project
        .takt()
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total entries: 0"));
}

#[test]
fn test_cache_clean_requires_hash_or_all() {
    let project = TestProject::new();

    project
        .takt()
        .args(["cache", "clean"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--all"));

    project
        .takt()
        .args(["cache", "clean", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleaned."));
}

#[test]
fn test_missing_manifest_is_reported() {
    let project = TestProject::new();
    project.write_config("plan.json", PLAN);

    project
        .takt()
        .args(["plan", "validate", "plan.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("routines manifest"));
}
