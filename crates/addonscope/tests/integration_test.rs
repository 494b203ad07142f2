use std::process::{Command, Output};

use serde_json::Value;

fn fixture_path() -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    format!("{manifest_dir}/tests/fixtures/sample-addons")
}

fn addonscope_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_addonscope"));
    cmd.env_remove("ADDONSCOPE_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    addonscope_cmd()
        .args(args)
        .output()
        .expect("failed to run addonscope")
}

fn run_json(args: &[&str]) -> Value {
    let output = run(args);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "addonscope {args:?} failed: stdout={stdout}, stderr={stderr}"
    );
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON ({e}): {stdout}"))
}

fn package<'v>(summary: &'v Value, name: &str) -> &'v Value {
    summary["packages"]
        .as_array()
        .expect("packages should be an array")
        .iter()
        .find(|p| p["name"] == name)
        .unwrap_or_else(|| panic!("package {name} missing: {summary}"))
}

fn edge(view: &Value, from: &str, to: &str) -> Option<Value> {
    view["edges"]
        .as_array()
        .expect("edges should be an array")
        .iter()
        .find(|e| e["from"] == from && e["to"] == to)
        .cloned()
}

fn node<'v>(view: &'v Value, name: &str) -> Option<&'v Value> {
    view["nodes"]
        .as_array()
        .expect("nodes should be an array")
        .iter()
        .find(|n| n["name"] == name)
}

#[test]
fn test_scan_text_summary() {
    let output = run(&["scan", "--path", &fixture_path()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "addonscope scan failed: stdout={stdout}, stderr={stderr}"
    );
    assert!(stdout.contains("Summary"), "should contain summary: {stdout}");
    assert!(stdout.contains("sample_pkg"), "should list sample_pkg: {stdout}");
    assert!(!stdout.contains("test_skip"), "test packages are filtered: {stdout}");
}

#[test]
fn test_scan_json() {
    let summary = run_json(&["scan", "--path", &fixture_path(), "--json"]);
    assert_eq!(summary["package_count"], 3);

    let sample = package(&summary, "sample_pkg");
    assert_eq!(sample["model_count"], 2);
    assert_eq!(sample["view_count"], 1);
    assert_eq!(sample["version"], "17.0.1.0.0");
    assert_eq!(sample["status"], serde_json::json!([]));
    assert!(!sample["hashsum"].as_str().unwrap_or("").is_empty());

    let ext = package(&summary, "sample_ext");
    // base (depends) and sample_pkg (imports and refers)
    assert_eq!(ext["depends"], 2);
}

#[test]
fn test_scan_without_test_filter() {
    let summary = run_json(&[
        "scan",
        "--path",
        &fixture_path(),
        "--json",
        "--no-test-filter",
    ]);
    assert_eq!(summary["package_count"], 4);
    package(&summary, "test_skip");
}

#[test]
fn test_name_filter() {
    let summary = run_json(&[
        "scan",
        "--path",
        &fixture_path(),
        "--json",
        "--name-filter",
        "sample_*",
    ]);
    assert_eq!(summary["package_count"], 2);
}

#[test]
fn test_hash_is_stable_across_runs() {
    let first = run_json(&["scan", "--path", &fixture_path(), "--json"]);
    let second = run_json(&["scan", "--path", &fixture_path(), "--json"]);
    for name in ["base", "sample_pkg", "sample_ext"] {
        assert_eq!(
            package(&first, name)["hashsum"],
            package(&second, name)["hashsum"],
            "hash of {name} changed between runs"
        );
    }
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let saved = dir.path().join("packages.json");
    let saved_str = saved.to_string_lossy().to_string();

    let output = run(&["scan", "--path", &fixture_path(), "--save", &saved_str]);
    assert!(output.status.success(), "scan --save should succeed");

    let data: Value =
        serde_json::from_str(&std::fs::read_to_string(&saved).unwrap()).expect("saved JSON");
    let sample = &data["sample_pkg"];
    assert!(sample["models"]["test.model"]["fields"]["rating"].is_object());
    assert_eq!(sample["data_count"], 2);
    assert_eq!(sample["depends"], serde_json::json!(["base"]));
    assert!(sample["views"]["sample_pkg.view1"].is_object());
    // Saved data covers every discovered package, filters apply after loading.
    assert!(data["test_skip"].is_object());

    let summary = run_json(&["scan", "--load", &saved_str, "--json"]);
    assert_eq!(summary["package_count"], 3);
    assert_eq!(package(&summary, "sample_pkg")["model_count"], 2);
}

#[test]
fn test_dependency_report() {
    let report = run_json(&["report", "--path", &fixture_path()]);

    let sample = &report["sample_pkg"];
    assert_eq!(sample["model_count"], 2);
    assert_eq!(sample["fields"], 3);
    assert_eq!(sample["data_count"], 2);
    assert_eq!(sample["refers"], serde_json::json!(["base"]));
    assert!(sample.get("missing_dependency").is_none());

    let ext = &report["sample_ext"];
    assert_eq!(ext["imports"], serde_json::json!(["sample_pkg"]));
    assert_eq!(ext["missing_dependency"], serde_json::json!(["sample_pkg"]));
}

#[test]
fn test_module_graph() {
    let view = run_json(&["graph", "modules", "--path", &fixture_path()]);

    assert!(edge(&view, "sample_pkg", "base").is_some());
    assert!(edge(&view, "sample_ext", "base").is_some());
    let base = node(&view, "base").expect("base node");
    assert_eq!(base["base"], true);
    assert_eq!(node(&view, "sample_pkg").expect("sample_pkg node")["base"], false);
}

#[test]
fn test_module_graph_references_and_migration() {
    let view = run_json(&[
        "graph",
        "modules",
        "--path",
        &fixture_path(),
        "--imports",
        "--refers",
        "--migration",
        "17.*",
    ]);

    let edge = edge(&view, "sample_ext", "sample_pkg").expect("reference edge");
    assert_eq!(edge["in_cycle"], false);
    // base has no import or reference edges and is elided.
    assert!(node(&view, "base").is_none());
    assert_eq!(node(&view, "sample_pkg").unwrap()["migration"], "done");
    // Not migrated itself, but its only dependency is.
    assert_eq!(node(&view, "sample_ext").unwrap()["migration"], "todo");
}

#[test]
fn test_view_graph() {
    let view = run_json(&["graph", "views", "--path", &fixture_path()]);
    assert!(edge(&view, "sample_ext.view_ext", "sample_pkg.view1").is_some());
}

#[test]
fn test_structure_graph() {
    let view = run_json(&["graph", "structure", "--path", &fixture_path()]);
    assert_eq!(node(&view, "sample_pkg").unwrap()["kind"], "package");
    assert_eq!(node(&view, "sample_pkg/test.model").unwrap()["kind"], "model");
    assert_eq!(node(&view, "sample_pkg/test.model/rating").unwrap()["kind"], "field");
    assert_eq!(node(&view, "sample_pkg/sample_pkg.view1").unwrap()["kind"], "view");
    assert!(edge(&view, "sample_pkg", "sample_pkg/test.model").is_some());
    assert!(edge(&view, "sample_pkg/test.model", "sample_pkg/test.model/rating").is_some());
    assert!(edge(&view, "sample_pkg", "sample_pkg/sample_pkg.view1").is_some());
    assert!(node(&view, "test_skip").is_none());

    let narrowed = run_json(&[
        "graph",
        "structure",
        "--path",
        &fixture_path(),
        "--modules",
        "sample_*",
        "--models",
        "res.*",
        "--no-fields",
    ]);
    assert!(node(&narrowed, "base").is_none());
    assert!(node(&narrowed, "sample_pkg/res.partner").is_some());
    assert!(node(&narrowed, "sample_pkg/test.model").is_none());
    assert!(node(&narrowed, "sample_pkg/res.partner/rating_ids").is_none());
    assert!(node(&narrowed, "sample_ext/sample_ext.view_ext").is_some());
}

#[test]
fn test_structure_graph_dot() {
    let output = run(&[
        "graph",
        "structure",
        "--path",
        &fixture_path(),
        "--format",
        "dot",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("digraph structure {"));
    assert!(stdout.contains("\"sample_pkg/test.model\" [shape=box, label=\"test.model\"];"));
    assert!(stdout.contains("\"sample_pkg\" -> \"sample_pkg/test.model\";"));
}

#[test]
fn test_model_graph_lonely_nodes() {
    let elided = run_json(&["graph", "models", "--path", &fixture_path()]);
    assert!(node(&elided, "test.model").is_none());

    let full = run_json(&["graph", "models", "--path", &fixture_path(), "--show-lonely"]);
    assert!(node(&full, "test.model").is_some());
}

#[test]
fn test_graph_dot_format() {
    let output = run(&[
        "graph",
        "modules",
        "--path",
        &fixture_path(),
        "--format",
        "dot",
    ]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "graph --format dot failed: {stdout}");
    assert!(stdout.starts_with("digraph modules {"), "{stdout}");
    assert!(stdout.contains("\"sample_pkg\" -> \"base\";"), "{stdout}");
}

#[test]
fn test_missing_source_exits_with_error() {
    let output = run(&["scan"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--path"), "should explain the missing source: {stderr}");
}

#[test]
fn test_init_creates_config() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let output = addonscope_cmd()
        .args(["init"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run addonscope init");

    assert!(output.status.success(), "init should succeed");

    let config_path = dir.path().join(".addonscope.toml");
    let content = std::fs::read_to_string(&config_path).expect(".addonscope.toml should be created");
    assert!(content.contains("[discovery]"), "should contain [discovery] section");
    assert!(content.contains("[tools]"), "should contain [tools] section");

    let again = addonscope_cmd()
        .args(["init"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run addonscope init");
    assert_eq!(again.status.code(), Some(2), "init must not overwrite");
}
