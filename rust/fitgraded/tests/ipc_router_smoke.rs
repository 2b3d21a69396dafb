mod test_support;

use serde_json::json;
use test_support::{fixture_path, request, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("fitgrade-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // Workspace-bound methods refuse to run before a workspace is chosen.
    let early = request(
        &mut stdin,
        &mut reader,
        "0",
        "grading.gradeComposite",
        json!({ "inputs": {}, "gender": "male" }),
    );
    assert_eq!(early["error"]["code"], "no_workspace");

    let calls = [
        ("health", json!({})),
        ("workspace.select", json!({ "path": workspace.to_string_lossy() })),
        (
            "catalog.importCsv",
            json!({ "folderPath": fixture_path("fixtures/fitness").to_string_lossy() }),
        ),
        ("catalog.status", json!({})),
        ("catalog.options", json!({})),
        ("catalog.tests", json!({})),
        ("catalog.benchmarkRange", json!({ "testType": "pushups" })),
        ("catalog.weights", json!({ "gender": "female" })),
        ("grading.validateInput", json!({ "raw": "8:30", "format": "time" })),
        (
            "grading.gradeSingleTest",
            json!({ "raw": "8:30", "testType": "run_2000", "grade": "10", "gender": "male" }),
        ),
        (
            "grading.gradeComposite",
            json!({ "inputs": { "run_2000": "9:00", "pushups": "30" }, "gender": "male" }),
        ),
        ("setup.get", json!({})),
        (
            "setup.update",
            json!({ "section": "grading", "patch": { "compositeGrade": "12" } }),
        ),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("{}", i + 1), method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
    }

    let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(
        health["result"]["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );

    let unknown = request(&mut stdin, &mut reader, "u", "classes.list", json!({}));
    assert_eq!(unknown["error"]["code"], "not_implemented");

    let _ = std::fs::remove_dir_all(workspace);
}
