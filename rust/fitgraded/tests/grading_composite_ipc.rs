mod test_support;

use serde_json::json;
use test_support::{open_with_catalog, request_err, request_ok, spawn_sidecar};

#[test]
fn composite_is_floored_weighted_average() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_with_catalog(&mut stdin, &mut reader, "fitgrade-composite", "fixtures/fitness");

    // run 9:00 -> 80 (weight 40), push-ups 30 -> 90 (weight 60)
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grading.gradeComposite",
        json!({ "inputs": { "run_2000": "9:00", "pushups": "30" }, "gender": "male" }),
    );
    assert_eq!(result["finalGrade"], 86);
    assert_eq!(result["usedWeight"].as_f64(), Some(100.0));
    let tests = result["tests"].as_array().expect("tests");
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[0]["testType"], "run_2000");
    assert_eq!(tests[0]["finalScore"], 80);
    assert_eq!(tests[1]["finalScore"], 90);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn composite_drops_test_without_table_from_denominator() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_with_catalog(&mut stdin, &mut reader, "fitgrade-composite-partial", "fixtures/fitness");

    // long_jump carries 60% for girls but has no threshold table.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grading.gradeComposite",
        json!({ "inputs": { "run_2000": "10:30", "long_jump": "2.1" }, "gender": "Female" }),
    );
    assert_eq!(result["finalGrade"], 80);
    assert_eq!(result["usedWeight"].as_f64(), Some(40.0));
    assert_eq!(result["totalWeight"].as_f64(), Some(100.0));
    let jump = result["tests"]
        .as_array()
        .and_then(|t| t.iter().find(|t| t["testType"] == "long_jump"))
        .expect("long_jump outcome");
    assert!(jump["finalScore"].is_null());
    assert!(jump["excludedReason"]
        .as_str()
        .is_some_and(|r| r.starts_with("no_benchmark_data")));

    // Grade 10 has no columns in either table.
    let none = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "grading.gradeComposite",
        json!({
            "inputs": { "run_2000": "9:00", "pushups": "30" },
            "gender": "male",
            "grade": "10"
        }),
    );
    assert_eq!(none["code"], "no_gradable_tests");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn composite_reports_every_invalid_field() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_with_catalog(&mut stdin, &mut reader, "fitgrade-composite-fields", "fixtures/fitness");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "grading.gradeComposite",
        json!({ "inputs": { "run_2000": "9:75", "pushups": "" }, "gender": "male" }),
    );
    assert_eq!(e["code"], "validation_failed");
    let fields = e["details"]["fields"].as_array().expect("fields");
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0]["testType"], "run_2000");
    assert_eq!(fields[0]["kind"], "outOfRangeTime");
    assert_eq!(fields[1]["testType"], "pushups");
    assert_eq!(fields[1]["kind"], "emptyInput");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn weight_sum_mismatch_blocks_composite() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_with_catalog(
        &mut stdin,
        &mut reader,
        "fitgrade-composite-weights",
        "fixtures/fitness-weights-mismatch",
    );

    let weights = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "catalog.weights",
        json!({ "gender": "male" }),
    );
    assert_eq!(weights["valid"], false);
    assert_eq!(weights["sum"].as_f64(), Some(90.0));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "grading.gradeComposite",
        json!({ "inputs": { "run_2000": "9:00", "pushups": "30" }, "gender": "male" }),
    );
    assert_eq!(e["code"], "config_error");
    assert_eq!(e["details"]["actualWeightSum"].as_f64(), Some(90.0));

    let _ = std::fs::remove_dir_all(workspace);
}
