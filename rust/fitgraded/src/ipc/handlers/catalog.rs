use crate::aggregate::{applicable_weights, check_weight_sum, load_weights};
use crate::catalog;
use crate::error::{GradingError, LookupError};
use crate::ipc::error::{err, grading_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::TestDefinition;
use crate::session::GradingSession;
use crate::source::{DataSource, SqliteSource};
use serde_json::json;
use std::path::PathBuf;

fn handle_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(folder) = req
        .params
        .get("folderPath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
    else {
        return err(&req.id, "bad_params", "missing params.folderPath", None);
    };

    let summary = match catalog::import_catalog(conn, &folder) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "import_failed", format!("{e:#}"), None),
    };
    if !summary.unchanged {
        state.session = GradingSession::new(state.session.config().clone());
    }
    ok(&req.id, json!(summary))
}

fn handle_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match catalog::catalog_status(conn) {
        Ok(last) => ok(&req.id, json!({ "lastImport": last })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_options(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "options": [] }));
    };
    let field = req.params.get("field").and_then(|v| v.as_str());
    match catalog::list_options(conn, field) {
        Ok(options) => ok(&req.id, json!({ "options": options })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_tests(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "tests": [] }));
    };
    let records = match SqliteSource::new(conn).test_definitions() {
        Ok(r) => r,
        Err(e) => return grading_err(&req.id, &GradingError::from(e)),
    };
    let tests: Vec<serde_json::Value> = records
        .iter()
        .filter_map(TestDefinition::from_record)
        .map(|d| {
            let example = d.format().ok().map(|f| f.example());
            json!({
                "testType": d.test_type,
                "title": d.title,
                "description": d.description,
                "inputFormat": d.input_format,
                "example": example,
            })
        })
        .collect();
    ok(&req.id, json!({ "tests": tests }))
}

fn handle_benchmark_range(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(test_type) = req.params.get("testType").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.testType", None);
    };
    let source = SqliteSource::new(conn);

    let def = match state.session.definition(&source, test_type) {
        Ok(Some(d)) => d,
        Ok(None) => {
            let e = GradingError::from(LookupError::UnknownTest(test_type.to_string()));
            return grading_err(&req.id, &e);
        }
        Err(e) => return grading_err(&req.id, &GradingError::from(e)),
    };
    let format = match def.format() {
        Ok(f) => f,
        Err(e) => return grading_err(&req.id, &GradingError::from(e)),
    };
    let table = match state.session.endpoint_table(&source, test_type) {
        Ok(t) => t,
        Err(e) => return grading_err(&req.id, &GradingError::from(e)),
    };

    // Threshold columns, when the test has a usable table.
    let columns: Vec<String> = match state.session.table(&source, test_type) {
        Ok(t) => t.columns().map(str::to_string).collect(),
        Err(e @ GradingError::DataUnavailable(_)) => return grading_err(&req.id, &e),
        Err(_) => Vec::new(),
    };

    let ranges: Vec<serde_json::Value> = table
        .genders()
        .into_iter()
        .filter_map(|gender| {
            let (from, to) = table.top_score_range(&gender, format)?;
            Some(json!({ "gender": gender, "from": from, "to": to }))
        })
        .collect();
    ok(
        &req.id,
        json!({
            "testType": def.test_type,
            "title": def.title,
            "inputFormat": format.as_str(),
            "ranges": ranges,
            "thresholdColumns": columns,
        }),
    )
}

fn handle_weights(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(gender) = req.params.get("gender").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.gender", None);
    };
    let entries = match load_weights(&SqliteSource::new(conn)) {
        Ok(e) => e,
        Err(e) => return grading_err(&req.id, &e),
    };
    let (weights, problem) = match applicable_weights(&entries, gender) {
        Ok(weights) => {
            let problem = check_weight_sum(&weights, gender).err().map(|e| e.to_string());
            (weights, problem)
        }
        Err(e) => (Vec::new(), Some(e.to_string())),
    };
    let sum: f64 = weights.iter().map(|w| w.weight_percent).sum();
    ok(
        &req.id,
        json!({
            "weights": weights,
            "sum": sum,
            "valid": problem.is_none(),
            "problem": problem,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.importCsv" => Some(handle_import_csv(state, req)),
        "catalog.status" => Some(handle_status(state, req)),
        "catalog.options" => Some(handle_options(state, req)),
        "catalog.tests" => Some(handle_tests(state, req)),
        "catalog.benchmarkRange" => Some(handle_benchmark_range(state, req)),
        "catalog.weights" => Some(handle_weights(state, req)),
        _ => None,
    }
}
