use crate::error::GradingError;
use crate::ipc::error::{err, grading_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::source::SqliteSource;
use crate::strategy::StrategyKind;
use serde_json::{json, Value};
use std::collections::HashMap;

fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

/// Raw inputs arrive as strings, but a bare JSON number is taken as typed.
fn raw_param(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn handle_validate_input(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("raw").and_then(raw_param) else {
        return err(&req.id, "bad_params", "missing params.raw", None);
    };
    let Some(format) = str_param(req, "format") else {
        return err(&req.id, "bad_params", "missing params.format", None);
    };
    match state.session.validate_input(&raw, format) {
        Ok(f) => ok(&req.id, json!({ "valid": true, "format": f.as_str() })),
        Err(e) => grading_err(&req.id, &GradingError::from(e)),
    }
}

fn handle_grade_single_test(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(raw) = req.params.get("raw").and_then(raw_param) else {
        return err(&req.id, "bad_params", "missing params.raw", None);
    };
    let Some(test_type) = str_param(req, "testType") else {
        return err(&req.id, "bad_params", "missing params.testType", None);
    };
    let Some(grade) = req.params.get("grade").and_then(raw_param) else {
        return err(&req.id, "bad_params", "missing params.grade", None);
    };
    let Some(gender) = str_param(req, "gender") else {
        return err(&req.id, "bad_params", "missing params.gender", None);
    };
    let strategy = match req.params.get("strategy") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_str().and_then(StrategyKind::parse) {
            Some(k) => Some(k),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "strategy must be one of: interpolation, thresholdScan",
                    None,
                )
            }
        },
    };

    let source = SqliteSource::new(conn);
    match state
        .session
        .grade_single_test(&source, &raw, test_type, &grade, gender, strategy)
    {
        Ok(result) => ok(&req.id, json!(result)),
        Err(e) => grading_err(&req.id, &e),
    }
}

fn handle_grade_composite(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(inputs_obj) = req.params.get("inputs").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "inputs must be an object", None);
    };
    let mut inputs: HashMap<String, String> = HashMap::with_capacity(inputs_obj.len());
    for (test_type, v) in inputs_obj {
        let Some(raw) = raw_param(v) else {
            return err(
                &req.id,
                "bad_params",
                format!("inputs.{} must be a string", test_type),
                None,
            );
        };
        inputs.insert(test_type.clone(), raw);
    }
    let Some(gender) = str_param(req, "gender") else {
        return err(&req.id, "bad_params", "missing params.gender", None);
    };
    let grade = match req.params.get("grade") {
        None | Some(Value::Null) => None,
        Some(v) => match raw_param(v) {
            Some(g) => Some(g),
            None => return err(&req.id, "bad_params", "grade must be a string", None),
        },
    };

    let source = SqliteSource::new(conn);
    match state
        .session
        .grade_composite(&source, &inputs, gender, grade.as_deref())
    {
        Ok(result) => ok(&req.id, json!(result)),
        Err(e) => grading_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grading.validateInput" => Some(handle_validate_input(state, req)),
        "grading.gradeSingleTest" => Some(handle_grade_single_test(state, req)),
        "grading.gradeComposite" => Some(handle_grade_composite(state, req)),
        _ => None,
    }
}
