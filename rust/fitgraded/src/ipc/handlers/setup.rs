use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::{GradingSession, SessionConfig};
use crate::strategy::StrategyKind;
use crate::validate::CountPolicy;
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
}

impl SetupSection {
    const ALL: [SetupSection; 1] = [SetupSection::Grading];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    let defaults = SessionConfig::default();
    match section {
        SetupSection::Grading => json!({
            "countMinimum": defaults.count_policy.as_str(),
            "singleTestStrategy": defaults.single_test_strategy.as_str(),
            "compositeGrade": defaults.composite_grade,
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "countMinimum" => {
                    let s = parse_string_max(v, k, 16)?;
                    let Some(policy) = CountPolicy::parse(&s) else {
                        return Err("countMinimum must be one of: positive, nonNegative".into());
                    };
                    obj.insert(k.clone(), Value::String(policy.as_str().to_string()));
                }
                "singleTestStrategy" => {
                    let s = parse_string_max(v, k, 24)?;
                    let Some(kind) = StrategyKind::parse(&s) else {
                        return Err(
                            "singleTestStrategy must be one of: interpolation, thresholdScan"
                                .into(),
                        );
                    };
                    obj.insert(k.clone(), Value::String(kind.as_str().to_string()));
                }
                "compositeGrade" => {
                    // Accept 12 as well as "12".
                    let s = match v.as_i64() {
                        Some(n) => n.to_string(),
                        None => parse_string_max(v, k, 8)?,
                    };
                    if s.is_empty() {
                        return Err("compositeGrade must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

fn config_from_section(grading: &Value) -> SessionConfig {
    let defaults = SessionConfig::default();
    SessionConfig {
        count_policy: grading
            .get("countMinimum")
            .and_then(|v| v.as_str())
            .and_then(CountPolicy::parse)
            .unwrap_or(defaults.count_policy),
        single_test_strategy: grading
            .get("singleTestStrategy")
            .and_then(|v| v.as_str())
            .and_then(StrategyKind::parse)
            .unwrap_or(defaults.single_test_strategy),
        composite_grade: grading
            .get("compositeGrade")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(defaults.composite_grade),
    }
}

/// Grading configuration for a new session, from saved settings over defaults.
pub fn load_session_config(conn: &rusqlite::Connection) -> anyhow::Result<SessionConfig> {
    let grading = load_section(conn, SetupSection::Grading)?;
    Ok(config_from_section(&grading))
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match section {
        SetupSection::Grading => {
            let config = config_from_section(&current);
            info!(?config, "grading settings changed, starting new session");
            state.session = GradingSession::new(config);
        }
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_canonicalizes_and_rejects_unknown_values() {
        let mut current = default_section(SetupSection::Grading);
        let patch = json!({
            "countMinimum": "NONNEGATIVE",
            "singleTestStrategy": " thresholdscan ",
            "compositeGrade": 11
        });
        merge_section_patch(SetupSection::Grading, &mut current, patch.as_object().unwrap())
            .expect("merge");
        assert_eq!(current["countMinimum"], "nonNegative");
        assert_eq!(current["singleTestStrategy"], "thresholdScan");
        assert_eq!(current["compositeGrade"], "11");

        let config = config_from_section(&current);
        assert_eq!(config.count_policy, CountPolicy::NonNegative);
        assert_eq!(config.single_test_strategy, StrategyKind::ThresholdScan);
        assert_eq!(config.composite_grade, "11");

        for bad in [
            json!({ "countMinimum": "zero" }),
            json!({ "singleTestStrategy": "guess" }),
            json!({ "compositeGrade": "" }),
            json!({ "colour": "red" }),
        ] {
            let mut c = default_section(SetupSection::Grading);
            assert!(
                merge_section_patch(SetupSection::Grading, &mut c, bad.as_object().unwrap())
                    .is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn defaults_match_session_defaults() {
        let config = config_from_section(&default_section(SetupSection::Grading));
        assert_eq!(config, SessionConfig::default());
    }
}
