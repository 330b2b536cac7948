//! Param extraction shared by the handlers.

use crate::classroom::{derive_classroom, Classroom, ClassroomFilter, ClassroomKey, Student};
use crate::ledger::parse_score;
use crate::registry::{Assignment, AssignmentId};
use serde_json::{json, Value};

use super::error::HandlerErr;

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn required_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_i64(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn optional_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

/// A score as sent by the front end: a number, text typed into a cell, or null to clear.
pub fn score_value(v: Option<&Value>) -> Result<Option<f64>, HandlerErr> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("score must be a number")),
        Some(Value::String(s)) => Ok(parse_score(s)?),
        Some(_) => Err(HandlerErr::bad_params("score must be a number, text or null")),
    }
}

/// `{ "title", "classroomId" }` under `key`; absent or null means "the selected assignment".
pub fn assignment_id(params: &Value, key: &str) -> Result<Option<AssignmentId>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value::<AssignmentId>(v.clone())
            .map(Some)
            .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e))),
    }
}

/// Distinguishes an absent `classroomKey` (`None`) from an explicit null (`Some(None)`).
pub fn classroom_key(params: &Value) -> Result<Option<Option<ClassroomKey>>, HandlerErr> {
    match params.get("classroomKey") {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => s
            .parse::<ClassroomKey>()
            .map(|k| Some(Some(k)))
            .map_err(|e| HandlerErr::bad_params(e)),
        Some(_) => Err(HandlerErr::bad_params("classroomKey must be a string or null")),
    }
}

pub fn confirm_flag(params: &Value) -> bool {
    params
        .get("confirm")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

pub fn classroom_json(c: &Classroom) -> Value {
    json!({
        "key": c.key.to_string(),
        "id": c.id,
        "label": c.label,
    })
}

pub fn classrooms_json(filter: &ClassroomFilter) -> Value {
    json!({
        "classrooms": filter.classrooms().iter().map(classroom_json).collect::<Vec<_>>(),
        "needsFilter": filter.needs_filter(),
        "selected": filter.selected().map(|c| c.key.to_string()),
    })
}

pub fn student_json(s: &Student) -> Value {
    let c = derive_classroom(s);
    json!({
        "id": s.id,
        "displayName": s.display_name(),
        "email": s.email,
        "classroomKey": c.key.to_string(),
        "classroomLabel": c.label,
    })
}

pub fn assignment_json(a: &Assignment) -> Value {
    json!({
        "title": a.title(),
        "classroomId": a.classroom_id(),
        "maxScore": a.max_score,
        "isExam": crate::calc::is_exam_title(a.title()),
    })
}
