use crate::gradebook::{GradesPage, TotalsKind};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    assignment_id, assignment_json, classroom_key, classrooms_json, optional_i64, required_i64,
    score_value, student_json,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

pub(super) fn snapshot(page: &GradesPage) -> Value {
    let selected = page.registry().selected();
    let students: Vec<&crate::classroom::Student> = page.visible_students();
    let grades: Vec<Value> = match selected {
        Some(a) => students
            .iter()
            .map(|s| json!({ "studentId": s.id, "score": page.ledger().score(&a.id, s.id) }))
            .collect(),
        None => Vec::new(),
    };
    json!({
        "subjectId": page.subject_id(),
        "subjectName": page.subject_name(),
        "scoring": page.scoring(),
        "classrooms": classrooms_json(page.classrooms()),
        "students": students.iter().map(|s| student_json(s)).collect::<Vec<_>>(),
        "assignments": page.registry().visible().into_iter().map(assignment_json).collect::<Vec<_>>(),
        "selectedAssignment": page.registry().selected_id(),
        "grades": grades,
    })
}

fn grades_open(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let subject_id = required_i64(params, "subjectId")?;
    let page = GradesPage::open(state.backend.as_ref(), state.session.as_ref(), subject_id)
        .map_err(|e| HandlerErr::core(e, "Could not load grades"))?;
    let view = snapshot(&page);
    state.grades = Some(page);
    Ok(view)
}

fn grades_snapshot(state: &mut AppState) -> Result<Value, HandlerErr> {
    let ctx = state.grades_ctx()?;
    Ok(snapshot(ctx.page))
}

fn classrooms_list(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    if is_attendance(params)? {
        let ctx = state.attendance_ctx()?;
        return Ok(classrooms_json(ctx.page.classrooms()));
    }
    let ctx = state.grades_ctx()?;
    Ok(classrooms_json(ctx.page.classrooms()))
}

fn classrooms_select(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let key = classroom_key(params)?
        .ok_or_else(|| HandlerErr::bad_params("missing classroomKey"))?;
    if is_attendance(params)? {
        let ctx = state.attendance_ctx()?;
        ctx.page.classrooms_mut().select(key.as_ref())?;
        return Ok(super::attendance::snapshot(ctx.page));
    }
    let ctx = state.grades_ctx()?;
    ctx.page
        .select_classroom(ctx.backend, ctx.session, key.as_ref())
        .map_err(|e| HandlerErr::core(e, "Could not load classroom"))?;
    Ok(snapshot(ctx.page))
}

fn is_attendance(params: &Value) -> Result<bool, HandlerErr> {
    match params.get("page").and_then(|v| v.as_str()) {
        None | Some("grades") => Ok(false),
        Some("attendance") => Ok(true),
        Some(other) => Err(HandlerErr::bad_params(format!("unknown page: {}", other))),
    }
}

fn set_score(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    if params.get("value").is_none() {
        return Err(HandlerErr::bad_params("missing value"));
    }
    let value = score_value(params.get("value"))?;
    let assignment = assignment_id(params, "assignment")?;
    let ctx = state.grades_ctx()?;
    ctx.page.set_score(assignment.as_ref(), student_id, value)?;
    Ok(json!({ "studentId": student_id, "score": value }))
}

fn save(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let assignment = assignment_id(params, "assignment")?;
    let ctx = state.grades_ctx()?;
    let saved = ctx
        .page
        .save(ctx.backend, ctx.session, assignment.as_ref())
        .map_err(|e| HandlerErr::core(e, "Save failed"))?;
    Ok(json!({ "saved": saved }))
}

fn summary(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = optional_i64(params, "studentId")?;
    let ctx = state.grades_ctx()?;
    match student_id {
        Some(id) => Ok(json!({ "summary": ctx.page.summary(id)? })),
        None => Ok(json!({ "summaries": ctx.page.summaries() })),
    }
}

fn weighted_summary(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = optional_i64(params, "studentId")?;
    let ctx = state.grades_ctx()?;
    let scoring = serde_json::to_value(ctx.page.scoring()).unwrap_or(Value::Null);
    match student_id {
        Some(id) => Ok(json!({ "scoring": scoring, "summary": ctx.page.weighted_summary(id)? })),
        None => Ok(json!({ "scoring": scoring, "summaries": ctx.page.weighted_summaries() })),
    }
}

fn stats(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let assignment = assignment_id(params, "assignment")?;
    let ctx = state.grades_ctx()?;
    Ok(json!({ "stats": ctx.page.stats(assignment.as_ref())? }))
}

fn save_totals(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let kind: TotalsKind = params
        .get("kind")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing kind"))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|_| HandlerErr::bad_params("kind must be collected or exam"))
        })?;
    let Some(rows) = params.get("scores").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing scores"));
    };
    let mut scores = Vec::with_capacity(rows.len());
    for row in rows {
        let student_id = required_i64(row, "studentId")?;
        scores.push((student_id, score_value(row.get("value"))?));
    }
    let ctx = state.grades_ctx()?;
    let saved = ctx
        .page
        .save_totals(ctx.backend, ctx.session, kind, &scores)
        .map_err(|e| HandlerErr::core(e, "Save failed"))?;
    Ok(json!({ "saved": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "grades.open" => grades_open(state, p),
        "grades.snapshot" => grades_snapshot(state),
        "classrooms.list" => classrooms_list(state, p),
        "classrooms.select" => classrooms_select(state, p),
        "grades.setScore" => set_score(state, p),
        "grades.save" => save(state, p),
        "grades.summary" => summary(state, p),
        "grades.weightedSummary" => weighted_summary(state, p),
        "grades.stats" => stats(state, p),
        "grades.saveTotals" => save_totals(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
