use crate::attendance::{parse_date, AttendanceSheet, AttendanceStatus};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{classrooms_json, required_i64, student_json};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

pub(super) fn snapshot(sheet: &AttendanceSheet) -> Value {
    let ledger = sheet.ledger();
    let students: Vec<Value> = sheet
        .visible_students()
        .into_iter()
        .map(|s| {
            let mut row = student_json(s);
            row["status"] = json!(ledger.status(s.id).map(AttendanceStatus::as_str));
            row
        })
        .collect();
    let counts: Map<String, Value> = ledger
        .counts()
        .into_iter()
        .map(|(st, n)| (st.as_str().to_string(), json!(n)))
        .collect();
    json!({
        "subjectId": ledger.subject_id(),
        "date": ledger.date().format("%Y-%m-%d").to_string(),
        "classrooms": classrooms_json(sheet.classrooms()),
        "students": students,
        "counts": counts,
    })
}

/// `null` (or a missing key) leaves the student unset.
fn parse_status(v: Option<&Value>) -> Result<Option<AttendanceStatus>, HandlerErr> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.parse::<AttendanceStatus>()?)),
        Some(_) => Err(HandlerErr::bad_params("status must be a string or null")),
    }
}

fn open(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let subject_id = required_i64(params, "subjectId")?;
    let date = match params.get("date").and_then(|v| v.as_str()) {
        Some(raw) => parse_date(raw)?,
        None => chrono::Local::now().date_naive(),
    };
    // Same subject: keep roster and filter, just reload the date.
    if let Some(sheet) = state.attendance.as_mut() {
        if sheet.ledger().subject_id() == subject_id {
            sheet
                .load_for_date(state.backend.as_ref(), state.session.as_ref(), date)
                .map_err(|e| HandlerErr::core(e, "Could not load attendance"))?;
            return Ok(snapshot(sheet));
        }
    }
    let sheet = AttendanceSheet::open(
        state.backend.as_ref(),
        state.session.as_ref(),
        subject_id,
        date,
    )
    .map_err(|e| HandlerErr::core(e, "Could not load attendance"))?;
    let view = snapshot(&sheet);
    state.attendance = Some(sheet);
    Ok(view)
}

fn get_snapshot(state: &mut AppState) -> Result<Value, HandlerErr> {
    let ctx = state.attendance_ctx()?;
    Ok(snapshot(ctx.page))
}

fn set_status(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let status = parse_status(params.get("status"))?;
    let ctx = state.attendance_ctx()?;
    ctx.page.set_status(student_id, status)?;
    Ok(json!({
        "studentId": student_id,
        "status": status.map(AttendanceStatus::as_str),
    }))
}

fn mark_all(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let status = parse_status(params.get("status"))?;
    let ctx = state.attendance_ctx()?;
    let updated = ctx.page.mark_all(status);
    let mut view = snapshot(ctx.page);
    view["updated"] = json!(updated);
    Ok(view)
}

fn save(state: &mut AppState) -> Result<Value, HandlerErr> {
    let ctx = state.attendance_ctx()?;
    let saved = ctx
        .page
        .save(ctx.backend, ctx.session)
        .map_err(|e| HandlerErr::core(e, "Save failed"))?;
    Ok(json!({ "saved": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "attendance.open" => open(state, p),
        "attendance.snapshot" => get_snapshot(state),
        "attendance.setStatus" => set_status(state, p),
        "attendance.markAll" => mark_all(state, p),
        "attendance.save" => save(state),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
