use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "apiBaseUrl": state.config.api_base_url,
            "user": state.session.as_ref().map(|s| s.describe()),
            "gradesOpen": state.grades.as_ref().map(|p| p.subject_id()),
            "attendanceOpen": state.attendance.as_ref().map(|s| s.ledger().subject_id()),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        _ => None,
    }
}
