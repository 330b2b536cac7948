use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    assignment_id, assignment_json, classroom_key, confirm_flag, optional_f64, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn list(state: &mut AppState) -> Result<Value, HandlerErr> {
    let ctx = state.grades_ctx()?;
    let registry = ctx.page.registry();
    Ok(json!({
        "scope": registry.scope(),
        "assignments": registry.visible().into_iter().map(assignment_json).collect::<Vec<_>>(),
        "selected": registry.selected_id(),
    }))
}

fn create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let title = required_str(params, "title")?;
    let max_score = optional_f64(params, "maxScore")?
        .ok_or_else(|| HandlerErr::bad_params("missing maxScore"))?;
    let key_param = classroom_key(params)?;
    let ctx = state.grades_ctx()?;
    // Without an explicit key the new assignment lands in the classroom being viewed.
    let key = match key_param {
        Some(k) => k,
        None if ctx.page.classrooms().needs_filter() => {
            ctx.page.classrooms().selected().map(|c| c.key.clone())
        }
        None => None,
    };
    let classroom_id = ctx
        .page
        .resolve_classroom(ctx.backend, ctx.session, key.as_ref())
        .map_err(|e| HandlerErr::core(e, "Could not resolve classroom"))?;
    let id = ctx
        .page
        .create_assignment(ctx.backend, ctx.session, &title, max_score, classroom_id)
        .map_err(|e| HandlerErr::core(e, "Could not create assignment"))?;
    Ok(json!({ "assignment": id }))
}

fn update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = assignment_id(params, "assignment")?
        .ok_or_else(|| HandlerErr::bad_params("missing assignment"))?;
    let title = params.get("title").and_then(|v| v.as_str()).map(str::to_string);
    let max_score = optional_f64(params, "maxScore")?;
    let key_param = classroom_key(params)?;
    let ctx = state.grades_ctx()?;
    let Some(current) = ctx.page.registry().get(&id).cloned() else {
        return Err(crate::error::ValidationError::UnknownAssignment.into());
    };
    let classroom_id = match key_param {
        None => current.classroom_id(),
        Some(key) => ctx
            .page
            .resolve_classroom(ctx.backend, ctx.session, key.as_ref())
            .map_err(|e| HandlerErr::core(e, "Could not resolve classroom"))?,
    };
    let new_id = ctx
        .page
        .update_assignment(
            ctx.backend,
            ctx.session,
            &id,
            title.as_deref().unwrap_or(current.title()),
            max_score.unwrap_or(current.max_score),
            classroom_id,
        )
        .map_err(|e| HandlerErr::core(e, "Could not update assignment"))?;
    Ok(json!({ "assignment": new_id }))
}

fn delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = assignment_id(params, "assignment")?
        .ok_or_else(|| HandlerErr::bad_params("missing assignment"))?;
    if !confirm_flag(params) {
        return Err(HandlerErr::bad_params(
            "deleting an assignment removes all of its grades; pass confirm: true",
        ));
    }
    let ctx = state.grades_ctx()?;
    let dropped = ctx
        .page
        .delete_assignment(ctx.backend, ctx.session, &id)
        .map_err(|e| HandlerErr::core(e, "Could not delete assignment"))?;
    Ok(json!({
        "deleted": id,
        "gradesRemoved": dropped,
        "selected": ctx.page.registry().selected_id(),
    }))
}

fn select(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = assignment_id(params, "assignment")?
        .ok_or_else(|| HandlerErr::bad_params("missing assignment"))?;
    let ctx = state.grades_ctx()?;
    ctx.page.select_assignment(&id)?;
    Ok(super::grades::snapshot(ctx.page))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "assignments.list" => list(state),
        "assignments.create" => create(state, p),
        "assignments.update" => update(state, p),
        "assignments.delete" => delete(state, p),
        "assignments.select" => select(state, p),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
