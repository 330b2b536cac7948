use crate::error::CoreError;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::session::{Session, UserInfo};
use serde_json::json;
use tracing::info;

fn sign_in(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = required_str(params, "username")?;
    let password = required_str(params, "password")?;
    let resp = state
        .backend
        .login(&username, &password)
        .map_err(|e| HandlerErr::core(CoreError::from(e), "Sign-in failed"))?;
    let session = Session::new(resp.access_token, resp.token_type, resp.user_info);
    let view = session.describe();
    state.sign_out();
    state.session = Some(session);
    info!(username = %username, "signed in");
    Ok(view)
}

fn restore(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let token = required_str(params, "token")?;
    let token_type = params
        .get("tokenType")
        .and_then(|v| v.as_str())
        .unwrap_or("bearer")
        .to_string();
    let user: UserInfo = match params.get("user") {
        None | Some(serde_json::Value::Null) => UserInfo::default(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid user: {}", e)))?,
    };
    let session = Session::new(token, token_type, user);
    let view = session.describe();
    state.sign_out();
    state.session = Some(session);
    Ok(view)
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    match sign_in(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    match restore(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was_signed_in = state.session.is_some();
    state.sign_out();
    if was_signed_in {
        info!("signed out");
    }
    ok(&req.id, json!({ "signedOut": was_signed_in }))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({ "session": state.session.as_ref().map(|s| s.describe()) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.signIn" => Some(handle_sign_in(state, req)),
        "session.restore" => Some(handle_restore(state, req)),
        "session.signOut" => Some(handle_sign_out(state, req)),
        "session.get" => Some(handle_get(state, req)),
        _ => None,
    }
}
