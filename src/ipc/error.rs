use crate::error::CoreError;
use serde_json::json;
use tracing::debug;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(result) => ok(id, result),
        Err(error) => error.response(id),
    }
}

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    /// Map a core failure, using `fallback` when the server sent no message of its own.
    pub fn core(e: CoreError, fallback: &str) -> Self {
        debug!(code = e.code(), error = %e, "request failed");
        Self {
            code: e.code(),
            message: e.user_message(fallback),
            details: e.details(),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<CoreError> for HandlerErr {
    fn from(e: CoreError) -> Self {
        Self::core(e, "Request failed")
    }
}

impl From<crate::error::ValidationError> for HandlerErr {
    fn from(e: crate::error::ValidationError) -> Self {
        Self::core(e.into(), "Request failed")
    }
}
