//! Error types shared by the view-model and the REST boundary.

use serde_json::json;
use thiserror::Error;

/// Client-side validation failures. The action is blocked and state is left unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title '{0}' is reserved for subject totals")]
    ReservedTitle(String),

    #[error("an assignment titled '{title}' already exists in this classroom scope")]
    DuplicateTitle {
        title: String,
        classroom_id: Option<i64>,
    },

    #[error("max score must be greater than 0 (got {0})")]
    InvalidMaxScore(f64),

    #[error("score {value} is outside 0..={max}")]
    OutOfRange { value: f64, max: f64 },

    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("assignment not found")]
    UnknownAssignment,

    #[error("no assignment is selected")]
    NoAssignmentSelected,

    #[error("student {0} is not on this roster")]
    UnknownStudent(i64),

    #[error("classroom not found")]
    UnknownClassroom,

    #[error("classroom '{0}' has not been created on the server yet")]
    UnresolvedClassroom(String),

    #[error("unknown attendance status '{0}'")]
    InvalidStatus(String),

    #[error("date must be YYYY-MM-DD (got '{0}')")]
    InvalidDate(String),

    #[error("manual {0} totals are only accepted when no {0} assignments exist")]
    TotalsNotAllowed(&'static str),
}

impl ValidationError {
    /// Stable machine-readable name, reported as `details.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyTitle => "empty_title",
            Self::ReservedTitle(_) => "reserved_title",
            Self::DuplicateTitle { .. } => "duplicate_title",
            Self::InvalidMaxScore(_) => "invalid_max_score",
            Self::OutOfRange { .. } => "out_of_range",
            Self::NotANumber(_) => "not_a_number",
            Self::UnknownAssignment => "unknown_assignment",
            Self::NoAssignmentSelected => "no_assignment_selected",
            Self::UnknownStudent(_) => "unknown_student",
            Self::UnknownClassroom => "unknown_classroom",
            Self::UnresolvedClassroom(_) => "unresolved_classroom",
            Self::InvalidStatus(_) => "invalid_status",
            Self::InvalidDate(_) => "invalid_date",
            Self::TotalsNotAllowed(_) => "totals_not_allowed",
        }
    }
}

/// Failures crossing the REST boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Transport failure (connection refused, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 401, or a response the backend flags as unauthenticated.
    #[error("not authenticated")]
    NotAuthenticated { detail: Option<String> },

    /// Any other non-2xx response. `detail` carries the server message when one was sent.
    #[error("server returned {status}")]
    Status { status: u16, detail: Option<String> },

    /// 2xx response whose body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Message for the transient notice: the server's own text when available.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Status {
                detail: Some(detail),
                ..
            }
            | Self::NotAuthenticated {
                detail: Some(detail),
            } => detail.clone(),
            _ => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The page the request operates on has not been opened.
    #[error("{0}")]
    NoPage(&'static str),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::Api(ApiError::Network(_)) => "network_error",
            Self::Api(ApiError::NotAuthenticated { .. }) => "not_authenticated",
            Self::Api(ApiError::Status { .. }) => "http_error",
            Self::Api(ApiError::Decode(_)) => "decode_failed",
            Self::NoPage(_) => "no_page",
        }
    }

    /// Message shown to the user, with `fallback` used when the server gave none.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Api(e) => e.user_message(fallback),
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(v) => {
                let mut d = json!({ "kind": v.kind() });
                match v {
                    ValidationError::OutOfRange { value, max } => {
                        d["value"] = json!(value);
                        d["max"] = json!(max);
                    }
                    ValidationError::DuplicateTitle {
                        title,
                        classroom_id,
                    } => {
                        d["title"] = json!(title);
                        d["classroomId"] = json!(classroom_id);
                    }
                    _ => {}
                }
                Some(d)
            }
            Self::Api(ApiError::Status { status, .. }) => Some(json!({ "status": status })),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
