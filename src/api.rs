//! REST boundary to the school backend.
//!
//! [`Backend`] is the seam the view-model talks through; [`HttpBackend`] is the real
//! implementation over blocking `reqwest`.

use crate::classroom::Student;
use crate::config::Config;
use crate::error::ApiError;
use crate::session::{Session, UserInfo};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Deserializers tolerant of the loosely typed JSON the backend emits.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accept a string or a number as text; `null` and missing stay `None`.
    pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Accept a number or a numeric string; anything else is `None`.
    pub fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    /// Accept an integer or an integer string.
    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubjectRecord {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub subject_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub subject_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub max_collected_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub max_exam_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassroomRecord {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssignmentRecord {
    pub title: String,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub max_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub classroom_id: Option<i64>,
}

/// Body of assignment create and edit requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentPayload {
    pub title: String,
    pub max_score: f64,
    pub classroom_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradeRecord {
    #[serde(default)]
    pub title: Option<String>,
    pub student_id: i64,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub grade: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub classroom_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeEntry {
    pub student_id: i64,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradesBulk {
    pub subject_id: i64,
    pub title: String,
    pub max_score: f64,
    pub classroom_id: Option<i64>,
    pub grades: Vec<GradeEntry>,
}

/// Attendance payload as stored by the backend: either the current status map or the older
/// plain list of present student ids.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AttendanceMap {
    Statuses(BTreeMap<String, serde_json::Value>),
    PresentIds(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub attendance: Option<AttendanceMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceMark {
    pub subject_id: i64,
    pub date: String,
    pub attendance: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user_info: UserInfo,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Operations the view-model needs from the backend.
///
/// Every call takes the current [`Session`] explicitly; with no session the request goes out
/// without a bearer token.
pub trait Backend {
    fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse>;

    fn subject_students(&self, session: Option<&Session>, subject_id: i64)
        -> ApiResult<Vec<Student>>;

    fn subject(&self, session: Option<&Session>, subject_id: i64) -> ApiResult<SubjectRecord>;

    fn school_classrooms(
        &self,
        session: Option<&Session>,
        school_id: i64,
    ) -> ApiResult<Vec<ClassroomRecord>>;

    fn list_assignments(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        classroom_id: Option<i64>,
    ) -> ApiResult<Vec<AssignmentRecord>>;

    fn create_assignment(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        payload: &AssignmentPayload,
    ) -> ApiResult<AssignmentRecord>;

    /// `title` and `classroom_id` identify the assignment as it exists on the server now.
    fn update_assignment(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        title: &str,
        classroom_id: Option<i64>,
        payload: &AssignmentPayload,
    ) -> ApiResult<AssignmentRecord>;

    fn delete_assignment(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        title: &str,
        classroom_id: Option<i64>,
    ) -> ApiResult<()>;

    fn list_grades(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        classroom_id: Option<i64>,
    ) -> ApiResult<Vec<GradeRecord>>;

    fn submit_grades(&self, session: Option<&Session>, payload: &GradesBulk) -> ApiResult<()>;

    fn list_attendance(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        date: &str,
    ) -> ApiResult<Vec<AttendanceRecord>>;

    fn mark_attendance(&self, session: Option<&Session>, payload: &AttendanceMark)
        -> ApiResult<()>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &Config) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::from)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, rb: RequestBuilder, session: Option<&Session>) -> RequestBuilder {
        match session {
            Some(s) => rb.header(AUTHORIZATION, s.authorization_header()),
            None => rb,
        }
    }

    fn send(&self, rb: RequestBuilder) -> ApiResult<Response> {
        let resp = rb.send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = resp
            .json::<ErrorBody>()
            .ok()
            .and_then(|b| b.detail)
            .map(|d| match d {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
        debug!(status = status.as_u16(), ?detail, "backend rejected request");
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::NotAuthenticated { detail });
        }
        Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        session: Option<&Session>,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        debug!(path, "GET");
        let rb = self.authed(self.client.get(self.url(path)).query(query), session);
        let resp = self.send(rb)?;
        resp.json::<T>()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn classroom_query(classroom_id: Option<i64>) -> Vec<(&'static str, String)> {
    classroom_id
        .map(|id| vec![("classroom_id", id.to_string())])
        .unwrap_or_default()
}

impl Backend for HttpBackend {
    fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        debug!(username, "POST /users/login");
        let rb = self
            .client
            .post(self.url("/users/login"))
            .form(&[("username", username), ("password", password)]);
        let resp = self.send(rb)?;
        resp.json::<LoginResponse>()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn subject_students(
        &self,
        session: Option<&Session>,
        subject_id: i64,
    ) -> ApiResult<Vec<Student>> {
        // An object instead of an array means "no roster", not an error.
        let raw: serde_json::Value =
            self.get_json(session, &format!("/subjects/{subject_id}/students"), &[])?;
        match raw {
            serde_json::Value::Array(_) => {
                serde_json::from_value(raw).map_err(|e| ApiError::Decode(e.to_string()))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn subject(&self, session: Option<&Session>, subject_id: i64) -> ApiResult<SubjectRecord> {
        self.get_json(session, &format!("/subjects/{subject_id}"), &[])
    }

    fn school_classrooms(
        &self,
        session: Option<&Session>,
        school_id: i64,
    ) -> ApiResult<Vec<ClassroomRecord>> {
        self.get_json(session, &format!("/classrooms/list/{school_id}"), &[])
    }

    fn list_assignments(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        classroom_id: Option<i64>,
    ) -> ApiResult<Vec<AssignmentRecord>> {
        self.get_json(
            session,
            &format!("/grades/assignments/{subject_id}"),
            &classroom_query(classroom_id),
        )
    }

    fn create_assignment(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        payload: &AssignmentPayload,
    ) -> ApiResult<AssignmentRecord> {
        let path = format!("/grades/assignments/{subject_id}");
        debug!(path, title = %payload.title, "POST");
        let rb = self.authed(self.client.post(self.url(&path)).json(payload), session);
        let resp = self.send(rb)?;
        resp.json::<AssignmentRecord>()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn update_assignment(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        title: &str,
        classroom_id: Option<i64>,
        payload: &AssignmentPayload,
    ) -> ApiResult<AssignmentRecord> {
        let path = format!(
            "/grades/assignments/{subject_id}/{}",
            urlencoding::encode(title)
        );
        debug!(path, "PUT");
        let rb = self.client
            .put(self.url(&path))
            .query(&classroom_query(classroom_id))
            .json(payload);
        let resp = self.send(self.authed(rb, session))?;
        resp.json::<AssignmentRecord>()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn delete_assignment(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        title: &str,
        classroom_id: Option<i64>,
    ) -> ApiResult<()> {
        let path = format!(
            "/grades/assignments/{subject_id}/{}",
            urlencoding::encode(title)
        );
        debug!(path, "DELETE");
        let rb = self.client
            .delete(self.url(&path))
            .query(&classroom_query(classroom_id));
        self.send(self.authed(rb, session))?;
        Ok(())
    }

    fn list_grades(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        classroom_id: Option<i64>,
    ) -> ApiResult<Vec<GradeRecord>> {
        let mut query = vec![("subject_id", subject_id.to_string())];
        query.extend(classroom_query(classroom_id));
        self.get_json(session, "/grades/", &query)
    }

    fn submit_grades(&self, session: Option<&Session>, payload: &GradesBulk) -> ApiResult<()> {
        debug!(
            subject_id = payload.subject_id,
            title = %payload.title,
            count = payload.grades.len(),
            "POST /grades/bulk"
        );
        let rb = self.client.post(self.url("/grades/bulk")).json(payload);
        self.send(self.authed(rb, session))?;
        Ok(())
    }

    fn list_attendance(
        &self,
        session: Option<&Session>,
        subject_id: i64,
        date: &str,
    ) -> ApiResult<Vec<AttendanceRecord>> {
        let query = [
            ("subject_id", subject_id.to_string()),
            ("date", date.to_string()),
        ];
        // A null body is treated the same as an empty list.
        let records: Option<Vec<AttendanceRecord>> =
            self.get_json(session, "/attendance/", &query)?;
        Ok(records.unwrap_or_default())
    }

    fn mark_attendance(
        &self,
        session: Option<&Session>,
        payload: &AttendanceMark,
    ) -> ApiResult<()> {
        debug!(
            subject_id = payload.subject_id,
            date = %payload.date,
            count = payload.attendance.len(),
            "POST /attendance/mark"
        );
        let rb = self.client.post(self.url("/attendance/mark")).json(payload);
        self.send(self.authed(rb, session))?;
        Ok(())
    }
}
