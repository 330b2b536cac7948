//! In-memory backend for unit tests.

use crate::api::{
    ApiResult, AssignmentPayload, AssignmentRecord, AttendanceMark, AttendanceRecord, Backend,
    ClassroomRecord, GradeRecord, GradesBulk, LoginResponse, SubjectRecord,
};
use crate::classroom::Student;
use crate::error::ApiError;
use crate::session::{Session, UserInfo};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    rosters: HashMap<i64, Value>,
    subjects: HashMap<i64, Value>,
    classrooms: HashMap<i64, Vec<ClassroomRecord>>,
    assignments: HashMap<i64, Vec<AssignmentRecord>>,
    grades: HashMap<i64, Vec<GradeRecord>>,
    attendance: HashMap<(i64, String), Value>,
    sent_grades: Vec<GradesBulk>,
    sent_attendance: Vec<AttendanceMark>,
    calls: Vec<String>,
    fail_next: Option<ApiError>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: RefCell<State>,
}

impl FakeBackend {
    pub fn set_roster(&self, subject_id: i64, roster: Value) {
        self.state.borrow_mut().rosters.insert(subject_id, roster);
    }

    pub fn set_subject(&self, subject_id: i64, subject: Value) {
        self.state.borrow_mut().subjects.insert(subject_id, subject);
    }

    pub fn set_classrooms(&self, school_id: i64, rooms: &[(i64, &str)]) {
        let recs = rooms
            .iter()
            .map(|(id, name)| ClassroomRecord {
                id: *id,
                name: Some(name.to_string()),
            })
            .collect();
        self.state.borrow_mut().classrooms.insert(school_id, recs);
    }

    pub fn add_assignment(&self, subject_id: i64, title: &str, max: f64, classroom: Option<i64>) {
        self.state
            .borrow_mut()
            .assignments
            .entry(subject_id)
            .or_default()
            .push(AssignmentRecord {
                title: title.to_string(),
                max_score: Some(max),
                classroom_id: classroom,
            });
    }

    pub fn add_grade(
        &self,
        subject_id: i64,
        title: &str,
        classroom: Option<i64>,
        student_id: i64,
        grade: f64,
    ) {
        self.state
            .borrow_mut()
            .grades
            .entry(subject_id)
            .or_default()
            .push(GradeRecord {
                title: Some(title.to_string()),
                student_id,
                grade: Some(grade),
                classroom_id: classroom,
            });
    }

    pub fn set_attendance(&self, subject_id: i64, date: &str, map: Value) {
        self.state
            .borrow_mut()
            .attendance
            .insert((subject_id, date.to_string()), map);
    }

    /// Make the next backend call fail with the given status and detail.
    pub fn fail_next(&self, status: u16, detail: &str) {
        self.state.borrow_mut().fail_next = Some(ApiError::Status {
            status,
            detail: Some(detail.to_string()),
        });
    }

    pub fn last_grades(&self) -> Option<GradesBulk> {
        self.state.borrow().sent_grades.last().cloned()
    }

    pub fn last_attendance(&self) -> Option<AttendanceMark> {
        self.state.borrow().sent_attendance.last().cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    fn begin(&self, call: String) -> ApiResult<()> {
        let mut st = self.state.borrow_mut();
        st.calls.push(call);
        match st.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn in_scope(record_classroom: Option<i64>, filter: Option<i64>) -> bool {
    match (record_classroom, filter) {
        (_, None) | (None, _) => true,
        (Some(a), Some(b)) => a == b,
    }
}

impl Backend for FakeBackend {
    fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        self.begin(format!("login {username}"))?;
        if password != "secret" {
            return Err(ApiError::NotAuthenticated {
                detail: Some("Invalid username or password".to_string()),
            });
        }
        Ok(LoginResponse {
            access_token: format!("token-{username}"),
            token_type: "bearer".to_string(),
            user_info: UserInfo {
                id: Some(1),
                username: Some(username.to_string()),
                role: Some("teacher".to_string()),
                school_id: Some(1),
                ..UserInfo::default()
            },
        })
    }

    fn subject_students(&self, _: Option<&Session>, subject_id: i64) -> ApiResult<Vec<Student>> {
        self.begin(format!("students {subject_id}"))?;
        let raw = self
            .state
            .borrow()
            .rosters
            .get(&subject_id)
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(raw).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn subject(&self, _: Option<&Session>, subject_id: i64) -> ApiResult<SubjectRecord> {
        self.begin(format!("subject {subject_id}"))?;
        let raw = self.state.borrow().subjects.get(&subject_id).cloned();
        match raw {
            Some(v) => serde_json::from_value(v).map_err(|e| ApiError::Decode(e.to_string())),
            None => Err(ApiError::Status {
                status: 404,
                detail: Some("Subject not found".to_string()),
            }),
        }
    }

    fn school_classrooms(
        &self,
        _: Option<&Session>,
        school_id: i64,
    ) -> ApiResult<Vec<ClassroomRecord>> {
        self.begin(format!("classrooms {school_id}"))?;
        Ok(self
            .state
            .borrow()
            .classrooms
            .get(&school_id)
            .cloned()
            .unwrap_or_default())
    }

    fn list_assignments(
        &self,
        _: Option<&Session>,
        subject_id: i64,
        classroom_id: Option<i64>,
    ) -> ApiResult<Vec<AssignmentRecord>> {
        self.begin(format!("assignments {subject_id} {classroom_id:?}"))?;
        Ok(self
            .state
            .borrow()
            .assignments
            .get(&subject_id)
            .map(|v| {
                v.iter()
                    .filter(|a| in_scope(a.classroom_id, classroom_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_assignment(
        &self,
        _: Option<&Session>,
        subject_id: i64,
        payload: &AssignmentPayload,
    ) -> ApiResult<AssignmentRecord> {
        self.begin(format!("create {subject_id} {}", payload.title))?;
        let rec = AssignmentRecord {
            title: payload.title.clone(),
            max_score: Some(payload.max_score),
            classroom_id: payload.classroom_id,
        };
        self.state
            .borrow_mut()
            .assignments
            .entry(subject_id)
            .or_default()
            .push(rec.clone());
        Ok(rec)
    }

    fn update_assignment(
        &self,
        _: Option<&Session>,
        subject_id: i64,
        title: &str,
        classroom_id: Option<i64>,
        payload: &AssignmentPayload,
    ) -> ApiResult<AssignmentRecord> {
        self.begin(format!("update {subject_id} {title}"))?;
        let mut st = self.state.borrow_mut();
        let list = st.assignments.entry(subject_id).or_default();
        let Some(slot) = list
            .iter_mut()
            .find(|a| a.title == title && a.classroom_id == classroom_id)
        else {
            return Err(ApiError::Status {
                status: 404,
                detail: Some("Assignment not found".to_string()),
            });
        };
        slot.title = payload.title.clone();
        slot.max_score = Some(payload.max_score);
        slot.classroom_id = payload.classroom_id;
        let updated = slot.clone();
        for g in st.grades.entry(subject_id).or_default().iter_mut() {
            if g.title.as_deref() == Some(title) && g.classroom_id == classroom_id {
                g.title = Some(payload.title.clone());
                g.classroom_id = payload.classroom_id;
            }
        }
        Ok(updated)
    }

    fn delete_assignment(
        &self,
        _: Option<&Session>,
        subject_id: i64,
        title: &str,
        classroom_id: Option<i64>,
    ) -> ApiResult<()> {
        self.begin(format!("delete {subject_id} {title}"))?;
        let mut st = self.state.borrow_mut();
        st.assignments
            .entry(subject_id)
            .or_default()
            .retain(|a| !(a.title == title && a.classroom_id == classroom_id));
        st.grades
            .entry(subject_id)
            .or_default()
            .retain(|g| !(g.title.as_deref() == Some(title) && g.classroom_id == classroom_id));
        Ok(())
    }

    fn list_grades(
        &self,
        _: Option<&Session>,
        subject_id: i64,
        classroom_id: Option<i64>,
    ) -> ApiResult<Vec<GradeRecord>> {
        self.begin(format!("grades {subject_id} {classroom_id:?}"))?;
        Ok(self
            .state
            .borrow()
            .grades
            .get(&subject_id)
            .map(|v| {
                v.iter()
                    .filter(|g| in_scope(g.classroom_id, classroom_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn submit_grades(&self, _: Option<&Session>, payload: &GradesBulk) -> ApiResult<()> {
        self.begin(format!("bulk {} {}", payload.subject_id, payload.title))?;
        let mut st = self.state.borrow_mut();
        let list = st.grades.entry(payload.subject_id).or_default();
        for entry in &payload.grades {
            list.retain(|g| {
                !(g.title.as_deref() == Some(payload.title.as_str())
                    && g.classroom_id == payload.classroom_id
                    && g.student_id == entry.student_id)
            });
            list.push(GradeRecord {
                title: Some(payload.title.clone()),
                student_id: entry.student_id,
                grade: entry.grade,
                classroom_id: payload.classroom_id,
            });
        }
        st.sent_grades.push(payload.clone());
        Ok(())
    }

    fn list_attendance(
        &self,
        _: Option<&Session>,
        subject_id: i64,
        date: &str,
    ) -> ApiResult<Vec<AttendanceRecord>> {
        self.begin(format!("attendance {subject_id} {date}"))?;
        let raw = self
            .state
            .borrow()
            .attendance
            .get(&(subject_id, date.to_string()))
            .cloned();
        match raw {
            Some(map) => serde_json::from_value(serde_json::json!([{ "attendance": map }]))
                .map_err(|e| ApiError::Decode(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    fn mark_attendance(&self, _: Option<&Session>, payload: &AttendanceMark) -> ApiResult<()> {
        self.begin(format!("mark {} {}", payload.subject_id, payload.date))?;
        let mut st = self.state.borrow_mut();
        let stored = serde_json::to_value(&payload.attendance).unwrap_or(Value::Null);
        st.attendance
            .insert((payload.subject_id, payload.date.clone()), stored);
        st.sent_attendance.push(payload.clone());
        Ok(())
    }
}
