//! Shared harness: a mock school REST backend served by axum, and the sidecar process driven
//! over stdin/stdout.
#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

pub const PASSWORD: &str = "secret";

#[derive(Default)]
pub struct MockData {
    pub rosters: HashMap<i64, Value>,
    pub subjects: HashMap<i64, Value>,
    pub classrooms: HashMap<i64, Value>,
    pub assignments: HashMap<i64, Vec<Value>>,
    pub grades: HashMap<i64, Vec<Value>>,
    pub attendance: HashMap<(i64, String), Value>,
    pub bulk_posts: Vec<Value>,
    pub attendance_posts: Vec<Value>,
    pub reject_bulk: Option<(u16, String)>,
}

impl MockData {
    pub fn assignment(&mut self, subject_id: i64, title: &str, max: f64, classroom: Option<i64>) {
        self.assignments.entry(subject_id).or_default().push(json!({
            "title": title,
            "max_score": max,
            "classroom_id": classroom,
        }));
    }

    pub fn grade(&mut self, subject_id: i64, title: &str, classroom: Option<i64>, sid: i64, g: f64) {
        self.grades.entry(subject_id).or_default().push(json!({
            "title": title,
            "student_id": sid,
            "grade": g,
            "classroom_id": classroom,
        }));
    }
}

type Shared = Arc<Mutex<MockData>>;
type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn fail(status: StatusCode, detail: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": detail })))
}

fn authed(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let ok = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("Bearer token-"))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(fail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }
}

fn classroom_param(q: &HashMap<String, String>) -> Option<i64> {
    q.get("classroom_id").and_then(|v| v.parse().ok())
}

fn in_scope(record: &Value, classroom: Option<i64>) -> bool {
    match (record["classroom_id"].as_i64(), classroom) {
        (_, None) | (None, _) => true,
        (Some(a), Some(b)) => a == b,
    }
}

fn same_key(record: &Value, title: &str, classroom: Option<i64>) -> bool {
    record["title"].as_str() == Some(title) && record["classroom_id"].as_i64() == classroom
}

async fn login(Form(form): Form<HashMap<String, String>>) -> Reply {
    let username = form.get("username").cloned().unwrap_or_default();
    if form.get("password").map(String::as_str) != Some(PASSWORD) {
        return Err(fail(StatusCode::UNAUTHORIZED, "Incorrect username or password"));
    }
    Ok(Json(json!({
        "access_token": format!("token-{username}"),
        "token_type": "bearer",
        "user_info": {
            "id": 5,
            "username": username,
            "full_name": "Teacher One",
            "role": "teacher",
            "school_id": "1",
            "school_name": "-",
        },
    })))
}

async fn students(State(st): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    authed(&headers)?;
    let data = st.lock().expect("mock lock");
    Ok(Json(data.rosters.get(&id).cloned().unwrap_or(json!([]))))
}

async fn subject(State(st): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    authed(&headers)?;
    let data = st.lock().expect("mock lock");
    data.subjects
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "Subject not found"))
}

async fn school_classrooms(
    State(st): State<Shared>,
    headers: HeaderMap,
    Path(school_id): Path<i64>,
) -> Reply {
    authed(&headers)?;
    let data = st.lock().expect("mock lock");
    Ok(Json(data.classrooms.get(&school_id).cloned().unwrap_or(json!([]))))
}

async fn list_assignments(
    State(st): State<Shared>,
    headers: HeaderMap,
    Path(subject_id): Path<i64>,
    Query(q): Query<HashMap<String, String>>,
) -> Reply {
    authed(&headers)?;
    let data = st.lock().expect("mock lock");
    let classroom = classroom_param(&q);
    let list: Vec<Value> = data
        .assignments
        .get(&subject_id)
        .map(|v| v.iter().filter(|a| in_scope(a, classroom)).cloned().collect())
        .unwrap_or_default();
    Ok(Json(json!(list)))
}

async fn create_assignment(
    State(st): State<Shared>,
    headers: HeaderMap,
    Path(subject_id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    authed(&headers)?;
    let mut data = st.lock().expect("mock lock");
    let title = body["title"].as_str().unwrap_or_default().to_string();
    let classroom = body["classroom_id"].as_i64();
    let list = data.assignments.entry(subject_id).or_default();
    if list.iter().any(|a| same_key(a, &title, classroom)) {
        return Err(fail(StatusCode::BAD_REQUEST, "Assignment already exists"));
    }
    list.push(body.clone());
    Ok(Json(body))
}

async fn update_assignment(
    State(st): State<Shared>,
    headers: HeaderMap,
    Path((subject_id, title)): Path<(i64, String)>,
    Query(q): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Reply {
    authed(&headers)?;
    let mut data = st.lock().expect("mock lock");
    let classroom = classroom_param(&q);
    let list = data.assignments.entry(subject_id).or_default();
    let Some(slot) = list.iter_mut().find(|a| same_key(a, &title, classroom)) else {
        return Err(fail(StatusCode::NOT_FOUND, "Assignment not found"));
    };
    *slot = body.clone();
    for g in data.grades.entry(subject_id).or_default().iter_mut() {
        if same_key(g, &title, classroom) {
            g["title"] = body["title"].clone();
            g["classroom_id"] = body["classroom_id"].clone();
        }
    }
    Ok(Json(body))
}

async fn delete_assignment(
    State(st): State<Shared>,
    headers: HeaderMap,
    Path((subject_id, title)): Path<(i64, String)>,
    Query(q): Query<HashMap<String, String>>,
) -> Reply {
    authed(&headers)?;
    let mut data = st.lock().expect("mock lock");
    let classroom = classroom_param(&q);
    data.assignments
        .entry(subject_id)
        .or_default()
        .retain(|a| !same_key(a, &title, classroom));
    data.grades
        .entry(subject_id)
        .or_default()
        .retain(|g| !same_key(g, &title, classroom));
    Ok(Json(json!({ "message": "deleted" })))
}

async fn list_grades(
    State(st): State<Shared>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Reply {
    authed(&headers)?;
    let data = st.lock().expect("mock lock");
    let subject_id: i64 = q
        .get("subject_id")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| fail(StatusCode::UNPROCESSABLE_ENTITY, "subject_id required"))?;
    let classroom = classroom_param(&q);
    let list: Vec<Value> = data
        .grades
        .get(&subject_id)
        .map(|v| v.iter().filter(|g| in_scope(g, classroom)).cloned().collect())
        .unwrap_or_default();
    Ok(Json(json!(list)))
}

async fn bulk_grades(
    State(st): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    authed(&headers)?;
    let mut data = st.lock().expect("mock lock");
    if let Some((status, detail)) = data.reject_bulk.clone() {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err(fail(code, &detail));
    }
    let subject_id = body["subject_id"].as_i64().unwrap_or_default();
    let title = body["title"].as_str().unwrap_or_default().to_string();
    let classroom = body["classroom_id"].as_i64();
    let entries = body["grades"].as_array().cloned().unwrap_or_default();
    let list = data.grades.entry(subject_id).or_default();
    for e in &entries {
        let sid = e["student_id"].as_i64();
        list.retain(|g| !(same_key(g, &title, classroom) && g["student_id"].as_i64() == sid));
        list.push(json!({
            "title": title,
            "student_id": sid,
            "grade": e["grade"],
            "classroom_id": classroom,
        }));
    }
    data.bulk_posts.push(body);
    Ok(Json(json!({ "message": "saved", "count": entries.len() })))
}

async fn list_attendance(
    State(st): State<Shared>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Reply {
    authed(&headers)?;
    let data = st.lock().expect("mock lock");
    let subject_id: i64 = q
        .get("subject_id")
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    let date = q.get("date").cloned().unwrap_or_default();
    Ok(Json(match data.attendance.get(&(subject_id, date)) {
        Some(map) => json!([{ "attendance": map }]),
        None => json!([]),
    }))
}

async fn mark_attendance(
    State(st): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    authed(&headers)?;
    let mut data = st.lock().expect("mock lock");
    let subject_id = body["subject_id"].as_i64().unwrap_or_default();
    let date = body["date"].as_str().unwrap_or_default().to_string();
    data.attendance
        .insert((subject_id, date), body["attendance"].clone());
    data.attendance_posts.push(body);
    Ok(Json(json!({ "message": "saved" })))
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/users/login", post(login))
        .route("/subjects/{id}/students", get(students))
        .route("/subjects/{id}", get(subject))
        .route("/classrooms/list/{school_id}", get(school_classrooms))
        .route(
            "/grades/assignments/{subject_id}",
            get(list_assignments).post(create_assignment),
        )
        .route(
            "/grades/assignments/{subject_id}/{title}",
            put(update_assignment).delete(delete_assignment),
        )
        .route("/grades/", get(list_grades))
        .route("/grades/bulk", post(bulk_grades))
        .route("/attendance/", get(list_attendance))
        .route("/attendance/mark", post(mark_attendance))
        .with_state(state)
}

pub struct MockServer {
    pub url: String,
    pub data: Shared,
}

impl MockServer {
    pub fn start(data: MockData) -> Self {
        let data = Arc::new(Mutex::new(data));
        let shared = data.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime");
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind mock backend");
                tx.send(listener.local_addr().expect("local addr"))
                    .expect("send addr");
                axum::serve(listener, router(shared))
                    .await
                    .expect("serve mock backend");
            });
        });
        let addr = rx.recv().expect("mock backend address");
        Self {
            url: format!("http://{addr}"),
            data,
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockData) -> R) -> R {
        let mut data = self.data.lock().expect("mock lock");
        f(&mut data)
    }
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn(api_url: &str) -> Self {
        let exe = env!("CARGO_BIN_EXE_classbookd");
        let mut child = Command::new(exe)
            .env("CLASSBOOKD_API_URL", api_url)
            .env("CLASSBOOKD_TIMEOUT_SECS", "5")
            .env("CLASSBOOKD_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn classbookd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Call a method that must succeed and return its `result`.
    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let resp = self.request(method, params);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
        resp["result"].clone()
    }

    /// Call a method that must fail and return its `error`.
    pub fn fail(&mut self, method: &str, params: Value) -> Value {
        let resp = self.request(method, params);
        assert_eq!(resp["ok"], false, "{} unexpectedly succeeded: {}", method, resp);
        resp["error"].clone()
    }

    pub fn sign_in(&mut self) -> Value {
        self.ok(
            "session.signIn",
            json!({ "username": "teacher1", "password": PASSWORD }),
        )
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Two classrooms with server ids, three students, one subject with scoring metadata.
pub fn school() -> MockData {
    let mut data = MockData::default();
    data.rosters.insert(
        7,
        json!([
            { "id": 1, "full_name": "Aisha", "classroom": { "id": 10, "name": "ป.1/1" } },
            { "id": 2, "full_name": "Bilal", "classroom": { "id": 10, "name": "ป.1/1" } },
            { "id": 3, "full_name": "Chen", "classroom": { "id": 11, "name": "ป.1/2" } },
        ]),
    );
    data.subjects.insert(
        7,
        json!({ "id": 7, "name": "Mathematics", "subject_type": "main",
                "max_collected_score": 70, "max_exam_score": 30 }),
    );
    data.assignment(7, "Quiz 1", 10.0, None);
    data.assignment(7, "Lab", 20.0, Some(10));
    data.assignment(7, "Final exam", 50.0, None);
    data.grade(7, "Quiz 1", None, 1, 8.0);
    data.grade(7, "Lab", Some(10), 1, 15.0);
    data.grade(7, "Final exam", None, 1, 40.0);
    data
}
