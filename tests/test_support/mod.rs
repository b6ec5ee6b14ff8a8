#![allow(dead_code)]

use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_academicd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn academicd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn send_line(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, line: &str) -> serde_json::Value {
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");
    let mut out = String::new();
    reader.read_line(&mut out).expect("read response line");
    assert!(!out.trim().is_empty(), "empty response for {}", line);
    serde_json::from_str(out.trim()).expect("parse response json")
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    let value = send_line(stdin, reader, &payload.to_string());
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .cloned()
            .unwrap_or_else(|| json!({ "message": "unknown error" }))
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// Deterministic UUID for fixture rows.
pub fn uid(n: u32) -> String {
    format!("00000000-0000-4000-8000-{:012}", n)
}

/// Writes fixture rows straight into a workspace the daemon has already opened.
pub struct Seed {
    conn: Connection,
}

impl Seed {
    pub fn open(workspace: &Path) -> Self {
        let conn = Connection::open(workspace.join("academic.sqlite3")).expect("open workspace db");
        Self { conn }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn user(&self, id: &str, name: &str, role: &str, status: &str, created_at: &str) {
        self.conn
            .execute(
                "INSERT INTO users(id, name, email, role, status, phone, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (id, name, format!("{}@example.com", &id[24..]), role, status, "0901000000", created_at),
            )
            .expect("insert user");
    }

    pub fn course(&self, id: &str, price: f64) {
        self.conn
            .execute(
                "INSERT INTO courses(id, name, price) VALUES(?, ?, ?)",
                (id, "IELTS Foundation", price),
            )
            .expect("insert course");
    }

    pub fn class(&self, id: &str, name: &str, course: &str, teacher: &str, level: &str, status: &str, created_at: &str) {
        self.conn
            .execute(
                "INSERT INTO classes(id, name, course_id, teacher_id, course_level, status, room, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (id, name, course, teacher, level, status, "P.101", created_at),
            )
            .expect("insert class");
    }

    pub fn class_dates(&self, id: &str, start: &str, end: &str) {
        self.conn
            .execute(
                "UPDATE classes SET start_date = ?, end_date = ? WHERE id = ?",
                (start, end, id),
            )
            .expect("update class dates");
    }

    pub fn enroll(&self, id: &str, class: &str, student: &str, status: &str, created_at: &str) {
        self.conn
            .execute(
                "INSERT INTO enrollments(id, class_id, student_id, status, created_at) VALUES(?, ?, ?, ?, ?)",
                (id, class, student, status, created_at),
            )
            .expect("insert enrollment");
    }

    /// Skills in listening, reading, speaking, writing order.
    pub fn score(&self, enrollment: &str, skills: [Option<f64>; 4]) {
        self.conn
            .execute(
                "INSERT INTO scores(id, enrollment_id, listening, reading, speaking, writing)
                 VALUES(?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    uuid::Uuid::new_v4().to_string(),
                    enrollment,
                    skills[0],
                    skills[1],
                    skills[2],
                    skills[3]
                ],
            )
            .expect("insert score");
    }

    pub fn schedule(&self, class: &str, weekday: &str, start: &str, end: &str) {
        self.conn
            .execute(
                "INSERT INTO schedules(id, class_id, weekday, start_time, end_time) VALUES(?, ?, ?, ?, ?)",
                (uuid::Uuid::new_v4().to_string(), class, weekday, start, end),
            )
            .expect("insert schedule");
    }

    pub fn exam(&self, id: &str, class: &str, name: &str, start: &str) {
        self.conn
            .execute(
                "INSERT INTO exams(id, class_id, name, duration, start_time) VALUES(?, ?, ?, 120, ?)",
                (id, class, name, start),
            )
            .expect("insert exam");
    }

    /// One session with an attendance and a homework row per `(student, present, homework status)`.
    pub fn session(&self, class: &str, created_at: &str, rows: &[(&str, bool, &str)]) {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO sessions(id, class_id, topic, created_at) VALUES(?, ?, ?, ?)",
                (&session_id, class, "Unit", created_at),
            )
            .expect("insert session");
        for (student, present, hw) in rows {
            self.conn
                .execute(
                    "INSERT INTO attendances(id, session_id, student_id, is_present) VALUES(?, ?, ?, ?)",
                    (uuid::Uuid::new_v4().to_string(), &session_id, student, *present as i64),
                )
                .expect("insert attendance");
            self.conn
                .execute(
                    "INSERT INTO homeworks(id, session_id, student_id, status) VALUES(?, ?, ?, ?)",
                    (uuid::Uuid::new_v4().to_string(), &session_id, student, hw),
                )
                .expect("insert homework");
        }
    }
}
