use super::dashboard::respond;
use crate::ipc::helpers::{db_conn, optional_uuid};
use crate::ipc::types::{AppState, Request};
use crate::performance;
use crate::store::SqliteStore;
use std::time::Instant;

fn handle_teachers(state: &mut AppState, req: &Request) -> serde_json::Value {
    let started = Instant::now();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let store = SqliteStore::new(conn);
    respond(req, started, performance::teachers(&store))
}

fn handle_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let started = Instant::now();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match optional_uuid(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = SqliteStore::new(conn);
    respond(
        req,
        started,
        performance::students(&store, class_id.as_deref()),
    )
}

fn handle_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let started = Instant::now();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let teacher_id = match optional_uuid(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = SqliteStore::new(conn);
    respond(
        req,
        started,
        performance::classes(&store, teacher_id.as_deref()),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.performance" => Some(handle_teachers(state, req)),
        "students.performance" => Some(handle_students(state, req)),
        "classes.performance" => Some(handle_classes(state, req)),
        _ => None,
    }
}
