use crate::config;
use crate::dashboard::{self, admin::Period, DashboardError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, reference_now, required_uuid};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

pub(crate) fn dashboard_err(req: &Request, e: DashboardError) -> serde_json::Value {
    tracing::warn!(method = %req.method, "request failed: {}", e);
    match e {
        DashboardError::NotFound(what) => err(&req.id, "not_found", format!("{} not found", what), None),
        DashboardError::Store(inner) => err(&req.id, "db_query_failed", inner.to_string(), None),
    }
}

pub(crate) fn respond<T: Serialize>(
    req: &Request,
    started: Instant,
    result: Result<T, DashboardError>,
) -> serde_json::Value {
    let payload = match result {
        Ok(v) => v,
        Err(e) => return dashboard_err(req, e),
    };
    tracing::debug!(
        method = %req.method,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
    match serde_json::to_value(payload) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_admin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let started = Instant::now();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let period = match optional_str(req, "period") {
        Ok(None) => Period::ThisMonth,
        Ok(Some(raw)) => match Period::parse(raw) {
            Some(p) => p,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "unknown period",
                    Some(json!({
                        "value": raw,
                        "allowed": ["thisWeek", "thisMonth", "thisQuarter", "thisYear"]
                    })),
                )
            }
        },
        Err(e) => return e,
    };
    let now = match reference_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cfg = match config::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let store = SqliteStore::new(conn);
    respond(req, started, dashboard::admin::assemble(&store, &cfg, period, now))
}

fn handle_staff(state: &mut AppState, req: &Request) -> serde_json::Value {
    let started = Instant::now();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let now = match reference_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cfg = match config::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let store = SqliteStore::new(conn);
    respond(req, started, dashboard::staff::assemble(&store, &cfg, now))
}

fn handle_teacher(state: &mut AppState, req: &Request) -> serde_json::Value {
    let started = Instant::now();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let teacher_id = match required_uuid(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match reference_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cfg = match config::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let store = SqliteStore::new(conn);
    respond(
        req,
        started,
        dashboard::teacher::assemble(&store, &cfg, &teacher_id, now),
    )
}

fn handle_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let started = Instant::now();
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_uuid(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let now = match reference_now(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cfg = match config::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let store = SqliteStore::new(conn);
    respond(
        req,
        started,
        dashboard::student::assemble(&store, &cfg, &student_id, now),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.admin" => Some(handle_admin(state, req)),
        "dashboard.staff" => Some(handle_staff(state, req)),
        "dashboard.teacher" => Some(handle_teacher(state, req)),
        "dashboard.student" => Some(handle_student(state, req)),
        _ => None,
    }
}
