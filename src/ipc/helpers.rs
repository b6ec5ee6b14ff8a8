use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::parse_timestamp;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Stored ids are hyphenated UUIDs; lookups ignore case, so callers may send any case.
fn parse_uuid(req: &Request, key: &str, raw: &str) -> Result<String, serde_json::Value> {
    Uuid::parse_str(raw.trim())
        .map(|u| u.to_string())
        .map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a UUID", key),
                Some(json!({ "value": raw, "reason": e.to_string() })),
            )
        })
}

/// Required id parameter, normalised to lowercase hyphenated form.
pub fn required_uuid(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let raw = req
        .params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    parse_uuid(req, key, raw)
}

pub fn optional_uuid(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let raw = v
                .as_str()
                .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a string", key), None))?;
            parse_uuid(req, key, raw).map(Some)
        }
    }
}

pub fn optional_str<'r>(req: &'r Request, key: &str) -> Result<Option<&'r str>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a string", key), None)),
    }
}

/// Reference instant from `params.now`, or the wall clock.
pub fn reference_now(req: &Request) -> Result<DateTime<Utc>, serde_json::Value> {
    match optional_str(req, "now")? {
        None => Ok(Utc::now()),
        Some(raw) => parse_timestamp(raw).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "now must be an RFC 3339 timestamp or YYYY-MM-DD",
                Some(json!({ "value": raw })),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(params: serde_json::Value) -> Request {
        Request {
            id: "1".into(),
            method: "x".into(),
            params,
        }
    }

    #[test]
    fn uuid_params_are_validated() {
        let r = req(json!({ "teacherId": "6F9619FF-8B86-D011-B42D-00C04FC964FF" }));
        assert_eq!(
            required_uuid(&r, "teacherId").expect("uuid"),
            "6f9619ff-8b86-d011-b42d-00c04fc964ff"
        );
        let bad = required_uuid(&req(json!({ "teacherId": "t1" })), "teacherId").expect_err("bad");
        assert_eq!(bad["error"]["code"], "bad_params");
        let missing = required_uuid(&req(json!({})), "teacherId").expect_err("missing");
        assert_eq!(missing["error"]["message"], "missing teacherId");
        assert_eq!(optional_uuid(&req(json!({ "classId": null })), "classId").expect("null"), None);
    }

    #[test]
    fn now_accepts_date_and_rejects_garbage() {
        let at = reference_now(&req(json!({ "now": "2025-03-01" }))).expect("date");
        assert_eq!(at.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        let e = reference_now(&req(json!({ "now": "yesterday" }))).expect_err("bad");
        assert_eq!(e["error"]["code"], "bad_params");
        assert!(reference_now(&req(json!({}))).is_ok());
    }
}
