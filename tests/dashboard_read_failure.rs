mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{Child, ChildStdin, ChildStdout};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir, uid, Seed};

struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

/// Opens a workspace holding one teacher, one class and one enrolled student.
fn open_workspace(prefix: &str) -> (Sidecar, Seed) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seed = Seed::open(&workspace);
    let teacher = uid(1);
    seed.user(&teacher, "Tran Binh", "teacher", "active", "2024-01-01T00:00:00Z");
    seed.user(&uid(20), "Lan", "student", "active", "2025-01-01T00:00:00Z");
    seed.course(&uid(2), 1.0);
    seed.class(&uid(10), "A1 Sang", &uid(2), &teacher, "A1", "active", "2025-01-01T00:00:00Z");
    seed.enroll(&uid(30), &uid(10), &uid(20), "active", "2025-03-01T00:00:00Z");
    (
        Sidecar {
            _child: child,
            stdin,
            reader,
        },
        seed,
    )
}

fn assert_aborted(response: &serde_json::Value) {
    assert_eq!(response["ok"], false);
    assert_eq!(error_code(response), "db_query_failed");
    assert!(response.get("result").is_none(), "partial result leaked: {}", response);
}

#[test]
fn unreadable_homework_status_aborts_staff_dashboard() {
    let (mut sc, seed) = open_workspace("academicd-read-failure-hw");
    let student = uid(20);
    seed.session(&uid(10), "2025-03-10T08:00:00Z", &[(student.as_str(), true, "lost")]);

    let resp = request(
        &mut sc.stdin,
        &mut sc.reader,
        "2",
        "dashboard.staff",
        json!({ "now": "2025-03-13T08:00:00Z" }),
    );
    assert_aborted(&resp);

    // The daemon keeps serving after a failed read.
    let health = request_ok(&mut sc.stdin, &mut sc.reader, "3", "health", json!({}));
    assert!(health.get("version").is_some());
}

#[test]
fn unparseable_timestamp_aborts_every_dashboard() {
    let (mut sc, seed) = open_workspace("academicd-read-failure-ts");
    let student = uid(20);
    seed.session(&uid(10), "2025-03-10T08:00:00Z", &[(student.as_str(), true, "passed")]);
    seed.conn()
        .execute("UPDATE sessions SET created_at = 'last tuesday'", [])
        .expect("corrupt session timestamp");

    let calls = [
        ("dashboard.admin", json!({})),
        ("dashboard.staff", json!({})),
        ("dashboard.teacher", json!({ "teacherId": uid(1) })),
        ("dashboard.student", json!({ "studentId": uid(20) })),
        ("teachers.performance", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut sc.stdin, &mut sc.reader, &format!("r{}", i), method, params);
        assert_aborted(&resp);
    }
}
