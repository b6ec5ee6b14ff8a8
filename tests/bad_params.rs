mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn caller_input_is_validated() {
    let workspace = temp_dir("academicd-bad-params");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "0", "workspace.select", json!({}));
    assert_eq!(error_code(&resp), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let cases = [
        ("dashboard.admin", json!({ "period": "lastDecade" })),
        ("dashboard.admin", json!({ "period": 3 })),
        ("dashboard.admin", json!({ "now": "13/03/2025" })),
        ("dashboard.staff", json!({ "now": "soon" })),
        ("dashboard.teacher", json!({})),
        ("dashboard.teacher", json!({ "teacherId": "teacher-1" })),
        ("dashboard.student", json!({ "studentId": "42" })),
        ("students.performance", json!({ "classId": "abc" })),
        ("classes.performance", json!({ "teacherId": 7 })),
        ("config.update", json!({ "patch": "topClasses=3" })),
        ("config.update", json!({ "patch": { "topClasses": 0 } })),
        ("config.update", json!({ "patch": { "favouriteColour": "red" } })),
    ];
    for (i, (method, params)) in cases.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("b{}", i), method, params.clone());
        assert_eq!(error_code(&resp), "bad_params", "{} {}", method, params);
    }

    let detail = request(
        &mut stdin,
        &mut reader,
        "p",
        "dashboard.admin",
        json!({ "period": "lastDecade" }),
    );
    assert_eq!(detail["error"]["details"]["value"], "lastDecade");
}
