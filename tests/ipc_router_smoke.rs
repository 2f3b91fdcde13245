mod test_support;

use serde_json::json;
use test_support::{request, request_err, send_line, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("feedesk-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // Before a workspace is selected every store-backed family says so, the same way.
    let families = [
        "admins.list",
        "students.list",
        "fees.get",
        "payments.history",
        "reports.dashboard",
        "assistant.facts",
    ];
    for (i, method) in families.iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("nw{i}"), method, json!({}));
        assert_eq!(resp.pointer("/error/code"), Some(&json!("no_workspace")), "{}", method);
        assert_eq!(
            resp.pointer("/error/message"),
            Some(&json!("select a workspace first")),
            "{}",
            method
        );
    }

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok"), Some(&json!(true)));
    assert_eq!(
        health.pointer("/result/version").and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let calls = [
        ("admins.list", json!({})),
        ("admins.create", json!({})),
        ("students.list", json!({})),
        ("students.create", json!({})),
        ("students.get", json!({ "studentId": "missing" })),
        ("students.search", json!({ "query": "missing" })),
        ("students.delete", json!({ "studentId": "missing" })),
        ("fees.get", json!({ "studentId": "missing" })),
        ("fees.save", json!({ "studentId": "missing", "fixed": {} })),
        ("payments.quote", json!({ "feeId": "missing", "category": "tuition" })),
        ("payments.record", json!({})),
        ("payments.history", json!({})),
        ("payments.delete", json!({ "paymentId": "missing" })),
        ("payments.receipt", json!({ "paymentId": "missing" })),
        ("reports.feeReport", json!({})),
        ("reports.dashboard", json!({})),
        ("assistant.classify", json!({ "question": "any dues?" })),
        ("assistant.facts", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("c{i}"), method, params);
        if resp.get("ok") == Some(&json!(false)) {
            let code = resp.pointer("/error/code").and_then(|v| v.as_str());
            assert_ne!(code, Some("not_implemented"), "{} was not routed", method);
            assert_ne!(code, Some("no_workspace"), "{} lost the workspace", method);
        }
    }

    assert_eq!(
        request_err(&mut stdin, &mut reader, "u1", "fees.setDiscounts", json!({})),
        "not_implemented"
    );
    let bad = send_line(&mut stdin, &mut reader, "{not json");
    assert_eq!(bad.pointer("/error/code"), Some(&json!("bad_json")));

    // The loop keeps serving after a malformed line.
    let health = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health.get("ok"), Some(&json!(true)));

    drop(stdin);
    let status = child.wait().expect("sidecar exit");
    assert!(status.success());
}
