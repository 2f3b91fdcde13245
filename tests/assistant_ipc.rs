mod test_support;

use serde_json::json;
use std::net::TcpListener;
use test_support::{num, request_err, request_ok, spawn_sidecar_with_env, str_at, temp_dir};

fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    format!("http://127.0.0.1:{port}/api/generate")
}

#[test]
fn classify_and_facts_work_without_a_model() {
    let workspace = temp_dir("feedesk-assistant-facts");
    let url = refused_url();
    let (_child, mut stdin, mut reader) =
        spawn_sidecar_with_env(&[("FEEDESK_ASSISTANT_URL", url.as_str())]);

    let verdict = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assistant.classify",
        json!({ "question": "How much FEES is pending?" }),
    );
    assert_eq!(verdict.get("feeRelated"), Some(&json!(true)));
    let verdict = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "assistant.classify",
        json!({ "question": "Who wrote Hamlet?" }),
    );
    assert_eq!(verdict.get("feeRelated"), Some(&json!(false)));

    assert_eq!(
        request_err(&mut stdin, &mut reader, "3", "assistant.facts", json!({})),
        "no_workspace"
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "name": "Joseph Thomas",
            "admissionNo": "F-1",
            "year": 1,
            "academicYear": "2025-2026",
            "group": "BCA"
        }),
    );
    let student_id = str_at(&created, "/student/id");
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "fees.save",
        json!({ "studentId": student_id, "fixed": { "tuition": 6000, "bus": 2000 } }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "payments.record",
        json!({ "feeId": str_at(&saved, "/fee/id"), "category": "tuition", "paidAmount": 1500, "billNo": "F-B1" }),
    );

    let facts = request_ok(&mut stdin, &mut reader, "8", "assistant.facts", json!({}));
    assert_eq!(num(&facts, "/facts/expected"), 8000.0);
    assert_eq!(num(&facts, "/facts/collected"), 1500.0);
    assert_eq!(num(&facts, "/facts/pending"), 6500.0);
    assert_eq!(str_at(&facts, "/facts/topYear"), "2025-2026");
    assert_eq!(facts.get("cached"), Some(&json!(false)));

    let again = request_ok(&mut stdin, &mut reader, "9", "assistant.facts", json!({}));
    assert_eq!(again.get("cached"), Some(&json!(true)));
}

#[test]
fn unreachable_model_surfaces_as_assistant_unavailable() {
    let url = refused_url();
    let (_child, mut stdin, mut reader) =
        spawn_sidecar_with_env(&[("FEEDESK_ASSISTANT_URL", url.as_str())]);

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "1",
            "assistant.ask",
            json!({ "question": "What is the capital of France?" }),
        ),
        "assistant_unavailable"
    );
    assert_eq!(
        request_err(&mut stdin, &mut reader, "2", "assistant.ask", json!({})),
        "bad_params"
    );
}

#[test]
fn silent_model_times_out_into_the_fallback_answer() {
    // Accepts connections (via the backlog) but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!(
        "http://127.0.0.1:{}/api/generate",
        listener.local_addr().expect("addr").port()
    );
    let (_child, mut stdin, mut reader) = spawn_sidecar_with_env(&[
        ("FEEDESK_ASSISTANT_URL", url.as_str()),
        ("FEEDESK_ASSISTANT_TIMEOUT_SECS", "1"),
    ]);

    let answer = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assistant.ask",
        json!({ "question": "Tell me a story" }),
    );
    assert_eq!(answer.get("fallback"), Some(&json!(true)));
    assert_eq!(answer.get("feeRelated"), Some(&json!(false)));
    assert_eq!(
        str_at(&answer, "/answer"),
        "AI is busy right now. Please try again in a moment."
    );
    drop(listener);
}
