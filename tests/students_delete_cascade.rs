mod test_support;

use serde_json::json;
use test_support::{num, request_err, request_ok, spawn_sidecar, str_at, temp_dir};

#[test]
fn deleting_a_student_removes_schedule_and_payments() {
    let workspace = temp_dir("feedesk-students-cascade");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let mut ids = Vec::new();
    for (i, (name, adm)) in [("Kiran Pillai", "C-1"), ("Latha Nair", "C-2")].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{i}"),
            "students.create",
            json!({
                "name": name,
                "admissionNo": adm,
                "year": 1,
                "academicYear": "2025-2026",
                "group": "BCA"
            }),
        );
        let student_id = str_at(&created, "/student/id");
        let saved = request_ok(
            &mut stdin,
            &mut reader,
            &format!("f{i}"),
            "fees.save",
            json!({ "studentId": student_id, "fixed": { "tuition": 4000, "bus": 1000 } }),
        );
        let fee_id = str_at(&saved, "/fee/id");
        for (j, category) in ["tuition", "bus"].iter().enumerate() {
            request_ok(
                &mut stdin,
                &mut reader,
                &format!("p{i}{j}"),
                "payments.record",
                json!({
                    "feeId": fee_id,
                    "category": category,
                    "paidAmount": 500,
                    "billNo": format!("{adm}-{j}"),
                    "paymentDate": "2025-06-10"
                }),
            );
        }
        ids.push(student_id);
    }

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "students.delete",
        json!({ "studentId": ids[0] }),
    );
    assert_eq!(num(&deleted, "/deleted/payments"), 2.0);
    assert_eq!(num(&deleted, "/deleted/feeSchedules"), 1.0);
    assert_eq!(num(&deleted, "/deleted/students"), 1.0);

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "g1",
            "students.get",
            json!({ "studentId": ids[0] }),
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "d2",
            "students.delete",
            json!({ "studentId": ids[0] }),
        ),
        "not_found"
    );

    let history = request_ok(&mut stdin, &mut reader, "h1", "payments.history", json!({}));
    let rows = history.get("payments").and_then(|v| v.as_array()).expect("payments");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.get("admissionNo") == Some(&json!("C-2"))));

    let dashboard = request_ok(&mut stdin, &mut reader, "r1", "reports.dashboard", json!({}));
    assert_eq!(num(&dashboard, "/totalStudents"), 1.0);
    assert_eq!(num(&dashboard, "/totalExpected"), 5000.0);
    assert_eq!(num(&dashboard, "/totalCollected"), 1000.0);
    assert_eq!(num(&dashboard, "/totalBalance"), 4000.0);

    // The deleted student's admission number is free again.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "s9",
        "students.create",
        json!({
            "name": "Kiran Pillai",
            "admissionNo": "C-1",
            "year": 1,
            "academicYear": "2025-2026",
            "group": "BCA"
        }),
    );
    assert_eq!(str_at(&again, "/student/admissionNo"), "C-1");
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "s10",
            "students.create",
            json!({
                "name": "Someone Else",
                "admissionNo": "C-2",
                "year": 1,
                "academicYear": "2025-2026",
                "group": "BCA"
            }),
        ),
        "duplicate_admission_no"
    );
}

#[test]
fn search_returns_the_payment_desk_view() {
    let workspace = temp_dir("feedesk-students-search");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "name": "Fathima Beevi",
            "admissionNo": "S-77",
            "year": 2,
            "academicYear": "2024-2025",
            "group": "BSc"
        }),
    );
    let student_id = str_at(&created, "/student/id");

    let bare = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.search",
        json!({ "query": "fathima" }),
    );
    assert_eq!(str_at(&bare, "/student/id"), student_id);
    assert_eq!(bare.get("fee"), Some(&json!(null)));

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "fees.save",
        json!({ "studentId": student_id, "fixed": { "stationary": 600 } }),
    );
    let fee_id = str_at(&saved, "/fee/id");
    for (id, bill, date) in [("5", "X-1", "2025-01-05"), ("6", "X-2", "2025-02-05")] {
        request_ok(
            &mut stdin,
            &mut reader,
            id,
            "payments.record",
            json!({
                "feeId": fee_id,
                "category": "stationary",
                "paidAmount": 100,
                "billNo": bill,
                "paymentDate": date
            }),
        );
    }

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.search",
        json!({ "query": "s-77" }),
    );
    assert_eq!(num(&found, "/balances/balances/stationary"), 400.0);
    assert_eq!(str_at(&found, "/payments/0/billNo"), "X-2");
    assert_eq!(str_at(&found, "/payments/1/billNo"), "X-1");

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "8",
            "students.search",
            json!({ "query": "nobody" }),
        ),
        "not_found"
    );
}
