use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOK_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(&mut stdin, &mut reader, "2", "dashboard.stats", json!({}));
    let year = request(
        &mut stdin,
        &mut reader,
        "3",
        "years.create",
        json!({ "name": "2024-2025" }),
    );
    let year_id = year["result"]["year"]["id"].as_str().unwrap_or("").to_string();
    let _ = request(&mut stdin, &mut reader, "4", "years.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "years.setActive",
        json!({ "yearId": year_id }),
    );

    let class = request(
        &mut stdin,
        &mut reader,
        "6",
        "classes.create",
        json!({ "name": "6e A" }),
    );
    let class_id = class["result"]["classId"].as_str().unwrap_or("").to_string();
    let _ = request(&mut stdin, &mut reader, "7", "classes.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "classes.update",
        json!({ "classId": class_id, "name": "6e A bis" }),
    );

    let student = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.create",
        json!({ "classId": class_id, "firstName": "Ana", "lastName": "Martin" }),
    );
    let student_id = student["result"]["student"]["id"]
        .as_str()
        .unwrap_or("")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "students.list",
        json!({ "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "students.update",
        json!({ "classId": class_id, "studentId": student_id, "patch": { "studentId": "E-42" } }),
    );

    let unit = request(
        &mut stdin,
        &mut reader,
        "12",
        "units.create",
        json!({ "classId": class_id, "name": "Anglais" }),
    );
    let unit_id = unit["result"]["unitId"].as_str().unwrap_or("").to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "units.list",
        json!({ "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "units.get",
        json!({ "unitId": unit_id }),
    );

    let eval = request(
        &mut stdin,
        &mut reader,
        "15",
        "evaluations.create",
        json!({ "unitId": unit_id, "name": "Quiz" }),
    );
    let eval_id = eval["result"]["evaluationId"].as_str().unwrap_or("").to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "evaluations.list",
        json!({ "unitId": unit_id }),
    );

    let grade = request(
        &mut stdin,
        &mut reader,
        "17",
        "grades.create",
        json!({ "studentId": student_id, "evaluationId": eval_id, "value": 11 }),
    );
    let grade_id = grade["result"]["grade"]["id"].as_str().unwrap_or("").to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "grades.edit",
        json!({ "gradeId": grade_id, "value": 12 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "grades.list",
        json!({ "unitId": unit_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "grades.lockUnit",
        json!({ "unitId": unit_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "grades.unitStatus",
        json!({ "unitId": unit_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "22",
        "grades.amend",
        json!({ "gradeId": grade_id, "value": 13, "reason": "typo" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "averages.student",
        json!({ "studentId": student_id, "unitId": unit_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "24",
        "averages.unit",
        json!({ "unitId": unit_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "25",
        "students.delete",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    let deleted = request(
        &mut stdin,
        &mut reader,
        "26",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    assert_eq!(deleted["ok"].as_bool(), Some(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_methods_are_reported() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(
        stdin,
        "{}",
        json!({ "id": "x1", "method": "grades.teleport", "params": {} })
    )
    .expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["id"].as_str(), Some("x1"));
    assert_eq!(value["ok"].as_bool(), Some(false));
    assert_eq!(value["error"]["code"].as_str(), Some("not_implemented"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "x2",
        "grades.lockUnit",
        json!({ "unitId": "nope" }),
    );
    assert_eq!(missing["error"]["code"].as_str(), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
}
