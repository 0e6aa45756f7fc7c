use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{commit, param_as, param_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::{NewStudent, StudentPatch};
use crate::query;
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    if state.store.class(class_id).is_none() {
        return Err(HandlerErr::new("not_found", "class not found"));
    }
    Ok(json!({ "students": query::students_by_class(&state.store, class_id) }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    let input: NewStudent = param_as(req.params.clone(), "student")?;
    let student = commit(state, |store| store.add_student(class_id, input))?;
    Ok(json!({ "student": student }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    let student_id = param_str(req, "studentId")?;
    let patch: StudentPatch = match req.params.get("patch") {
        Some(v) => param_as(v.clone(), "patch")?,
        None => return Err(HandlerErr::bad_params("missing patch")),
    };
    let student = commit(state, |store| store.update_student(class_id, student_id, patch))?;
    Ok(json!({ "student": student }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    let student_id = param_str(req, "studentId")?;
    let grades_removed = commit(state, |store| store.delete_student(class_id, student_id))?;
    tracing::info!(student_id, grades_removed, "student deleted");
    Ok(json!({ "ok": true, "gradesRemoved": grades_removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
