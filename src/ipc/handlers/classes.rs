use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{commit, opt_param_str, param_as, param_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::NewStudent;
use crate::query;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = &state.store;
    let classes: Vec<_> = match opt_param_str(req, "yearId") {
        Some(year_id) => query::classes_by_year(store, year_id),
        None => store.classes.iter().collect(),
    };

    let rows: Vec<_> = classes
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "schoolYearId": c.school_year_id,
                "createdAt": c.created_at,
                "studentCount": c.students.len(),
                "unitCount": query::units_by_class(store, &c.id).len(),
            })
        })
        .collect();
    Ok(json!({ "classes": rows }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = param_str(req, "name")?;
    // The UI creates classes inside the active year unless told otherwise.
    let year_id = match opt_param_str(req, "schoolYearId") {
        Some(v) => v.to_string(),
        None => state
            .store
            .active_year_id
            .clone()
            .ok_or_else(|| HandlerErr::bad_params("no schoolYearId given and no active year"))?,
    };
    let students: Vec<NewStudent> = match req.params.get("students") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => param_as(v.clone(), "students")?,
    };

    let class = commit(state, |store| store.create_class(name, &year_id, students))?;
    tracing::info!(class_id = %class.id, students = class.students.len(), "class created");
    Ok(json!({ "classId": class.id, "class": class }))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    let name = param_str(req, "name")?;
    let class = commit(state, |store| store.rename_class(class_id, name))?;
    Ok(json!({ "class": class }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    let report = commit(state, |store| store.delete_class(class_id))?;
    if report.orphaned_grades > 0 {
        tracing::warn!(
            class_id,
            orphaned_grades = report.orphaned_grades,
            "class deleted; its grades were kept without an evaluation"
        );
    }
    Ok(json!({
        "ok": true,
        "unitsRemoved": report.units_removed,
        "evaluationsRemoved": report.evaluations_removed,
        "orphanedGrades": report.orphaned_grades,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => handle_classes_list(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.update" => handle_classes_update(state, req),
        "classes.delete" => handle_classes_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
