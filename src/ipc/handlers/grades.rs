use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{commit, grade_value, param_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::model::GradeRecord;
use crate::query;
use serde_json::json;

fn handle_grades_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let unit_id = param_str(req, "unitId")?;
    let store = &state.store;
    if store.unit(unit_id).is_none() {
        return Err(HandlerErr::new("not_found", "unit not found"));
    }
    let grades: Vec<GradeRecord<'_>> = query::grades_by_unit(store, unit_id)
        .into_iter()
        .map(GradeRecord::from)
        .collect();
    Ok(json!({
        "grades": grades,
        "locked": ledger::is_unit_locked(store, unit_id),
    }))
}

fn handle_grades_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = param_str(req, "studentId")?;
    let evaluation_id = param_str(req, "evaluationId")?;
    let value = grade_value(req)?;
    let grade = commit(state, |store| {
        ledger::create_grade(store, student_id, evaluation_id, value)
    })?;
    Ok(json!({ "grade": GradeRecord::from(&grade) }))
}

fn handle_grades_edit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let grade_id = param_str(req, "gradeId")?;
    let value = grade_value(req)?;
    let grade = commit(state, |store| ledger::edit_unlocked_grade(store, grade_id, value))?;
    Ok(json!({ "grade": GradeRecord::from(&grade) }))
}

fn handle_grades_amend(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let grade_id = param_str(req, "gradeId")?;
    let value = grade_value(req)?;
    let reason = req
        .params
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let grade = commit(state, |store| {
        ledger::amend_locked_grade(store, grade_id, value, reason)
    })?;
    Ok(json!({ "grade": GradeRecord::from(&grade) }))
}

fn handle_grades_lock_unit(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let unit_id = param_str(req, "unitId")?;
    let report = commit(state, |store| ledger::lock_unit(store, unit_id))?;
    Ok(json!({
        "unitId": report.unit_id,
        "newlyLocked": report.newly_locked,
        "totalGrades": report.total_grades,
        "locked": report.saved,
    }))
}

fn handle_grades_unit_status(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let unit_id = param_str(req, "unitId")?;
    if state.store.unit(unit_id).is_none() {
        return Err(HandlerErr::new("not_found", "unit not found"));
    }
    Ok(json!({
        "unitId": unit_id,
        "locked": ledger::is_unit_locked(&state.store, unit_id),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.list" => handle_grades_list(state, req),
        "grades.create" => handle_grades_create(state, req),
        "grades.edit" => handle_grades_edit(state, req),
        "grades.amend" => handle_grades_amend(state, req),
        "grades.lockUnit" => handle_grades_lock_unit(state, req),
        "grades.unitStatus" => handle_grades_unit_status(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
