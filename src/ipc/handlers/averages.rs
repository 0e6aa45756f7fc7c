use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{param_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_averages_student(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = param_str(req, "studentId")?;
    let unit_id = param_str(req, "unitId")?;
    let breakdown = calc::compute_unit_average(&state.store, student_id, unit_id)?;
    Ok(json!({
        "studentId": student_id,
        "unitId": unit_id,
        "average": breakdown.final_average,
        "breakdown": breakdown,
    }))
}

fn handle_averages_unit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let unit_id = param_str(req, "unitId")?;
    let summary = calc::compute_unit_summary(&state.store, unit_id)?;
    Ok(json!({ "summary": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "averages.student" => handle_averages_student(state, req),
        "averages.unit" => handle_averages_unit(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
