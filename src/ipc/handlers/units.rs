use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{commit, param_as, param_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::model::GradeRule;
use crate::query;
use serde_json::json;

fn handle_units_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    let store = &state.store;
    let units: Vec<_> = query::units_by_class(store, class_id)
        .into_iter()
        .map(|u| {
            json!({
                "unit": u,
                "locked": ledger::is_unit_locked(store, &u.id),
                "evaluationCount": query::evaluations_by_unit(store, &u.id).len(),
            })
        })
        .collect();
    Ok(json!({ "units": units }))
}

fn handle_units_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let unit_id = param_str(req, "unitId")?;
    let store = &state.store;
    let Some(unit) = store.unit(unit_id) else {
        return Err(HandlerErr::new("not_found", "unit not found"));
    };
    Ok(json!({
        "unit": unit,
        "locked": ledger::is_unit_locked(store, unit_id),
        "students": query::students_by_class(store, &unit.class_room_id),
        "evaluations": query::evaluations_by_unit(store, unit_id),
    }))
}

fn handle_units_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = param_str(req, "classId")?;
    let name = param_str(req, "name")?;
    let rules: GradeRule = match req.params.get("rules") {
        None => GradeRule::default(),
        Some(v) if v.is_null() => GradeRule::default(),
        Some(v) => param_as(v.clone(), "rules")?,
    };
    let unit = commit(state, |store| store.create_unit(name, class_id, rules))?;
    tracing::info!(unit_id = %unit.id, class_id, "unit created");
    Ok(json!({ "unitId": unit.id, "unit": unit }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "units.list" => handle_units_list(state, req),
        "units.get" => handle_units_get(state, req),
        "units.create" => handle_units_create(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
