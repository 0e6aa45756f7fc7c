use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{commit, param_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::{SchoolYear, YearMode};
use crate::store::Store;
use serde_json::json;

fn year_json(store: &Store, y: &SchoolYear) -> serde_json::Value {
    json!({
        "id": y.id,
        "name": y.name,
        "mode": y.mode,
        "createdAt": y.created_at,
        "isActive": store.is_active_year(&y.id),
    })
}

fn handle_years_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = &state.store;
    let years: Vec<_> = store.years.iter().map(|y| year_json(store, y)).collect();
    Ok(json!({
        "years": years,
        "activeYearId": store.active_year_id,
    }))
}

fn handle_years_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = param_str(req, "name")?;
    let mode = match req.params.get("mode").and_then(|v| v.as_str()) {
        None => YearMode::Semester,
        Some(raw) => YearMode::parse(raw).ok_or_else(|| {
            HandlerErr::bad_params("mode must be one of: semester, trimester")
                .with_details(json!({ "mode": raw }))
        })?,
    };

    let year = commit(state, |store| store.create_year(name, mode))?;
    tracing::info!(year_id = %year.id, name = %year.name, "school year created");
    Ok(json!({ "year": year_json(&state.store, &year) }))
}

fn handle_years_set_active(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let year_id = match req.params.get("yearId") {
        None => return Err(HandlerErr::bad_params("missing yearId")),
        Some(v) if v.is_null() => None,
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| HandlerErr::bad_params("yearId must be a string or null"))?,
        ),
    };
    commit(state, |store| store.set_active_year(year_id))?;
    Ok(json!({ "activeYearId": state.store.active_year_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "years.list" => handle_years_list(state, req),
        "years.create" => handle_years_create(state, req),
        "years.setActive" => handle_years_set_active(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
