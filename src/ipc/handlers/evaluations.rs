use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{commit, opt_param_f64, opt_param_str, param_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::model::EvaluationType;
use crate::query;
use crate::store::NewEvaluation;
use chrono::NaiveDate;
use serde_json::json;

const DEFAULT_COEFFICIENT: f64 = 1.0;
const DEFAULT_MAX_SCORE: f64 = 20.0;

fn handle_evaluations_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let unit_id = param_str(req, "unitId")?;
    if state.store.unit(unit_id).is_none() {
        return Err(HandlerErr::new("not_found", "unit not found"));
    }
    Ok(json!({ "evaluations": query::evaluations_by_unit(&state.store, unit_id) }))
}

fn handle_evaluations_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let unit_id = param_str(req, "unitId")?;
    let name = param_str(req, "name")?;
    let kind = match opt_param_str(req, "type") {
        None => EvaluationType::Interro,
        Some(raw) => EvaluationType::parse(raw).ok_or_else(|| {
            HandlerErr::bad_params("type must be one of: interro, devoir")
                .with_details(json!({ "type": raw }))
        })?,
    };
    let date = match opt_param_str(req, "date") {
        None => None,
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            HandlerErr::bad_params("date must be YYYY-MM-DD").with_details(json!({ "date": raw }))
        })?),
    };

    let input = NewEvaluation {
        name: name.to_string(),
        unit_id: unit_id.to_string(),
        kind,
        coefficient: opt_param_f64(req, "coefficient")?.unwrap_or(DEFAULT_COEFFICIENT),
        max_score: opt_param_f64(req, "maxScore")?.unwrap_or(DEFAULT_MAX_SCORE),
        date,
    };
    let evaluation = commit(state, |store| store.create_evaluation(input))?;
    tracing::info!(evaluation_id = %evaluation.id, unit_id, kind = kind.as_str(), "evaluation created");
    Ok(json!({ "evaluationId": evaluation.id, "evaluation": evaluation }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "evaluations.list" => handle_evaluations_list(state, req),
        "evaluations.create" => handle_evaluations_create(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
