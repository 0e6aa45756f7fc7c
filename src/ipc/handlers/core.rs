use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{open_workspace, param_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::query;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

fn handle_workspace_select(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(param_str(req, "path")?);
    open_workspace(state, &path).map_err(|e| {
        tracing::error!(workspace = %path.display(), error = ?e, "failed to open workspace");
        HandlerErr::new(e.code(), format!("{e:?}"))
    })?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_dashboard_stats(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let stats = query::dashboard_stats(&state.store);
    Ok(json!({
        "stats": stats,
        "activeYearId": state.store.active_year_id,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "dashboard.stats" => handle_dashboard_stats(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
