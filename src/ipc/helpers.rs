use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde::de::DeserializeOwned;
use std::path::Path;

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::debug!(method = %req.method, code = e.code, message = %e.message, "request rejected");
            e.response(&req.id)
        }
    }
}

pub fn param_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn opt_param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn opt_param_f64(req: &Request, key: &str) -> Result<Option<f64>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be a number"))),
    }
}

/// Grade values: anything that is not a JSON number is an invalid value,
/// not a malformed request.
pub fn grade_value(req: &Request) -> Result<f64, HandlerErr> {
    req.params
        .get("value")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| {
            HandlerErr::new("invalid_value", "value must be a number")
                .with_details(serde_json::json!({ "value": req.params.get("value") }))
        })
}

pub fn param_as<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> Result<T, HandlerErr> {
    serde_json::from_value(value).map_err(|e| HandlerErr::bad_params(format!("invalid {what}: {e}")))
}

/// Applies `apply` to a copy of the store and keeps the copy only once the
/// workspace snapshot (if any) has been written. A rejected mutation or a
/// failed write leaves the served state untouched.
pub fn commit<T, E>(
    state: &mut AppState,
    apply: impl FnOnce(&mut Store) -> Result<T, E>,
) -> Result<T, HandlerErr>
where
    E: Into<HandlerErr>,
{
    let mut next = state.store.clone();
    let out = apply(&mut next).map_err(Into::into)?;
    if let Some(conn) = state.db.as_ref() {
        db::save_store(conn, &next).map_err(|e| {
            tracing::error!(error = ?e, "failed to write workspace snapshot; change discarded");
            HandlerErr::new("db_write_failed", e.to_string())
        })?;
    }
    state.store = next;
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace at {path} already holds data; unsaved in-memory entries would be lost")]
    NotEmpty { path: String },
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl WorkspaceError {
    pub fn code(&self) -> &'static str {
        match self {
            WorkspaceError::NotEmpty { .. } => "workspace_not_empty",
            WorkspaceError::Db(_) => "db_open_failed",
        }
    }
}

/// Opens `path` and makes it the backing store. Entries created before any
/// workspace was open are written into an empty workspace; a non-empty one
/// is refused so they are not dropped.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<(), WorkspaceError> {
    let conn = db::open_db(path)?;
    let mut store = db::load_store(&conn)?;

    let unsaved = state.db.is_none() && !state.store.is_empty();
    if unsaved {
        if !store.is_empty() {
            return Err(WorkspaceError::NotEmpty {
                path: path.display().to_string(),
            });
        }
        db::save_store(&conn, &state.store)?;
        store = state.store.clone();
        tracing::info!(workspace = %path.display(), "unsaved entries written to new workspace");
    }

    let report = store.integrity_report();
    if !report.is_clean() {
        tracing::warn!(
            missing_evaluation = report.grades_missing_evaluation.len(),
            missing_student = report.grades_missing_student.len(),
            "workspace contains orphaned grades"
        );
    }
    tracing::info!(
        workspace = %path.display(),
        years = store.years.len(),
        classes = store.classes.len(),
        grades = store.grades.len(),
        "workspace opened"
    );

    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.store = store;
    Ok(())
}
