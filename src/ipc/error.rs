use crate::calc::CalcError;
use crate::ledger::LedgerError;
use crate::store::StoreError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of a single handler, rendered into the error envelope by the router.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        let details = match &e {
            StoreError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<LedgerError> for HandlerErr {
    fn from(e: LedgerError) -> Self {
        let details = match &e {
            LedgerError::InvalidValue { value, max_score } => {
                // NaN/inf serialize as null.
                Some(json!({ "value": value, "maxScore": max_score }))
            }
            LedgerError::DuplicateGradeLink { grade_id } => Some(json!({ "gradeId": grade_id })),
            LedgerError::AlreadyLocked(id)
            | LedgerError::AlreadyAmended(id)
            | LedgerError::NotLocked(id) => Some(json!({ "gradeId": id })),
            LedgerError::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            LedgerError::StudentNotInClass {
                student_id,
                evaluation_id,
            } => Some(json!({ "studentId": student_id, "evaluationId": evaluation_id })),
            LedgerError::MissingReason => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        let code = match e.code.as_str() {
            "not_found" => "not_found",
            _ => "calc_failed",
        };
        HandlerErr::new(code, e.message)
    }
}
