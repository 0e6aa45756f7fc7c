//! Grade lifecycle: draft entry, batch lock per unit, and the single
//! post-lock amendment.
//!
//! `Unlocked -> Locked -> Amended` only moves forward. Every rejection leaves
//! the store untouched.

use crate::model::{Grade, GradeHistory, GradeState};
use crate::query;
use crate::store::{new_id, Store};
use chrono::Utc;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("value {value} is outside [0, {max_score}]")]
    InvalidValue { value: f64, max_score: f64 },
    #[error("grade {0} is locked")]
    AlreadyLocked(String),
    #[error("grade {0} was already amended once")]
    AlreadyAmended(String),
    #[error("an amendment requires a reason")]
    MissingReason,
    #[error("a grade already exists for this student and evaluation")]
    DuplicateGradeLink { grade_id: String },
    #[error("grade {0} is not locked yet; edit it directly")]
    NotLocked(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("student {student_id} is not enrolled in the class of evaluation {evaluation_id}")]
    StudentNotInClass {
        student_id: String,
        evaluation_id: String,
    },
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidValue { .. } => "invalid_value",
            LedgerError::AlreadyLocked(_) => "already_locked",
            LedgerError::AlreadyAmended(_) => "already_amended",
            LedgerError::MissingReason => "missing_reason",
            LedgerError::DuplicateGradeLink { .. } => "duplicate_grade",
            LedgerError::NotLocked(_) => "not_locked",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::StudentNotInClass { .. } => "student_not_in_class",
        }
    }

    fn not_found(entity: &'static str, id: &str) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LockReport {
    pub unit_id: String,
    pub newly_locked: usize,
    pub total_grades: usize,
    pub saved: bool,
}

/// Max score of the grade's evaluation. A grade whose evaluation is gone is
/// a data-integrity fault, not a user error.
fn max_score_for(store: &Store, grade: &Grade) -> Result<f64, LedgerError> {
    match store.evaluation(&grade.evaluation_id) {
        Some(ev) => Ok(ev.max_score),
        None => {
            tracing::error!(
                grade_id = %grade.id,
                evaluation_id = %grade.evaluation_id,
                "grade references a missing evaluation"
            );
            Err(LedgerError::not_found("evaluation", &grade.evaluation_id))
        }
    }
}

fn check_value(value: f64, max_score: f64) -> Result<(), LedgerError> {
    if value.is_finite() && value >= 0.0 && value <= max_score {
        Ok(())
    } else {
        Err(LedgerError::InvalidValue { value, max_score })
    }
}

pub fn create_grade(
    store: &mut Store,
    student_id: &str,
    evaluation_id: &str,
    value: f64,
) -> Result<Grade, LedgerError> {
    let evaluation = store
        .evaluation(evaluation_id)
        .ok_or_else(|| LedgerError::not_found("evaluation", evaluation_id))?;
    check_value(value, evaluation.max_score)?;

    let class_id = store
        .unit(&evaluation.pedagogical_unit_id)
        .map(|u| u.class_room_id.as_str())
        .ok_or_else(|| LedgerError::not_found("unit", &evaluation.pedagogical_unit_id))?;
    let Some((class, _)) = store.student(student_id) else {
        return Err(LedgerError::not_found("student", student_id));
    };
    if class.id != class_id {
        return Err(LedgerError::StudentNotInClass {
            student_id: student_id.to_string(),
            evaluation_id: evaluation_id.to_string(),
        });
    }

    if let Some(existing) = query::grade_for(store, student_id, evaluation_id) {
        return Err(LedgerError::DuplicateGradeLink {
            grade_id: existing.id.clone(),
        });
    }

    let grade = Grade {
        id: new_id(),
        student_id: student_id.to_string(),
        evaluation_id: evaluation_id.to_string(),
        value,
        state: GradeState::Unlocked,
        created_at: Utc::now(),
        modified_at: None,
    };
    tracing::debug!(grade_id = %grade.id, student_id, evaluation_id, value, "grade created");
    store.grades.push(grade.clone());
    Ok(grade)
}

/// Overwrites a draft grade. No audit trail is kept before the unit is locked.
pub fn edit_unlocked_grade(
    store: &mut Store,
    grade_id: &str,
    value: f64,
) -> Result<Grade, LedgerError> {
    let grade = store
        .grade(grade_id)
        .ok_or_else(|| LedgerError::not_found("grade", grade_id))?;
    if grade.is_locked() {
        return Err(LedgerError::AlreadyLocked(grade_id.to_string()));
    }
    check_value(value, max_score_for(store, grade)?)?;

    let grade = store
        .grade_mut(grade_id)
        .ok_or_else(|| LedgerError::not_found("grade", grade_id))?;
    grade.value = value;
    Ok(grade.clone())
}

/// Locks every grade under the unit's evaluations in one pass. Safe to repeat:
/// grades entered since the previous call get locked too.
pub fn lock_unit(store: &mut Store, unit_id: &str) -> Result<LockReport, LedgerError> {
    if store.unit(unit_id).is_none() {
        return Err(LedgerError::not_found("unit", unit_id));
    }
    let eval_ids: HashSet<&str> = store
        .evaluations
        .iter()
        .filter(|e| e.pedagogical_unit_id == unit_id)
        .map(|e| e.id.as_str())
        .collect();
    let has_evaluations = !eval_ids.is_empty();

    let mut newly_locked = 0;
    let mut total_grades = 0;
    for g in store
        .grades
        .iter_mut()
        .filter(|g| eval_ids.contains(g.evaluation_id.as_str()))
    {
        total_grades += 1;
        if g.state == GradeState::Unlocked {
            g.state = GradeState::Locked;
            newly_locked += 1;
        }
    }

    if has_evaluations {
        store.unit_locks.insert(unit_id.to_string(), true);
    }
    tracing::info!(unit_id, newly_locked, total_grades, saved = has_evaluations, "unit locked");

    Ok(LockReport {
        unit_id: unit_id.to_string(),
        newly_locked,
        total_grades,
        saved: has_evaluations,
    })
}

/// The one correction allowed after locking. Records the replaced value with
/// the reason; any later attempt is refused.
pub fn amend_locked_grade(
    store: &mut Store,
    grade_id: &str,
    value: f64,
    reason: &str,
) -> Result<Grade, LedgerError> {
    let grade = store
        .grade(grade_id)
        .ok_or_else(|| LedgerError::not_found("grade", grade_id))?;
    match grade.state {
        GradeState::Unlocked => return Err(LedgerError::NotLocked(grade_id.to_string())),
        GradeState::Amended(_) => {
            tracing::debug!(grade_id, "second amendment refused");
            return Err(LedgerError::AlreadyAmended(grade_id.to_string()));
        }
        GradeState::Locked => {}
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::MissingReason);
    }
    check_value(value, max_score_for(store, grade)?)?;

    let grade = store
        .grade_mut(grade_id)
        .ok_or_else(|| LedgerError::not_found("grade", grade_id))?;
    let now = Utc::now();
    let previous = grade.value;
    grade.state = GradeState::Amended(GradeHistory {
        value: previous,
        modified_at: now,
        reason: reason.to_string(),
    });
    grade.value = value;
    grade.modified_at = Some(now);
    tracing::info!(grade_id, previous, value, "grade amended");
    Ok(grade.clone())
}

pub fn is_unit_locked(store: &Store, unit_id: &str) -> bool {
    store.unit_locks.get(unit_id).copied().unwrap_or(false)
}
