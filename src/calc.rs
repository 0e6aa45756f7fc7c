use crate::model::{DisplayMode, Evaluation, EvaluationType, Grade, GradeRule, StudentStatus};
use crate::query;
use crate::store::Store;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// All averages are reported on this scale regardless of each evaluation's max score.
pub const SCALE: f64 = 20.0;

/// `round(x * 100) / 100`. Averages are never negative so half-away-from-zero
/// is the same as half-up here.
pub fn round_off_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn normalize(value: f64, max_score: f64) -> f64 {
    value / max_score * SCALE
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Coefficient-weighted mean of the student's grades over `evaluations`, on
/// the 20-point scale. `None` when the student has no grade in the set; a
/// grade of 0 still counts.
pub fn type_average(student_id: &str, evaluations: &[&Evaluation], grades: &[Grade]) -> Option<f64> {
    let by_id: HashMap<&str, &Evaluation> =
        evaluations.iter().map(|e| (e.id.as_str(), *e)).collect();

    let mut weighted = 0.0;
    let mut total_coef = 0.0;
    let mut matched = 0usize;
    for g in grades.iter().filter(|g| g.student_id == student_id) {
        let Some(ev) = by_id.get(g.evaluation_id.as_str()) else {
            continue;
        };
        weighted += normalize(g.value, ev.max_score) * ev.coefficient;
        total_coef += ev.coefficient;
        matched += 1;
    }

    if matched == 0 || total_coef <= 0.0 {
        return None;
    }
    Some(round_off_2_decimals(weighted / total_coef))
}

/// Blends two type averages by the unit weights. A missing side is not
/// treated as zero: the other side is returned as-is.
pub fn blend(interro: Option<f64>, devoir: Option<f64>, rule: &GradeRule) -> Option<f64> {
    match (interro, devoir) {
        (None, None) => None,
        (Some(i), None) => Some(i),
        (None, Some(d)) => Some(d),
        (Some(i), Some(d)) => {
            let total = rule.interro_weight + rule.devoir_weight;
            if total <= 0.0 {
                // Rules with a zero weight sum are refused by the store; fall
                // back to an even split rather than divide by zero.
                return Some(round_off_2_decimals((i + d) / 2.0));
            }
            Some(round_off_2_decimals(
                (i * rule.interro_weight + d * rule.devoir_weight) / total,
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageBreakdown {
    pub interro_average: Option<f64>,
    pub devoir_average: Option<f64>,
    pub final_average: Option<f64>,
}

pub fn average_breakdown(
    student_id: &str,
    rule: &GradeRule,
    evaluations: &[&Evaluation],
    grades: &[Grade],
) -> AverageBreakdown {
    let (interros, devoirs): (Vec<&Evaluation>, Vec<&Evaluation>) = evaluations
        .iter()
        .copied()
        .partition(|e| e.kind == EvaluationType::Interro);
    let interro_average = type_average(student_id, &interros, grades);
    let devoir_average = type_average(student_id, &devoirs, grades);
    AverageBreakdown {
        interro_average,
        devoir_average,
        final_average: blend(interro_average, devoir_average, rule),
    }
}

pub fn compute_unit_average(
    store: &Store,
    student_id: &str,
    unit_id: &str,
) -> Result<AverageBreakdown, CalcError> {
    let Some(unit) = store.unit(unit_id) else {
        return Err(CalcError::new("not_found", "unit not found"));
    };
    let evaluations = query::evaluations_by_unit(store, unit_id);
    Ok(average_breakdown(
        student_id,
        &unit.rules,
        &evaluations,
        &store.grades,
    ))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitMeta {
    pub id: String,
    pub name: String,
    pub coefficient: f64,
    pub coefficient_enabled: bool,
    pub display_mode: DisplayMode,
    pub interro_weight: f64,
    pub devoir_weight: f64,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationStats {
    pub evaluation_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EvaluationType,
    pub max_score: f64,
    pub coefficient: f64,
    pub graded_count: usize,
    pub ungraded_count: usize,
    pub avg_raw: Option<f64>,
    pub avg_normalized: Option<f64>,
    pub median_normalized: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAverages {
    pub student_id: String,
    pub display_name: String,
    pub active: bool,
    #[serde(flatten)]
    pub averages: AverageBreakdown,
    pub interro_count: usize,
    pub devoir_count: usize,
    pub meets_min_interros: bool,
    pub meets_min_devoirs: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSummary {
    pub unit: UnitMeta,
    pub evaluations: Vec<EvaluationStats>,
    pub per_student: Vec<StudentAverages>,
    pub class_average: Option<f64>,
}

fn compute_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Every student's averages for one unit, plus per-evaluation statistics.
/// The min-count flags are informational; nothing blocks on them.
pub fn compute_unit_summary(store: &Store, unit_id: &str) -> Result<UnitSummary, CalcError> {
    let Some(unit) = store.unit(unit_id) else {
        return Err(CalcError::new("not_found", "unit not found"));
    };
    let students = query::students_by_class(store, &unit.class_room_id);
    let evaluations = query::evaluations_by_unit(store, unit_id);
    let rule = &unit.rules;

    let mut value_by_pair: HashMap<(&str, &str), f64> = HashMap::new();
    for g in &store.grades {
        value_by_pair.insert((g.student_id.as_str(), g.evaluation_id.as_str()), g.value);
    }

    let per_evaluation = evaluations
        .iter()
        .map(|ev| {
            let raws: Vec<f64> = students
                .iter()
                .filter_map(|s| value_by_pair.get(&(s.id.as_str(), ev.id.as_str())).copied())
                .collect();
            let normalized: Vec<f64> = raws.iter().map(|v| normalize(*v, ev.max_score)).collect();
            EvaluationStats {
                evaluation_id: ev.id.clone(),
                name: ev.name.clone(),
                kind: ev.kind,
                max_score: ev.max_score,
                coefficient: ev.coefficient,
                graded_count: raws.len(),
                ungraded_count: students.len() - raws.len(),
                avg_raw: mean(&raws).map(round_off_2_decimals),
                avg_normalized: mean(&normalized).map(round_off_2_decimals),
                median_normalized: compute_median(&normalized).map(round_off_2_decimals),
            }
        })
        .collect::<Vec<_>>();

    let per_student = students
        .iter()
        .map(|s| {
            let averages = average_breakdown(&s.id, rule, &evaluations, &store.grades);
            let count_of = |kind: EvaluationType| {
                evaluations
                    .iter()
                    .filter(|e| e.kind == kind)
                    .filter(|e| value_by_pair.contains_key(&(s.id.as_str(), e.id.as_str())))
                    .count()
            };
            let interro_count = count_of(EvaluationType::Interro);
            let devoir_count = count_of(EvaluationType::Devoir);
            StudentAverages {
                student_id: s.id.clone(),
                display_name: format!("{} {}", s.last_name, s.first_name),
                active: s.status == StudentStatus::Active,
                averages,
                interro_count,
                devoir_count,
                meets_min_interros: interro_count as u32 >= rule.min_interros,
                meets_min_devoirs: devoir_count as u32 >= rule.min_devoirs,
            }
        })
        .collect::<Vec<_>>();

    let finals: Vec<f64> = per_student
        .iter()
        .filter_map(|s| s.averages.final_average)
        .collect();

    Ok(UnitSummary {
        unit: UnitMeta {
            id: unit.id.clone(),
            name: unit.name.clone(),
            coefficient: rule.coefficient,
            coefficient_enabled: rule.coefficient_enabled,
            display_mode: rule.display_mode,
            interro_weight: rule.interro_weight,
            devoir_weight: rule.devoir_weight,
            locked: crate::ledger::is_unit_locked(store, unit_id),
        },
        evaluations: per_evaluation,
        per_student,
        class_average: mean(&finals).map(round_off_2_decimals),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GradeState;
    use chrono::{NaiveDate, Utc};

    fn evaluation(id: &str, kind: EvaluationType, coefficient: f64, max_score: f64) -> Evaluation {
        Evaluation {
            id: id.to_string(),
            name: id.to_string(),
            pedagogical_unit_id: "u1".to_string(),
            kind,
            coefficient,
            max_score,
            date: NaiveDate::from_ymd_opt(2024, 11, 4).expect("date"),
        }
    }

    fn grade(student_id: &str, evaluation_id: &str, value: f64) -> Grade {
        Grade {
            id: format!("{student_id}:{evaluation_id}"),
            student_id: student_id.to_string(),
            evaluation_id: evaluation_id.to_string(),
            value,
            state: GradeState::Unlocked,
            created_at: Utc::now(),
            modified_at: None,
        }
    }

    fn rule(interro_weight: f64, devoir_weight: f64) -> GradeRule {
        GradeRule {
            interro_weight,
            devoir_weight,
            ..GradeRule::default()
        }
    }

    #[test]
    fn round_off_uses_two_decimals() {
        assert_eq!(round_off_2_decimals(15.666_666), 15.67);
        assert_eq!(round_off_2_decimals(15.664), 15.66);
        assert_eq!(round_off_2_decimals(0.0), 0.0);
        assert_eq!(round_off_2_decimals(12.5), 12.5);
    }

    #[test]
    fn single_interro_out_of_twenty() {
        let interro1 = evaluation("interro1", EvaluationType::Interro, 1.0, 20.0);
        let grades = vec![grade("S1", "interro1", 15.0)];
        assert_eq!(type_average("S1", &[&interro1], &grades), Some(15.0));
    }

    #[test]
    fn devoir_out_of_ten_is_normalized() {
        let devoir1 = evaluation("devoir1", EvaluationType::Devoir, 2.0, 10.0);
        let grades = vec![grade("S1", "devoir1", 8.0)];
        assert_eq!(type_average("S1", &[&devoir1], &grades), Some(16.0));
    }

    #[test]
    fn coefficients_weight_within_a_type() {
        let a = evaluation("a", EvaluationType::Interro, 1.0, 20.0);
        let b = evaluation("b", EvaluationType::Interro, 3.0, 10.0);
        let grades = vec![grade("S1", "a", 10.0), grade("S1", "b", 5.0), grade("S2", "a", 20.0)];
        // (10*1 + 10*3) / 4
        assert_eq!(type_average("S1", &[&a, &b], &grades), Some(10.0));
        assert_eq!(type_average("S2", &[&a, &b], &grades), Some(20.0));
    }

    #[test]
    fn type_average_is_none_without_grades_but_counts_zero() {
        let a = evaluation("a", EvaluationType::Interro, 1.0, 20.0);
        let grades = vec![grade("S1", "a", 0.0)];
        assert_eq!(type_average("S1", &[&a], &grades), Some(0.0));
        assert_eq!(type_average("S2", &[&a], &grades), None);
        assert_eq!(type_average("S1", &[], &grades), None);
    }

    #[test]
    fn final_blend_uses_type_weights() {
        assert_eq!(blend(Some(15.0), Some(16.0), &rule(1.0, 2.0)), Some(15.67));
        assert_eq!(blend(Some(15.0), Some(16.0), &rule(0.0, 0.0)), Some(15.5));
    }

    #[test]
    fn missing_category_is_not_forced_to_zero() {
        let i1 = evaluation("i1", EvaluationType::Interro, 1.0, 20.0);
        let i2 = evaluation("i2", EvaluationType::Interro, 2.0, 20.0);
        let d1 = evaluation("d1", EvaluationType::Devoir, 1.0, 20.0);
        let grades = vec![grade("S1", "i1", 12.0), grade("S1", "i2", 15.0)];
        let evals = [&i1, &i2, &d1];

        let b = average_breakdown("S1", &rule(1.0, 5.0), &evals, &grades);
        assert_eq!(b.interro_average, Some(14.0));
        assert_eq!(b.devoir_average, None);
        assert_eq!(b.final_average, Some(14.0));

        let empty = average_breakdown("S9", &rule(1.0, 5.0), &evals, &grades);
        assert_eq!(empty.final_average, None);
    }

    #[test]
    fn final_average_over_both_types() {
        let i1 = evaluation("i1", EvaluationType::Interro, 1.0, 20.0);
        let d1 = evaluation("d1", EvaluationType::Devoir, 2.0, 10.0);
        let grades = vec![grade("S1", "i1", 15.0), grade("S1", "d1", 8.0)];
        let evals = [&i1, &d1];
        let first = average_breakdown("S1", &rule(1.0, 2.0), &evals, &grades);
        assert_eq!(first.interro_average, Some(15.0));
        assert_eq!(first.devoir_average, Some(16.0));
        assert_eq!(first.final_average, Some(15.67));
        assert_eq!(average_breakdown("S1", &rule(1.0, 2.0), &evals, &grades), first);
    }

    #[test]
    fn median_handles_even_and_odd_counts() {
        assert_eq!(compute_median(&[]), None);
        assert_eq!(compute_median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(compute_median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }
}
