use crate::model::{ClassRoom, Evaluation, Grade, PedagogicalUnit, Student, StudentStatus};
use crate::store::Store;
use serde::Serialize;
use std::collections::HashSet;

pub fn classes_by_year<'a>(store: &'a Store, year_id: &str) -> Vec<&'a ClassRoom> {
    store
        .classes
        .iter()
        .filter(|c| c.school_year_id == year_id)
        .collect()
}

pub fn units_by_class<'a>(store: &'a Store, class_id: &str) -> Vec<&'a PedagogicalUnit> {
    store
        .units
        .iter()
        .filter(|u| u.class_room_id == class_id)
        .collect()
}

/// Roster in canonical order; empty for an unknown class.
pub fn students_by_class<'a>(store: &'a Store, class_id: &str) -> &'a [Student] {
    store
        .class(class_id)
        .map(|c| c.students.as_slice())
        .unwrap_or(&[])
}

/// Ordered by date, then name.
pub fn evaluations_by_unit<'a>(store: &'a Store, unit_id: &str) -> Vec<&'a Evaluation> {
    let mut out: Vec<&Evaluation> = store
        .evaluations
        .iter()
        .filter(|e| e.pedagogical_unit_id == unit_id)
        .collect();
    out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    out
}

pub fn grades_by_unit<'a>(store: &'a Store, unit_id: &str) -> Vec<&'a Grade> {
    let eval_ids: HashSet<&str> = store
        .evaluations
        .iter()
        .filter(|e| e.pedagogical_unit_id == unit_id)
        .map(|e| e.id.as_str())
        .collect();
    store
        .grades
        .iter()
        .filter(|g| eval_ids.contains(g.evaluation_id.as_str()))
        .collect()
}

pub fn grade_for<'a>(store: &'a Store, student_id: &str, evaluation_id: &str) -> Option<&'a Grade> {
    store
        .grades
        .iter()
        .find(|g| g.student_id == student_id && g.evaluation_id == evaluation_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_years: usize,
    pub total_classes: usize,
    pub total_students: usize,
    pub total_units: usize,
}

/// Counts across the whole store; archived students are left out.
pub fn dashboard_stats(store: &Store) -> DashboardStats {
    DashboardStats {
        total_years: store.years.len(),
        total_classes: store.classes.len(),
        total_students: store
            .classes
            .iter()
            .flat_map(|c| c.students.iter())
            .filter(|s| s.status == StudentStatus::Active)
            .count(),
        total_units: store.units.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger;
    use crate::model::{EvaluationType, GradeRule, StudentPatch, YearMode};
    use crate::store::tests::{eval_input, student};
    use chrono::NaiveDate;

    #[test]
    fn derived_views_filter_by_owner() {
        let mut store = Store::new();
        let y1 = store.create_year("2023-2024", YearMode::Semester).expect("y1");
        let y2 = store.create_year("2024-2025", YearMode::Semester).expect("y2");
        let c1 = store
            .create_class("6e A", &y1.id, vec![student("Amir", "Diallo")])
            .expect("c1");
        let c2 = store.create_class("6e B", &y2.id, vec![]).expect("c2");
        let u1 = store
            .create_unit("Maths", &c1.id, GradeRule::default())
            .expect("u1");
        store
            .create_unit("SVT", &c2.id, GradeRule::default())
            .expect("u2");

        let mut late = eval_input(&u1.id, EvaluationType::Devoir, 1.0, 20.0);
        late.name = "B".to_string();
        late.date = NaiveDate::from_ymd_opt(2024, 3, 1);
        let mut early = eval_input(&u1.id, EvaluationType::Interro, 1.0, 20.0);
        early.name = "A".to_string();
        early.date = NaiveDate::from_ymd_opt(2023, 12, 1);
        let late = store.create_evaluation(late).expect("late");
        let early = store.create_evaluation(early).expect("early");

        assert_eq!(classes_by_year(&store, &y1.id).len(), 1);
        assert_eq!(classes_by_year(&store, &y2.id)[0].id, c2.id);
        assert_eq!(units_by_class(&store, &c1.id)[0].id, u1.id);
        assert_eq!(students_by_class(&store, &c1.id).len(), 1);
        assert!(students_by_class(&store, "missing").is_empty());

        let ordered: Vec<_> = evaluations_by_unit(&store, &u1.id)
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(ordered, vec![early.id.clone(), late.id.clone()]);

        let sid = c1.students[0].id.clone();
        ledger::create_grade(&mut store, &sid, &early.id, 12.0).expect("grade");
        assert_eq!(grades_by_unit(&store, &u1.id).len(), 1);
        assert!(grade_for(&store, &sid, &early.id).is_some());
        assert!(grade_for(&store, &sid, &late.id).is_none());
    }

    #[test]
    fn dashboard_counts_only_active_students() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Trimester).expect("year");
        let class = store
            .create_class(
                "6e A",
                &year.id,
                vec![student("Amir", "Diallo"), student("Ana", "Martin")],
            )
            .expect("class");
        store
            .update_student(
                &class.id,
                &class.students[1].id,
                StudentPatch {
                    status: Some(StudentStatus::Archived),
                    ..StudentPatch::default()
                },
            )
            .expect("archive");
        store
            .create_unit("Maths", &class.id, GradeRule::default())
            .expect("unit");

        assert_eq!(
            dashboard_stats(&store),
            DashboardStats {
                total_years: 1,
                total_classes: 1,
                total_students: 1,
                total_units: 1,
            }
        );
    }
}
