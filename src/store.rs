use crate::model::{
    ClassRoom, Evaluation, EvaluationType, Grade, GradeRule, NewStudent, PedagogicalUnit,
    SchoolYear, Student, StudentPatch, StudentStatus, YearMode,
};
use chrono::{NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Validation(String),
    #[error("student id must not be empty")]
    EmptyStudentId,
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Validation(_) | StoreError::EmptyStudentId => "bad_params",
        }
    }

    fn not_found(entity: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub name: String,
    pub unit_id: String,
    pub kind: EvaluationType,
    pub coefficient: f64,
    pub max_score: f64,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassDeleteReport {
    pub units_removed: usize,
    pub evaluations_removed: usize,
    pub orphaned_grades: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    pub grades_missing_evaluation: Vec<String>,
    pub grades_missing_student: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.grades_missing_evaluation.is_empty() && self.grades_missing_student.is_empty()
    }
}

/// In-memory entity collections. All grade lifecycle rules live in `ledger`.
#[derive(Debug, Clone, Default)]
pub struct Store {
    pub years: Vec<SchoolYear>,
    pub active_year_id: Option<String>,
    pub classes: Vec<ClassRoom>,
    pub units: Vec<PedagogicalUnit>,
    pub evaluations: Vec<Evaluation>,
    pub grades: Vec<Grade>,
    /// Units that went through the batch lock ("saved").
    pub unit_locks: BTreeMap<String, bool>,
}

fn clean_name(field: &str, raw: &str) -> Result<String, StoreError> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(StoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(t.to_string())
}

/// Accepts `YYYY-YYYY` where the second year follows the first.
pub fn validate_year_name(name: &str) -> Result<(), StoreError> {
    let bad = || StoreError::Validation(format!("year name must be YYYY-YYYY, got {name:?}"));
    let (a, b) = name.split_once('-').ok_or_else(bad)?;
    if a.len() != 4 || b.len() != 4 {
        return Err(bad());
    }
    if !a.bytes().chain(b.bytes()).all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let start: u32 = a.parse().map_err(|_| bad())?;
    let end: u32 = b.parse().map_err(|_| bad())?;
    if end != start + 1 {
        return Err(StoreError::Validation(format!(
            "year name must span consecutive years, got {name:?}"
        )));
    }
    Ok(())
}

pub fn compare_students(a: &Student, b: &Student) -> Ordering {
    a.last_name
        .to_lowercase()
        .cmp(&b.last_name.to_lowercase())
        .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}

fn build_student(input: NewStudent) -> Result<Student, StoreError> {
    Ok(Student {
        id: new_id(),
        first_name: clean_name("firstName", &input.first_name)?,
        last_name: clean_name("lastName", &input.last_name)?,
        student_id: input.student_id.trim().to_string(),
        status: input.status.unwrap_or(StudentStatus::Active),
    })
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- school years -----

    pub fn create_year(&mut self, name: &str, mode: YearMode) -> Result<SchoolYear, StoreError> {
        let name = name.trim();
        validate_year_name(name)?;
        if self.years.iter().any(|y| y.name == name) {
            return Err(StoreError::Validation(format!(
                "school year {name} already exists"
            )));
        }
        let year = SchoolYear {
            id: new_id(),
            name: name.to_string(),
            mode,
            created_at: Utc::now(),
        };
        self.active_year_id = Some(year.id.clone());
        self.years.push(year.clone());
        Ok(year)
    }

    pub fn year(&self, id: &str) -> Option<&SchoolYear> {
        self.years.iter().find(|y| y.id == id)
    }

    pub fn set_active_year(&mut self, id: Option<&str>) -> Result<(), StoreError> {
        match id {
            Some(id) => {
                if self.year(id).is_none() {
                    return Err(StoreError::not_found("school year", id));
                }
                self.active_year_id = Some(id.to_string());
            }
            None => self.active_year_id = None,
        }
        Ok(())
    }

    pub fn is_active_year(&self, id: &str) -> bool {
        self.active_year_id.as_deref() == Some(id)
    }

    // ----- classes -----

    pub fn create_class(
        &mut self,
        name: &str,
        school_year_id: &str,
        students: Vec<NewStudent>,
    ) -> Result<ClassRoom, StoreError> {
        let name = clean_name("name", name)?;
        if self.year(school_year_id).is_none() {
            return Err(StoreError::not_found("school year", school_year_id));
        }
        let mut roster = students
            .into_iter()
            .map(build_student)
            .collect::<Result<Vec<_>, _>>()?;
        roster.sort_by(compare_students);

        let class = ClassRoom {
            id: new_id(),
            name,
            school_year_id: school_year_id.to_string(),
            students: roster,
            created_at: Utc::now(),
        };
        self.classes.push(class.clone());
        Ok(class)
    }

    pub fn class(&self, id: &str) -> Option<&ClassRoom> {
        self.classes.iter().find(|c| c.id == id)
    }

    fn class_mut(&mut self, id: &str) -> Result<&mut ClassRoom, StoreError> {
        self.classes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::not_found("class", id))
    }

    pub fn rename_class(&mut self, id: &str, name: &str) -> Result<ClassRoom, StoreError> {
        let name = clean_name("name", name)?;
        let class = self.class_mut(id)?;
        class.name = name;
        Ok(class.clone())
    }

    /// Removes the class, its units and their evaluations. Grades under those
    /// evaluations are left in place and reported as orphaned.
    pub fn delete_class(&mut self, id: &str) -> Result<ClassDeleteReport, StoreError> {
        if self.class(id).is_none() {
            return Err(StoreError::not_found("class", id));
        }

        let unit_ids: HashSet<String> = self
            .units
            .iter()
            .filter(|u| u.class_room_id == id)
            .map(|u| u.id.clone())
            .collect();
        let eval_ids: HashSet<String> = self
            .evaluations
            .iter()
            .filter(|e| unit_ids.contains(&e.pedagogical_unit_id))
            .map(|e| e.id.clone())
            .collect();

        self.classes.retain(|c| c.id != id);
        self.units.retain(|u| !unit_ids.contains(&u.id));
        self.evaluations.retain(|e| !eval_ids.contains(&e.id));
        self.unit_locks.retain(|uid, _| !unit_ids.contains(uid));

        let orphaned_grades = self
            .grades
            .iter()
            .filter(|g| eval_ids.contains(&g.evaluation_id))
            .count();

        Ok(ClassDeleteReport {
            units_removed: unit_ids.len(),
            evaluations_removed: eval_ids.len(),
            orphaned_grades,
        })
    }

    // ----- students -----

    pub fn add_student(&mut self, class_id: &str, input: NewStudent) -> Result<Student, StoreError> {
        let student = build_student(input)?;
        let class = self.class_mut(class_id)?;
        class.students.push(student.clone());
        class.students.sort_by(compare_students);
        Ok(student)
    }

    pub fn update_student(
        &mut self,
        class_id: &str,
        student_id: &str,
        patch: StudentPatch,
    ) -> Result<Student, StoreError> {
        let first_name = patch
            .first_name
            .as_deref()
            .map(|v| clean_name("firstName", v))
            .transpose()?;
        let last_name = patch
            .last_name
            .as_deref()
            .map(|v| clean_name("lastName", v))
            .transpose()?;

        let class = self.class_mut(class_id)?;
        let student = class
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| StoreError::not_found("student", student_id))?;

        if let Some(v) = first_name {
            student.first_name = v;
        }
        if let Some(v) = last_name {
            student.last_name = v;
        }
        if let Some(v) = patch.student_id {
            student.student_id = v.trim().to_string();
        }
        if let Some(v) = patch.status {
            student.status = v;
        }
        let updated = student.clone();
        class.students.sort_by(compare_students);
        Ok(updated)
    }

    /// Removes the student and every grade that references them.
    pub fn delete_student(&mut self, class_id: &str, student_id: &str) -> Result<usize, StoreError> {
        let class = self.class_mut(class_id)?;
        let before = class.students.len();
        class.students.retain(|s| s.id != student_id);
        if class.students.len() == before {
            return Err(StoreError::not_found("student", student_id));
        }
        let grades_before = self.grades.len();
        self.grades.retain(|g| g.student_id != student_id);
        Ok(grades_before - self.grades.len())
    }

    pub fn student(&self, student_id: &str) -> Option<(&ClassRoom, &Student)> {
        self.classes.iter().find_map(|c| {
            c.students
                .iter()
                .find(|s| s.id == student_id)
                .map(|s| (c, s))
        })
    }

    // ----- units -----

    pub fn create_unit(
        &mut self,
        name: &str,
        class_id: &str,
        rules: GradeRule,
    ) -> Result<PedagogicalUnit, StoreError> {
        let name = clean_name("name", name)?;
        rules.validate().map_err(StoreError::Validation)?;
        let class = self
            .class(class_id)
            .ok_or_else(|| StoreError::not_found("class", class_id))?;

        let unit = PedagogicalUnit {
            id: new_id(),
            name,
            class_room_id: class.id.clone(),
            school_year_id: class.school_year_id.clone(),
            rules,
            created_at: Utc::now(),
        };
        self.units.push(unit.clone());
        Ok(unit)
    }

    pub fn unit(&self, id: &str) -> Option<&PedagogicalUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    // ----- evaluations -----

    pub fn create_evaluation(&mut self, input: NewEvaluation) -> Result<Evaluation, StoreError> {
        let name = clean_name("name", &input.name)?;
        if !input.coefficient.is_finite() || input.coefficient <= 0.0 {
            return Err(StoreError::Validation("coefficient must be > 0".to_string()));
        }
        if !input.max_score.is_finite() || input.max_score <= 0.0 {
            return Err(StoreError::Validation("maxScore must be > 0".to_string()));
        }
        if self.unit(&input.unit_id).is_none() {
            return Err(StoreError::not_found("unit", &input.unit_id));
        }

        let evaluation = Evaluation {
            id: new_id(),
            name,
            pedagogical_unit_id: input.unit_id,
            kind: input.kind,
            coefficient: input.coefficient,
            max_score: input.max_score,
            date: input.date.unwrap_or_else(|| Utc::now().date_naive()),
        };
        self.evaluations.push(evaluation.clone());
        Ok(evaluation)
    }

    pub fn evaluation(&self, id: &str) -> Option<&Evaluation> {
        self.evaluations.iter().find(|e| e.id == id)
    }

    // ----- grades -----

    pub fn grade(&self, id: &str) -> Option<&Grade> {
        self.grades.iter().find(|g| g.id == id)
    }

    pub fn grade_mut(&mut self, id: &str) -> Option<&mut Grade> {
        self.grades.iter_mut().find(|g| g.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
            && self.classes.is_empty()
            && self.units.is_empty()
            && self.evaluations.is_empty()
            && self.grades.is_empty()
    }

    // ----- integrity -----

    /// Checks invariants that a loaded snapshot must hold before it is used.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        for class in &self.classes {
            for s in &class.students {
                if s.id.trim().is_empty() {
                    return Err(StoreError::EmptyStudentId);
                }
                if !seen.insert(s.id.as_str()) {
                    return Err(StoreError::Validation(format!(
                        "student {} belongs to more than one class",
                        s.id
                    )));
                }
            }
        }
        for u in &self.units {
            u.rules
                .validate()
                .map_err(|e| StoreError::Validation(format!("unit {}: {e}", u.id)))?;
        }
        for e in &self.evaluations {
            if !e.coefficient.is_finite() || e.coefficient <= 0.0 {
                return Err(StoreError::Validation(format!(
                    "evaluation {}: coefficient must be > 0",
                    e.id
                )));
            }
            if !e.max_score.is_finite() || e.max_score <= 0.0 {
                return Err(StoreError::Validation(format!(
                    "evaluation {}: maxScore must be > 0",
                    e.id
                )));
            }
        }
        let mut pairs = HashSet::new();
        for g in &self.grades {
            if !pairs.insert((g.student_id.as_str(), g.evaluation_id.as_str())) {
                return Err(StoreError::Validation(format!(
                    "duplicate grade for student {} on evaluation {}",
                    g.student_id, g.evaluation_id
                )));
            }
            // Orphaned grades have no bound left to check.
            if let Some(ev) = self.evaluation(&g.evaluation_id) {
                if !g.value.is_finite() || g.value < 0.0 || g.value > ev.max_score {
                    return Err(StoreError::Validation(format!(
                        "grade {} value {} is outside [0, {}]",
                        g.id, g.value, ev.max_score
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn integrity_report(&self) -> IntegrityReport {
        let eval_ids: HashSet<&str> = self.evaluations.iter().map(|e| e.id.as_str()).collect();
        let student_ids: HashSet<&str> = self
            .classes
            .iter()
            .flat_map(|c| c.students.iter().map(|s| s.id.as_str()))
            .collect();

        let mut report = IntegrityReport::default();
        for g in &self.grades {
            if !eval_ids.contains(g.evaluation_id.as_str()) {
                report.grades_missing_evaluation.push(g.id.clone());
            }
            if !student_ids.contains(g.student_id.as_str()) {
                report.grades_missing_student.push(g.id.clone());
            }
        }
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::GradeState;

    pub(crate) fn student(first: &str, last: &str) -> NewStudent {
        NewStudent {
            first_name: first.to_string(),
            last_name: last.to_string(),
            student_id: String::new(),
            status: None,
        }
    }

    pub(crate) fn eval_input(unit_id: &str, kind: EvaluationType, coef: f64, max: f64) -> NewEvaluation {
        NewEvaluation {
            name: format!("{} {}", kind.as_str(), coef),
            unit_id: unit_id.to_string(),
            kind,
            coefficient: coef,
            max_score: max,
            date: NaiveDate::from_ymd_opt(2024, 10, 1),
        }
    }

    #[test]
    fn year_names_must_be_consecutive() {
        assert!(validate_year_name("2024-2025").is_ok());
        assert!(validate_year_name("2024-2026").is_err());
        assert!(validate_year_name("24-25").is_err());
        assert!(validate_year_name("2024/2025").is_err());
        assert!(validate_year_name("abcd-abce").is_err());
    }

    #[test]
    fn creating_a_year_makes_it_active() {
        let mut store = Store::new();
        let a = store.create_year("2023-2024", YearMode::Semester).expect("year a");
        let b = store.create_year("2024-2025", YearMode::Trimester).expect("year b");
        assert!(store.is_active_year(&b.id));
        assert!(!store.is_active_year(&a.id));

        store.set_active_year(Some(&a.id)).expect("activate");
        assert!(store.is_active_year(&a.id));
        store.set_active_year(None).expect("clear");
        assert_eq!(store.active_year_id, None);
        assert!(store.set_active_year(Some("nope")).is_err());
        assert!(store.create_year("2024-2025", YearMode::Semester).is_err());
    }

    #[test]
    fn roster_is_sorted_and_ids_are_assigned() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let class = store
            .create_class(
                "6e A",
                &year.id,
                vec![student("Zoe", "martin"), student("Amir", "Diallo"), student("Ana", "Martin")],
            )
            .expect("class");

        let names: Vec<_> = class
            .students
            .iter()
            .map(|s| format!("{} {}", s.last_name, s.first_name))
            .collect();
        assert_eq!(names, vec!["Diallo Amir", "Martin Ana", "martin Zoe"]);
        assert!(class.students.iter().all(|s| !s.id.is_empty()));

        let added = store.add_student(&class.id, student("Bea", "Adam")).expect("add");
        let stored = store.class(&class.id).expect("class");
        assert_eq!(stored.students[0].id, added.id);
    }

    #[test]
    fn blank_student_names_are_rejected() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let err = store
            .create_class("6e A", &year.id, vec![student("  ", "Diallo")])
            .expect_err("blank first name");
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.classes.is_empty());
    }

    #[test]
    fn validate_rejects_empty_student_ids() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let class = store
            .create_class("6e A", &year.id, vec![student("Amir", "Diallo")])
            .expect("class");
        assert!(store.validate().is_ok());

        store.classes[0].students[0].id = String::new();
        assert_eq!(store.validate(), Err(StoreError::EmptyStudentId));
        assert_eq!(store.classes[0].id, class.id);
    }

    #[test]
    fn validate_rejects_out_of_range_snapshots() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let class = store
            .create_class("6e A", &year.id, vec![student("Amir", "Diallo")])
            .expect("class");
        let unit = store
            .create_unit("Maths", &class.id, GradeRule::default())
            .expect("unit");
        let ev = store
            .create_evaluation(eval_input(&unit.id, EvaluationType::Devoir, 1.0, 10.0))
            .expect("eval");
        store.grades.push(Grade {
            id: new_id(),
            student_id: class.students[0].id.clone(),
            evaluation_id: ev.id.clone(),
            value: 10.0,
            state: GradeState::Locked,
            created_at: Utc::now(),
            modified_at: None,
        });
        assert!(store.validate().is_ok());

        let mut over = store.clone();
        over.grades[0].value = 12.0;
        assert!(matches!(over.validate(), Err(StoreError::Validation(_))));

        let mut no_max = store.clone();
        no_max.evaluations[0].max_score = 0.0;
        assert!(no_max.validate().is_err());

        let mut no_coef = store.clone();
        no_coef.evaluations[0].coefficient = -1.0;
        assert!(no_coef.validate().is_err());

        let mut no_weights = store.clone();
        no_weights.units[0].rules.interro_weight = 0.0;
        no_weights.units[0].rules.devoir_weight = 0.0;
        assert!(no_weights.validate().is_err());

        // A grade whose evaluation is gone is reported, not rejected.
        let mut orphan = store.clone();
        orphan.evaluations.clear();
        orphan.grades[0].value = 99.0;
        assert!(orphan.validate().is_ok());
    }

    #[test]
    fn deleting_a_student_cascades_their_grades() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let class = store
            .create_class("6e A", &year.id, vec![student("Amir", "Diallo"), student("Ana", "Martin")])
            .expect("class");
        let unit = store
            .create_unit("Maths", &class.id, GradeRule::default())
            .expect("unit");
        let ev = store
            .create_evaluation(eval_input(&unit.id, EvaluationType::Interro, 1.0, 20.0))
            .expect("eval");
        for s in &class.students {
            store.grades.push(Grade {
                id: new_id(),
                student_id: s.id.clone(),
                evaluation_id: ev.id.clone(),
                value: 10.0,
                state: GradeState::Unlocked,
                created_at: Utc::now(),
                modified_at: None,
            });
        }

        let removed = store
            .delete_student(&class.id, &class.students[0].id)
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(store.grades.len(), 1);
        assert_eq!(store.grades[0].student_id, class.students[1].id);
    }

    #[test]
    fn deleting_a_class_keeps_grades_as_orphans() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let class = store
            .create_class("6e A", &year.id, vec![student("Amir", "Diallo")])
            .expect("class");
        let unit = store
            .create_unit("Maths", &class.id, GradeRule::default())
            .expect("unit");
        let ev = store
            .create_evaluation(eval_input(&unit.id, EvaluationType::Devoir, 2.0, 20.0))
            .expect("eval");
        store.unit_locks.insert(unit.id.clone(), true);
        store.grades.push(Grade {
            id: new_id(),
            student_id: class.students[0].id.clone(),
            evaluation_id: ev.id.clone(),
            value: 12.0,
            state: GradeState::Locked,
            created_at: Utc::now(),
            modified_at: None,
        });

        let report = store.delete_class(&class.id).expect("delete class");
        assert_eq!(
            report,
            ClassDeleteReport {
                units_removed: 1,
                evaluations_removed: 1,
                orphaned_grades: 1
            }
        );
        assert!(store.units.is_empty());
        assert!(store.evaluations.is_empty());
        assert!(store.unit_locks.is_empty());
        assert_eq!(store.grades.len(), 1);

        let integrity = store.integrity_report();
        assert_eq!(integrity.grades_missing_evaluation.len(), 1);
        assert_eq!(integrity.grades_missing_student.len(), 1);
    }

    #[test]
    fn evaluations_require_positive_weights() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let class = store.create_class("6e A", &year.id, vec![]).expect("class");
        let unit = store
            .create_unit("Maths", &class.id, GradeRule::default())
            .expect("unit");

        assert!(store
            .create_evaluation(eval_input(&unit.id, EvaluationType::Interro, 0.0, 20.0))
            .is_err());
        assert!(store
            .create_evaluation(eval_input(&unit.id, EvaluationType::Interro, 1.0, 0.0))
            .is_err());
        assert!(store
            .create_evaluation(eval_input("missing", EvaluationType::Interro, 1.0, 20.0))
            .is_err());
        assert!(store.evaluations.is_empty());
    }

    #[test]
    fn unit_rules_need_a_positive_weight_sum() {
        let mut store = Store::new();
        let year = store.create_year("2024-2025", YearMode::Semester).expect("year");
        let class = store.create_class("6e A", &year.id, vec![]).expect("class");
        let rules = GradeRule {
            interro_weight: 0.0,
            devoir_weight: 0.0,
            ..GradeRule::default()
        };
        assert!(store.create_unit("Maths", &class.id, rules).is_err());

        let unit = store
            .create_unit("Maths", &class.id, GradeRule::default())
            .expect("unit");
        assert_eq!(unit.school_year_id, year.id);
    }
}
