use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearMode {
    Semester,
    Trimester,
}

impl YearMode {
    pub fn as_str(self) -> &'static str {
        match self {
            YearMode::Semester => "semester",
            YearMode::Trimester => "trimester",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semester" => Some(YearMode::Semester),
            "trimester" => Some(YearMode::Trimester),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYear {
    pub id: String,
    pub name: String,
    pub mode: YearMode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Archived,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(StudentStatus::Active),
            "archived" => Some(StudentStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_id: String,
    pub status: StudentStatus,
}

/// Student fields as supplied by the UI, before the store assigns an id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub status: Option<StudentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub student_id: Option<String>,
    pub status: Option<StudentStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRoom {
    pub id: String,
    pub name: String,
    pub school_year_id: String,
    pub students: Vec<Student>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Numeric,
    Percentage,
    Letter,
}

impl DisplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Numeric => "numeric",
            DisplayMode::Percentage => "percentage",
            DisplayMode::Letter => "letter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" => Some(DisplayMode::Numeric),
            "percentage" => Some(DisplayMode::Percentage),
            "letter" => Some(DisplayMode::Letter),
            _ => None,
        }
    }
}

/// Per-unit grading rules. Only the two type weights feed the final average;
/// the rest is carried for display and report-card aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradeRule {
    pub coefficient: f64,
    pub coefficient_enabled: bool,
    pub min_interros: u32,
    pub min_devoirs: u32,
    pub interro_weight: f64,
    pub devoir_weight: f64,
    pub display_mode: DisplayMode,
    pub formula: String,
}

impl Default for GradeRule {
    fn default() -> Self {
        Self {
            coefficient: 1.0,
            coefficient_enabled: false,
            min_interros: 0,
            min_devoirs: 0,
            interro_weight: 1.0,
            devoir_weight: 1.0,
            display_mode: DisplayMode::Numeric,
            formula: "weighted_average".to_string(),
        }
    }
}

impl GradeRule {
    pub fn validate(&self) -> Result<(), String> {
        if !self.coefficient.is_finite() || self.coefficient <= 0.0 {
            return Err("coefficient must be > 0".to_string());
        }
        if !self.interro_weight.is_finite() || self.interro_weight < 0.0 {
            return Err("interroWeight must be >= 0".to_string());
        }
        if !self.devoir_weight.is_finite() || self.devoir_weight < 0.0 {
            return Err("devoirWeight must be >= 0".to_string());
        }
        if self.interro_weight + self.devoir_weight <= 0.0 {
            return Err("interroWeight + devoirWeight must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PedagogicalUnit {
    pub id: String,
    pub name: String,
    pub class_room_id: String,
    pub school_year_id: String,
    pub rules: GradeRule,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationType {
    Interro,
    Devoir,
}

impl EvaluationType {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationType::Interro => "interro",
            EvaluationType::Devoir => "devoir",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interro" => Some(EvaluationType::Interro),
            "devoir" => Some(EvaluationType::Devoir),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: String,
    pub name: String,
    pub pedagogical_unit_id: String,
    #[serde(rename = "type")]
    pub kind: EvaluationType,
    pub coefficient: f64,
    pub max_score: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeHistory {
    pub value: f64,
    pub modified_at: DateTime<Utc>,
    pub reason: String,
}

/// Lock status of a grade. `Amended` is terminal and carries the single
/// audit entry, so a second amendment is unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeState {
    Unlocked,
    Locked,
    Amended(GradeHistory),
}

impl GradeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeState::Unlocked => "unlocked",
            GradeState::Locked => "locked",
            GradeState::Amended(_) => "amended",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub evaluation_id: String,
    pub value: f64,
    pub state: GradeState,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Grade {
    pub fn is_locked(&self) -> bool {
        !matches!(self.state, GradeState::Unlocked)
    }

    pub fn history(&self) -> &[GradeHistory] {
        match &self.state {
            GradeState::Amended(h) => std::slice::from_ref(h),
            _ => &[],
        }
    }
}

/// Wire shape of a grade: the tagged state projected onto `isLocked` + `history`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord<'a> {
    pub id: &'a str,
    pub student_id: &'a str,
    pub evaluation_id: &'a str,
    pub value: f64,
    pub is_locked: bool,
    pub state: &'static str,
    pub history: &'a [GradeHistory],
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Grade> for GradeRecord<'a> {
    fn from(g: &'a Grade) -> Self {
        GradeRecord {
            id: &g.id,
            student_id: &g.student_id,
            evaluation_id: &g.evaluation_id,
            value: g.value,
            is_locked: g.is_locked(),
            state: g.state.as_str(),
            history: g.history(),
            created_at: g.created_at,
            modified_at: g.modified_at,
        }
    }
}
