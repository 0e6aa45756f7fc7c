use crate::model::{
    ClassRoom, DisplayMode, Evaluation, EvaluationType, Grade, GradeHistory, GradeRule,
    GradeState, PedagogicalUnit, SchoolYear, Student, StudentStatus, YearMode,
};
use crate::store::Store;
use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

pub const DB_FILE: &str = "gradebook.sqlite3";
const ACTIVE_YEAR_KEY: &str = "active_year_id";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mode TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY CHECK (length(trim(id)) > 0),
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT NOT NULL,
            status TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS units(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            coefficient REAL NOT NULL,
            coefficient_enabled INTEGER NOT NULL,
            min_interros INTEGER NOT NULL,
            min_devoirs INTEGER NOT NULL,
            interro_weight REAL NOT NULL,
            devoir_weight REAL NOT NULL,
            display_mode TEXT NOT NULL,
            formula TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_units_class ON units(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT PRIMARY KEY,
            unit_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            coefficient REAL NOT NULL,
            max_score REAL NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY(unit_id) REFERENCES units(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_unit ON evaluations(unit_id)",
        [],
    )?;

    // No foreign keys on grades: a deleted class leaves its grades behind.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            evaluation_id TEXT NOT NULL,
            value REAL NOT NULL,
            state TEXT NOT NULL,
            created_at TEXT NOT NULL,
            modified_at TEXT,
            UNIQUE(student_id, evaluation_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_history(
            grade_id TEXT PRIMARY KEY,
            value REAL NOT NULL,
            modified_at TEXT NOT NULL,
            reason TEXT NOT NULL,
            FOREIGN KEY(grade_id) REFERENCES grades(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_evaluation ON grades(evaluation_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS unit_locks(
            unit_id TEXT PRIMARY KEY,
            locked INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp {s:?}"))?
        .with_timezone(&Utc))
}

/// Rewrites the whole snapshot in one transaction.
pub fn save_store(conn: &Connection, store: &Store) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;

    // Children first: foreign keys are enforced.
    for table in [
        "grade_history",
        "grades",
        "unit_locks",
        "evaluations",
        "units",
        "students",
        "classes",
        "school_years",
    ] {
        tx.execute(&format!("DELETE FROM {table}"), [])?;
    }

    for y in &store.years {
        tx.execute(
            "INSERT INTO school_years(id, name, mode, created_at) VALUES(?, ?, ?, ?)",
            (&y.id, &y.name, y.mode.as_str(), ts(&y.created_at)),
        )?;
    }

    for c in &store.classes {
        tx.execute(
            "INSERT INTO classes(id, name, school_year_id, created_at) VALUES(?, ?, ?, ?)",
            (&c.id, &c.name, &c.school_year_id, ts(&c.created_at)),
        )?;
        for (i, s) in c.students.iter().enumerate() {
            tx.execute(
                "INSERT INTO students(id, class_id, last_name, first_name, student_no, status, sort_order)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &s.id,
                    &c.id,
                    &s.last_name,
                    &s.first_name,
                    &s.student_id,
                    s.status.as_str(),
                    i as i64,
                ),
            )?;
        }
    }

    for u in &store.units {
        let r = &u.rules;
        tx.execute(
            "INSERT INTO units(id, name, class_id, school_year_id, coefficient, coefficient_enabled,
                               min_interros, min_devoirs, interro_weight, devoir_weight,
                               display_mode, formula, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                &u.id,
                &u.name,
                &u.class_room_id,
                &u.school_year_id,
                r.coefficient,
                r.coefficient_enabled,
                r.min_interros,
                r.min_devoirs,
                r.interro_weight,
                r.devoir_weight,
                r.display_mode.as_str(),
                &r.formula,
                ts(&u.created_at),
            ],
        )?;
    }

    for e in &store.evaluations {
        tx.execute(
            "INSERT INTO evaluations(id, unit_id, name, kind, coefficient, max_score, date)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &e.id,
                &e.pedagogical_unit_id,
                &e.name,
                e.kind.as_str(),
                e.coefficient,
                e.max_score,
                e.date.format("%Y-%m-%d").to_string(),
            ),
        )?;
    }

    for g in &store.grades {
        tx.execute(
            "INSERT INTO grades(id, student_id, evaluation_id, value, state, created_at, modified_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &g.id,
                &g.student_id,
                &g.evaluation_id,
                g.value,
                g.state.as_str(),
                ts(&g.created_at),
                g.modified_at.as_ref().map(ts),
            ),
        )?;
        if let GradeState::Amended(h) = &g.state {
            tx.execute(
                "INSERT INTO grade_history(grade_id, value, modified_at, reason) VALUES(?, ?, ?, ?)",
                (&g.id, h.value, ts(&h.modified_at), &h.reason),
            )?;
        }
    }

    for (unit_id, locked) in &store.unit_locks {
        tx.execute(
            "INSERT INTO unit_locks(unit_id, locked) VALUES(?, ?)",
            (unit_id, *locked),
        )?;
    }

    settings_set_json(
        &tx,
        ACTIVE_YEAR_KEY,
        &serde_json::json!({ "id": store.active_year_id }),
    )?;
    tx.commit()?;
    Ok(())
}

pub fn load_store(conn: &Connection) -> anyhow::Result<Store> {
    let mut store = Store::new();

    let mut stmt =
        conn.prepare("SELECT id, name, mode, created_at FROM school_years ORDER BY created_at, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, name, mode, created_at) in rows {
        let mode = YearMode::parse(&mode).ok_or_else(|| anyhow!("bad year mode {mode:?}"))?;
        store.years.push(SchoolYear {
            id,
            name,
            mode,
            created_at: parse_ts(&created_at)?,
        });
    }

    let mut students_by_class: HashMap<String, Vec<Student>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT id, class_id, last_name, first_name, student_no, status
         FROM students
         ORDER BY class_id, sort_order",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, class_id, last_name, first_name, student_no, status) in rows {
        let status =
            StudentStatus::parse(&status).ok_or_else(|| anyhow!("bad student status {status:?}"))?;
        students_by_class.entry(class_id).or_default().push(Student {
            id,
            first_name,
            last_name,
            student_id: student_no,
            status,
        });
    }

    let mut stmt = conn
        .prepare("SELECT id, name, school_year_id, created_at FROM classes ORDER BY created_at, id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, name, school_year_id, created_at) in rows {
        let students = students_by_class.remove(&id).unwrap_or_default();
        store.classes.push(ClassRoom {
            id,
            name,
            school_year_id,
            students,
            created_at: parse_ts(&created_at)?,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, class_id, school_year_id, coefficient, coefficient_enabled,
                min_interros, min_devoirs, interro_weight, devoir_weight,
                display_mode, formula, created_at
         FROM units
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, f64>(4)?,
                r.get::<_, bool>(5)?,
                r.get::<_, u32>(6)?,
                r.get::<_, u32>(7)?,
                r.get::<_, f64>(8)?,
                r.get::<_, f64>(9)?,
                r.get::<_, String>(10)?,
                r.get::<_, String>(11)?,
                r.get::<_, String>(12)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (
        id,
        name,
        class_room_id,
        school_year_id,
        coefficient,
        coefficient_enabled,
        min_interros,
        min_devoirs,
        interro_weight,
        devoir_weight,
        display_mode,
        formula,
        created_at,
    ) in rows
    {
        let display_mode = DisplayMode::parse(&display_mode)
            .ok_or_else(|| anyhow!("bad display mode {display_mode:?}"))?;
        store.units.push(PedagogicalUnit {
            id,
            name,
            class_room_id,
            school_year_id,
            rules: GradeRule {
                coefficient,
                coefficient_enabled,
                min_interros,
                min_devoirs,
                interro_weight,
                devoir_weight,
                display_mode,
                formula,
            },
            created_at: parse_ts(&created_at)?,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT id, unit_id, name, kind, coefficient, max_score, date
         FROM evaluations
         ORDER BY date, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, f64>(4)?,
                r.get::<_, f64>(5)?,
                r.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, unit_id, name, kind, coefficient, max_score, date) in rows {
        let kind = EvaluationType::parse(&kind).ok_or_else(|| anyhow!("bad evaluation type {kind:?}"))?;
        store.evaluations.push(Evaluation {
            id,
            name,
            pedagogical_unit_id: unit_id,
            kind,
            coefficient,
            max_score,
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("bad evaluation date {date:?}"))?,
        });
    }

    let mut history: HashMap<String, GradeHistory> = HashMap::new();
    let mut stmt = conn.prepare("SELECT grade_id, value, modified_at, reason FROM grade_history")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, f64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (grade_id, value, modified_at, reason) in rows {
        history.insert(
            grade_id,
            GradeHistory {
                value,
                modified_at: parse_ts(&modified_at)?,
                reason,
            },
        );
    }

    let mut stmt = conn.prepare(
        "SELECT id, student_id, evaluation_id, value, state, created_at, modified_at
         FROM grades
         ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, student_id, evaluation_id, value, state, created_at, modified_at) in rows {
        let state = match state.as_str() {
            "unlocked" => GradeState::Unlocked,
            "locked" => GradeState::Locked,
            "amended" => GradeState::Amended(
                history
                    .remove(&id)
                    .ok_or_else(|| anyhow!("amended grade {id} has no history row"))?,
            ),
            other => return Err(anyhow!("bad grade state {other:?}")),
        };
        store.grades.push(Grade {
            id,
            student_id,
            evaluation_id,
            value,
            state,
            created_at: parse_ts(&created_at)?,
            modified_at: modified_at.as_deref().map(parse_ts).transpose()?,
        });
    }

    let mut stmt = conn.prepare("SELECT unit_id, locked FROM unit_locks")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, bool>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    store.unit_locks.extend(rows);

    store.active_year_id = settings_get_json(conn, ACTIVE_YEAR_KEY)?
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .filter(|id| store.year(id).is_some());

    store.validate()?;
    Ok(store)
}
