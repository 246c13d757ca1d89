//! Enrollment roster. The engine only reads it through [`Enrollment`]; the
//! feed functions below exist so a workspace can be populated.

use crate::error::{EngineError, EngineResult};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capacity {
    /// 0 means no limit.
    pub max: i64,
    pub current: i64,
}

impl Capacity {
    pub fn is_full(self) -> bool {
        self.max > 0 && self.current >= self.max
    }
}

pub trait Enrollment {
    fn is_enrolled(
        &self,
        student_id: &str,
        class_subject_id: &str,
        academic_year: &str,
    ) -> EngineResult<bool>;
    fn class_subject_credit(&self, class_subject_id: &str) -> EngineResult<f64>;
    fn class_subject_capacity(
        &self,
        class_subject_id: &str,
        academic_year: &str,
    ) -> EngineResult<Capacity>;
    /// Active class subjects the student is enrolled in, in class order.
    fn enrolled_class_subjects(
        &self,
        student_id: &str,
        class_id: &str,
        academic_year: &str,
    ) -> EngineResult<Vec<String>>;
}

pub struct SqliteRoster<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRoster<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl Enrollment for SqliteRoster<'_> {
    fn is_enrolled(
        &self,
        student_id: &str,
        class_subject_id: &str,
        academic_year: &str,
    ) -> EngineResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM enrollments e
                 JOIN class_subjects cs ON cs.id = e.class_subject_id
                 WHERE e.student_id = ? AND e.class_subject_id = ? AND e.academic_year = ?
                   AND e.is_active = 1 AND cs.is_active = 1",
                (student_id, class_subject_id, academic_year),
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn class_subject_credit(&self, class_subject_id: &str) -> EngineResult<f64> {
        self.conn
            .query_row(
                "SELECT credit FROM class_subjects WHERE id = ?",
                [class_subject_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found("class subject", class_subject_id))
    }

    fn class_subject_capacity(
        &self,
        class_subject_id: &str,
        academic_year: &str,
    ) -> EngineResult<Capacity> {
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT max_students FROM class_subjects WHERE id = ?",
                [class_subject_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(max) = max else {
            return Err(EngineError::not_found("class subject", class_subject_id));
        };
        let current: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM enrollments
             WHERE class_subject_id = ? AND academic_year = ? AND is_active = 1",
            (class_subject_id, academic_year),
            |r| r.get(0),
        )?;
        Ok(Capacity { max, current })
    }

    fn enrolled_class_subjects(
        &self,
        student_id: &str,
        class_id: &str,
        academic_year: &str,
    ) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT cs.id FROM enrollments e
             JOIN class_subjects cs ON cs.id = e.class_subject_id
             WHERE e.student_id = ? AND cs.class_id = ? AND e.academic_year = ?
               AND e.is_active = 1 AND cs.is_active = 1
             ORDER BY cs.rowid",
        )?;
        let ids = stmt
            .query_map((student_id, class_id, academic_year), |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub tenant_id: String,
    pub name: String,
    pub academic_year: String,
    pub capacity: i64,
}

pub fn load_class(conn: &Connection, class_id: &str) -> EngineResult<ClassInfo> {
    conn.query_row(
        "SELECT tenant_id, name, academic_year, capacity FROM classes WHERE id = ?",
        [class_id],
        |r| {
            Ok(ClassInfo {
                tenant_id: r.get(0)?,
                name: r.get(1)?,
                academic_year: r.get(2)?,
                capacity: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("class", class_id))
}

/// The class a class subject belongs to.
pub fn class_subject_class(conn: &Connection, class_subject_id: &str) -> EngineResult<String> {
    conn.query_row(
        "SELECT class_id FROM class_subjects WHERE id = ?",
        [class_subject_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("class subject", class_subject_id))
}

/// The academic year of the class a class subject belongs to.
pub fn class_subject_year(conn: &Connection, class_subject_id: &str) -> EngineResult<String> {
    conn.query_row(
        "SELECT c.academic_year FROM class_subjects cs
         JOIN classes c ON c.id = cs.class_id
         WHERE cs.id = ?",
        [class_subject_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| EngineError::not_found("class subject", class_subject_id))
}

pub fn create_class(
    conn: &Connection,
    tenant_id: &str,
    name: &str,
    academic_year: &str,
    capacity: i64,
) -> EngineResult<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, tenant_id, name, academic_year, capacity) VALUES(?, ?, ?, ?, ?)",
        (&id, tenant_id, name.trim(), academic_year.trim(), capacity.max(0)),
    )?;
    Ok(id)
}

pub fn create_subject(
    conn: &Connection,
    tenant_id: &str,
    code: &str,
    name: &str,
    default_credit: f64,
) -> EngineResult<String> {
    if default_credit <= 0.0 {
        return Err(EngineError::InvalidInput("defaultCredit must be > 0".into()));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, tenant_id, code, name, default_credit) VALUES(?, ?, ?, ?, ?)",
        (&id, tenant_id, code.trim(), name.trim(), default_credit),
    )?;
    Ok(id)
}

/// Attaches a subject to a class. Credit falls back to the subject's default
/// credit and the roster limit to the class capacity.
pub fn add_class_subject(
    conn: &Connection,
    class_id: &str,
    subject_id: &str,
    credit: Option<f64>,
    max_students: Option<i64>,
) -> EngineResult<String> {
    let class = load_class(conn, class_id)?;
    let default_credit: Option<f64> = conn
        .query_row(
            "SELECT default_credit FROM subjects WHERE id = ?",
            [subject_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(default_credit) = default_credit else {
        return Err(EngineError::not_found("subject", subject_id));
    };
    let credit = credit.filter(|c| *c > 0.0).unwrap_or(default_credit);
    let max_students = max_students
        .filter(|m| *m > 0)
        .unwrap_or(class.capacity);

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO class_subjects(id, class_id, subject_id, credit, max_students, is_active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (&id, class_id, subject_id, credit, max_students),
    )?;
    Ok(id)
}

pub fn create_student(
    conn: &Connection,
    tenant_id: &str,
    class_id: Option<&str>,
    last_name: &str,
    first_name: &str,
) -> EngineResult<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, tenant_id, class_id, last_name, first_name) VALUES(?, ?, ?, ?, ?)",
        (&id, tenant_id, class_id, last_name.trim(), first_name.trim()),
    )?;
    Ok(id)
}

/// Idempotent. A new or re-activated enrollment into a full subject fails
/// with `Capacity`.
pub fn enroll(
    conn: &Connection,
    student_id: &str,
    class_subject_id: &str,
    academic_year: &str,
) -> EngineResult<()> {
    let roster = SqliteRoster::new(conn);
    if roster.is_enrolled(student_id, class_subject_id, academic_year)? {
        return Ok(());
    }
    let capacity = roster.class_subject_capacity(class_subject_id, academic_year)?;
    if capacity.is_full() {
        return Err(EngineError::Capacity {
            class_subject_id: class_subject_id.to_string(),
            max: capacity.max,
            current: capacity.current,
        });
    }
    conn.execute(
        "INSERT INTO enrollments(id, student_id, class_subject_id, academic_year, is_active)
         VALUES(?, ?, ?, ?, 1)
         ON CONFLICT(student_id, class_subject_id, academic_year) DO UPDATE SET
           is_active = 1",
        (
            Uuid::new_v4().to_string(),
            student_id,
            class_subject_id,
            academic_year,
        ),
    )?;
    Ok(())
}

pub fn unenroll(
    conn: &Connection,
    student_id: &str,
    class_subject_id: &str,
    academic_year: &str,
) -> EngineResult<bool> {
    let changed = conn.execute(
        "UPDATE enrollments SET is_active = 0
         WHERE student_id = ? AND class_subject_id = ? AND academic_year = ? AND is_active = 1",
        (student_id, class_subject_id, academic_year),
    )?;
    Ok(changed > 0)
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassEnrollmentOutcome {
    pub enrolled: Vec<String>,
    pub skipped_full: Vec<String>,
}

/// Enrolls a student in every active subject of a class. Full subjects are
/// skipped and reported rather than failing the whole call.
pub fn enroll_in_class(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
) -> EngineResult<ClassEnrollmentOutcome> {
    let class = load_class(conn, class_id)?;
    let mut stmt = conn.prepare(
        "SELECT id FROM class_subjects WHERE class_id = ? AND is_active = 1 ORDER BY rowid",
    )?;
    let class_subject_ids = stmt
        .query_map([class_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    let mut outcome = ClassEnrollmentOutcome::default();
    for cs_id in class_subject_ids {
        match enroll(conn, student_id, &cs_id, &class.academic_year) {
            Ok(()) => outcome.enrolled.push(cs_id),
            Err(EngineError::Capacity { .. }) => {
                tracing::info!(student_id, class_subject_id = %cs_id, "subject full, enrollment skipped");
                outcome.skipped_full.push(cs_id);
            }
            Err(e) => return Err(e),
        }
    }
    conn.execute(
        "UPDATE students SET class_id = ? WHERE id = ?",
        (class_id, student_id),
    )?;
    Ok(outcome)
}
