use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(busy_timeout)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tenants(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            grading_system TEXT NOT NULL DEFAULT '{}',
            pass_mark REAL NOT NULL DEFAULT 10.0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            capacity INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(tenant_id) REFERENCES tenants(id),
            UNIQUE(tenant_id, name, academic_year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            default_credit REAL NOT NULL DEFAULT 1.0,
            FOREIGN KEY(tenant_id) REFERENCES tenants(id),
            UNIQUE(tenant_id, code)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            credit REAL NOT NULL,
            max_students INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(class_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_subjects_class ON class_subjects(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            class_id TEXT,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            FOREIGN KEY(tenant_id) REFERENCES tenants(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_subject_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_subject_id) REFERENCES class_subjects(id),
            UNIQUE(student_id, class_subject_id, academic_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_class_subject ON enrollments(class_subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            name TEXT NOT NULL,
            tier INTEGER NOT NULL,
            max_score REAL NOT NULL DEFAULT 20.0,
            FOREIGN KEY(tenant_id) REFERENCES tenants(id),
            UNIQUE(tenant_id, name, academic_year, tier)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS weight_links(
            parent_exam_id TEXT NOT NULL,
            child_exam_id TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            PRIMARY KEY(parent_exam_id, child_exam_id),
            FOREIGN KEY(parent_exam_id) REFERENCES exams(id),
            FOREIGN KEY(child_exam_id) REFERENCES exams(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_sheets(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            exam_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            total_score REAL,
            credits_attempted REAL,
            credits_obtained REAL,
            average REAL,
            remark TEXT NOT NULL DEFAULT '',
            rank INTEGER,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, exam_id, class_id, academic_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_sheets_scope ON grade_sheets(exam_id, class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS score_records(
            id TEXT PRIMARY KEY,
            grade_sheet_id TEXT NOT NULL,
            class_subject_id TEXT NOT NULL,
            score REAL,
            rank INTEGER,
            exam_taken INTEGER NOT NULL DEFAULT 0,
            observation TEXT NOT NULL DEFAULT '',
            updated_at TEXT,
            FOREIGN KEY(grade_sheet_id) REFERENCES grade_sheets(id),
            FOREIGN KEY(class_subject_id) REFERENCES class_subjects(id),
            UNIQUE(grade_sheet_id, class_subject_id)
        )",
        [],
    )?;
    ensure_score_records_exam_taken(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_score_records_sheet ON score_records(grade_sheet_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_score_records_subject ON score_records(class_subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subject_stats(
            exam_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            class_subject_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            max_score REAL NOT NULL,
            min_score REAL NOT NULL,
            avg_score REAL NOT NULL,
            num_sat INTEGER NOT NULL,
            num_passed INTEGER NOT NULL,
            percentage_passed REAL NOT NULL,
            PRIMARY KEY(exam_id, class_id, class_subject_id, academic_year),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(class_subject_id) REFERENCES class_subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_overall_stats(
            exam_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            num_students INTEGER NOT NULL,
            num_passes INTEGER NOT NULL,
            class_average REAL NOT NULL,
            overall_percentage_pass REAL NOT NULL,
            PRIMARY KEY(exam_id, class_id, academic_year),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    Ok(())
}

// Workspaces created before observation tracking stored only the score.
fn ensure_score_records_exam_taken(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "score_records", "exam_taken")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE score_records ADD COLUMN exam_taken INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    conn.execute(
        "UPDATE score_records SET exam_taken = 1 WHERE score IS NOT NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}
