use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "collegeadmin.sqlite3";
const SEAL_KEY_SETTING: &str = "upload.sealKey";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates every table and index idempotently and back-fills columns that
/// older workspaces may lack.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS colleges(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL COLLATE NOCASE,
            code TEXT COLLATE NOCASE,
            is_active INTEGER NOT NULL DEFAULT 1,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_colleges_name ON colleges(name)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_colleges_code ON colleges(code) WHERE code IS NOT NULL",
        [],
    )?;

    // Course names are unique across colleges; students reference them by name.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            college_id TEXT NOT NULL,
            name TEXT NOT NULL COLLATE NOCASE,
            code TEXT COLLATE NOCASE,
            total_years INTEGER NOT NULL,
            semesters_per_year INTEGER NOT NULL,
            year_semester_config TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(college_id) REFERENCES colleges(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_courses_name ON courses(name)",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_courses_code ON courses(code) WHERE code IS NOT NULL",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_college ON courses(college_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL COLLATE NOCASE,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_academic_years_label ON academic_years(label)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS branches(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            name TEXT NOT NULL COLLATE NOCASE,
            code TEXT NOT NULL COLLATE NOCASE,
            total_years INTEGER,
            semesters_per_year INTEGER,
            year_semester_config TEXT,
            academic_year_id TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(academic_year_id) REFERENCES academic_years(id)
        )",
        [],
    )?;
    // Workspaces created before per-branch year overrides lack this column.
    ensure_branches_year_semester_config(conn)?;
    // NULL academic years collapse to '' so generic rows are unique per course too.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_code_year
         ON branches(course_id, code, IFNULL(academic_year_id, ''))",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_name_year
         ON branches(course_id, name, IFNULL(academic_year_id, ''))",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_branches_course ON branches(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            admission_number TEXT NOT NULL COLLATE NOCASE,
            pin_no TEXT,
            student_name TEXT NOT NULL,
            gender TEXT,
            college TEXT NOT NULL COLLATE NOCASE,
            course TEXT NOT NULL COLLATE NOCASE,
            branch TEXT NOT NULL COLLATE NOCASE,
            batch TEXT NOT NULL COLLATE NOCASE,
            current_year INTEGER NOT NULL DEFAULT 1,
            current_semester INTEGER NOT NULL DEFAULT 1,
            student_status TEXT NOT NULL DEFAULT 'Regular',
            student_mobile TEXT,
            parent_mobile TEXT,
            email TEXT,
            date_of_birth TEXT,
            father_name TEXT,
            mother_name TEXT,
            address TEXT,
            category TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    ensure_students_pin_no(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_admission ON students(admission_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_placement ON students(college, course, branch)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_batch ON students(batch)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_headers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_fees(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            fee_header_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            amount REAL NOT NULL,
            paid_amount REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(fee_header_id) REFERENCES fee_headers(id),
            UNIQUE(student_id, fee_header_id, year, semester)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_fees_student ON student_fees(student_id)",
        [],
    )?;

    ensure_seal_key(conn)?;
    Ok(())
}

fn ensure_branches_year_semester_config(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "branches", "year_semester_config")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE branches ADD COLUMN year_semester_config TEXT",
        [],
    )?;
    Ok(())
}

fn ensure_students_pin_no(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "pin_no")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN pin_no TEXT", [])?;
    Ok(())
}

fn ensure_seal_key(conn: &Connection) -> anyhow::Result<()> {
    if settings_get_json(conn, SEAL_KEY_SETTING)?.is_some() {
        return Ok(());
    }
    let key = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    settings_set_json(conn, SEAL_KEY_SETTING, &serde_json::Value::String(key))?;
    Ok(())
}

/// Per-workspace secret used to seal preview rows.
pub fn seal_key(conn: &Connection) -> rusqlite::Result<String> {
    let v = settings_get_json(conn, SEAL_KEY_SETTING)?;
    Ok(v.and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
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
pub fn open_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent_and_keeps_seal_key() {
        let conn = open_memory();
        let key = seal_key(&conn).expect("seal key");
        assert_eq!(key.len(), 64);
        init_schema(&conn).expect("second init");
        assert_eq!(seal_key(&conn).expect("seal key again"), key);
    }

    #[test]
    fn generic_branch_rows_are_unique_per_course() {
        let conn = open_memory();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO colleges(id, name, created_at, updated_at) VALUES('c', 'Tech U', ?1, ?1)",
            [&now],
        )
        .expect("college");
        conn.execute(
            "INSERT INTO courses(id, college_id, name, total_years, semesters_per_year, created_at, updated_at)
             VALUES('k', 'c', 'B.Tech', 4, 2, ?1, ?1)",
            [&now],
        )
        .expect("course");
        conn.execute(
            "INSERT INTO branches(id, course_id, name, code, created_at, updated_at)
             VALUES('b1', 'k', 'CSE', 'CSE', ?1, ?1)",
            [&now],
        )
        .expect("branch");
        let dup = conn.execute(
            "INSERT INTO branches(id, course_id, name, code, created_at, updated_at)
             VALUES('b2', 'k', 'cse', 'cse', ?1, ?1)",
            [&now],
        );
        assert!(dup.is_err());
    }
}
