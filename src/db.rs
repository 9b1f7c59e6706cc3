use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "schoolsync.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            grade_level INTEGER NOT NULL,
            strand TEXT NOT NULL,
            section_number INTEGER NOT NULL,
            status TEXT NOT NULL,
            curriculum_id TEXT,
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_curriculum ON sections(curriculum_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_grade_strand ON sections(grade_level, strand)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS section_students(
            section_id TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            lrn TEXT NOT NULL,
            raw_line TEXT,
            PRIMARY KEY(section_id, id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            teacher_id TEXT,
            room_number TEXT,
            status TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS curriculums(
            id TEXT PRIMARY KEY,
            grade_level INTEGER NOT NULL,
            strand TEXT NOT NULL,
            status TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_curriculums_grade_strand ON curriculums(grade_level, strand)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS curriculum_subjects(
            curriculum_id TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(curriculum_id, subject_code),
            FOREIGN KEY(curriculum_id) REFERENCES curriculums(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_curriculum_subjects_code ON curriculum_subjects(subject_code)",
        [],
    )?;

    // Derived collection. `key` is "{sectionId}_{subjectCode}". schedule,
    // attendance and assignments are owned by collaborator modules; the sync
    // engine only ever merges around them.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            key TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            grade_level INTEGER NOT NULL,
            strand TEXT NOT NULL,
            section_number INTEGER NOT NULL,
            status TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            teacher TEXT,
            room_number TEXT,
            student_count INTEGER NOT NULL,
            schedule TEXT,
            created_at TEXT NOT NULL,
            last_updated TEXT NOT NULL
        )",
        [],
    )?;
    // Reverse index: subject fan-out must never scan the class collection.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_subject ON classes(subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_section ON classes(section_id)",
        [],
    )?;
    ensure_classes_collaborator_columns(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_students(
            class_key TEXT NOT NULL,
            student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            lrn TEXT NOT NULL,
            PRIMARY KEY(class_key, student_id),
            FOREIGN KEY(class_key) REFERENCES classes(key)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

// Workspaces created before the scheduling/attendance split carry classes
// without the collaborator columns. Add them if needed.
fn ensure_classes_collaborator_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "classes", "attendance")? {
        conn.execute("ALTER TABLE classes ADD COLUMN attendance TEXT", [])?;
    }
    if !table_has_column(conn, "classes", "assignments")? {
        conn.execute("ALTER TABLE classes ADD COLUMN assignments TEXT", [])?;
    }
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    use rusqlite::OptionalExtension;
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
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
        (key, serde_json::to_string(value)?),
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
