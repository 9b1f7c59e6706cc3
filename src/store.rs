use rusqlite::{Connection, OptionalExtension, Row};

use crate::model::{ClassKey, ClassRecord, Curriculum, RecordStatus, RosterEntry, Section, SectionStatus, Subject};

// Snapshot readers shared by the sync engine and the IPC handlers. Every
// derived write re-reads through these immediately before writing; nothing
// here caches.

fn section_from_row(row: &Row) -> rusqlite::Result<(Section, String)> {
    let status_raw: String = row.get(4)?;
    let section = Section {
        id: row.get(0)?,
        grade_level: row.get(1)?,
        strand: row.get(2)?,
        section_number: row.get(3)?,
        status: SectionStatus::parse(&status_raw).unwrap_or(SectionStatus::Inactive),
        curriculum_id: row.get(5)?,
        created_at: row.get(6)?,
        last_updated: row.get(7)?,
    };
    Ok((section, status_raw))
}

pub fn get_section(conn: &Connection, id: &str) -> anyhow::Result<Option<Section>> {
    let got = conn
        .query_row(
            "SELECT id, grade_level, strand, section_number, status, curriculum_id, created_at, last_updated
             FROM sections WHERE id = ?",
            [id],
            section_from_row,
        )
        .optional()?;
    match got {
        None => Ok(None),
        Some((section, raw)) => {
            if SectionStatus::parse(&raw).is_none() {
                anyhow::bail!("section {} has invalid status {:?}", id, raw);
            }
            Ok(Some(section))
        }
    }
}

pub fn all_section_ids(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM sections ORDER BY rowid")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn get_subject(conn: &Connection, code: &str) -> anyhow::Result<Option<Subject>> {
    let got = conn
        .query_row(
            "SELECT code, name, type, teacher_id, room_number, status FROM subjects WHERE code = ?",
            [code],
            |row| {
                let status_raw: String = row.get(5)?;
                Ok((
                    Subject {
                        code: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        teacher_id: row.get(3)?,
                        room_number: row.get(4)?,
                        status: RecordStatus::parse(&status_raw).unwrap_or(RecordStatus::Inactive),
                    },
                    status_raw,
                ))
            },
        )
        .optional()?;
    match got {
        None => Ok(None),
        Some((subject, raw)) => {
            if RecordStatus::parse(&raw).is_none() {
                anyhow::bail!("subject {} has invalid status {:?}", code, raw);
            }
            Ok(Some(subject))
        }
    }
}

pub fn list_subjects(conn: &Connection) -> anyhow::Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT code, name, type, teacher_id, room_number, status FROM subjects ORDER BY code",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let status_raw: String = row.get(5)?;
            Ok(Subject {
                code: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                teacher_id: row.get(3)?,
                room_number: row.get(4)?,
                status: RecordStatus::parse(&status_raw).unwrap_or(RecordStatus::Inactive),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_curriculum(conn: &Connection, id: &str) -> anyhow::Result<Option<Curriculum>> {
    let head = conn
        .query_row(
            "SELECT id, grade_level, strand, status FROM curriculums WHERE id = ?",
            [id],
            |row| {
                let status_raw: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    status_raw,
                ))
            },
        )
        .optional()?;
    let Some((id, grade_level, strand, status_raw)) = head else {
        return Ok(None);
    };
    let Some(status) = RecordStatus::parse(&status_raw) else {
        anyhow::bail!("curriculum {} has invalid status {:?}", id, status_raw);
    };
    Ok(Some(Curriculum {
        subjects: curriculum_subject_codes(conn, &id)?,
        id,
        grade_level,
        strand,
        status,
    }))
}

pub fn curriculum_subject_codes(conn: &Connection, curriculum_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT subject_code FROM curriculum_subjects WHERE curriculum_id = ? ORDER BY sort_order",
    )?;
    let codes = stmt
        .query_map([curriculum_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(codes)
}

pub fn roster_for_section(conn: &Connection, section_id: &str) -> anyhow::Result<Vec<RosterEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, lrn FROM section_students WHERE section_id = ? ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map([section_id], |r| {
            Ok(RosterEntry {
                id: r.get(0)?,
                name: r.get(1)?,
                lrn: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn class_from_row(row: &Row) -> rusqlite::Result<ClassRecord> {
    let status_raw: String = row.get(6)?;
    let schedule_raw: Option<String> = row.get(11)?;
    let attendance_raw: Option<String> = row.get(12)?;
    let assignments_raw: Option<String> = row.get(13)?;
    Ok(ClassRecord {
        key: row.get(0)?,
        section_id: row.get(1)?,
        subject_id: row.get(2)?,
        grade_level: row.get(3)?,
        strand: row.get(4)?,
        section_number: row.get(5)?,
        status: SectionStatus::parse(&status_raw).unwrap_or(SectionStatus::Inactive),
        subject_name: row.get(7)?,
        teacher: row.get(8)?,
        room_number: row.get(9)?,
        student_count: row.get(10)?,
        schedule: schedule_raw.and_then(|s| serde_json::from_str(&s).ok()),
        attendance: attendance_raw.and_then(|s| serde_json::from_str(&s).ok()),
        assignments: assignments_raw.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(14)?,
        last_updated: row.get(15)?,
    })
}

const CLASS_COLUMNS: &str = "key, section_id, subject_id, grade_level, strand, section_number, status,
     subject_name, teacher, room_number, student_count, schedule, attendance, assignments,
     created_at, last_updated";

pub fn get_class(conn: &Connection, key: &str) -> anyhow::Result<Option<ClassRecord>> {
    let sql = format!("SELECT {} FROM classes WHERE key = ?", CLASS_COLUMNS);
    Ok(conn.query_row(&sql, [key], class_from_row).optional()?)
}

pub fn list_classes(conn: &Connection, section_id: Option<&str>) -> anyhow::Result<Vec<ClassRecord>> {
    let rows = match section_id {
        Some(sid) => {
            let sql = format!(
                "SELECT {} FROM classes WHERE section_id = ? ORDER BY key",
                CLASS_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([sid], class_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("SELECT {} FROM classes ORDER BY key", CLASS_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], class_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn class_students(conn: &Connection, class_key: &str) -> anyhow::Result<Vec<RosterEntry>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, name, lrn FROM class_students WHERE class_key = ? ORDER BY name, student_id",
    )?;
    let rows = stmt
        .query_map([class_key], |r| {
            Ok(RosterEntry {
                id: r.get(0)?,
                name: r.get(1)?,
                lrn: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn class_keys_for_section(conn: &Connection, section_id: &str) -> anyhow::Result<Vec<ClassKey>> {
    let mut stmt =
        conn.prepare("SELECT key FROM classes WHERE section_id = ? ORDER BY key")?;
    let keys = stmt
        .query_map([section_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys.iter().filter_map(|k| ClassKey::parse(k)).collect())
}

/// Classes whose section no longer exists. Only a repair pass should find any.
pub fn orphan_class_keys(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT key FROM classes WHERE section_id NOT IN (SELECT id FROM sections)",
    )?;
    let keys = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

// Deletes in dependency order; class_students has no cascade.
pub fn delete_class(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM class_students WHERE class_key = ?", [key])?;
    conn.execute("DELETE FROM classes WHERE key = ?", [key])?;
    Ok(())
}
