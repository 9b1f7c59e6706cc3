use rusqlite::Connection;

use crate::model::{now_rfc3339, ClassKey, Section};
use crate::store;
use crate::sync::{SyncCounters, SyncReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    /// Precondition failed and no derived row existed.
    NothingToDo,
    /// Referential or data inconsistency; recorded in the report.
    Skipped,
}

/// Build or repair the single class `{section.id}_{subject_code}` from
/// current snapshots. If the section is no longer entitled to the class
/// (no curriculum, curriculum gone, or subject dropped from it), the class
/// is deleted rather than left stale.
///
/// Writes are merges: only the engine-owned columns are touched, and only
/// when something actually changed — materializing twice in a row performs
/// zero writes the second time.
pub fn materialize(
    conn: &Connection,
    section: &Section,
    subject_code: &str,
    counters: &mut SyncCounters,
    report: &mut SyncReport,
) -> anyhow::Result<Outcome> {
    let key = ClassKey::new(&section.id, subject_code).as_key();

    let entitled = match section.curriculum_id.as_deref() {
        Some(cid) => store::curriculum_subject_codes(conn, cid)?
            .iter()
            .any(|c| c == subject_code),
        None => false,
    };
    if !entitled {
        return delete_if_present(conn, &key, counters, report);
    }

    let Some(subject) = store::get_subject(conn, subject_code)? else {
        // Curriculum references a subject that does not exist. Drop any
        // stale class, record the inconsistency, move on to siblings.
        let outcome = delete_if_present(conn, &key, counters, report)?;
        report.push_skip(
            &key,
            "missing_subject",
            format!("curriculum references unknown subject {}", subject_code),
        );
        counters.skips += 1;
        return Ok(if outcome == Outcome::Deleted {
            Outcome::Deleted
        } else {
            Outcome::Skipped
        });
    };

    if subject.name.trim().is_empty() || section.strand.trim().is_empty() {
        report.push_skip(
            &key,
            "invalid_source",
            "section strand and subject name are required",
        );
        counters.skips += 1;
        return Ok(Outcome::Skipped);
    }

    let Some(current) = store::get_class(conn, &key)? else {
        let now = now_rfc3339();
        let roster = store::roster_for_section(conn, &section.id)?;
        conn.execute(
            "INSERT INTO classes(key, section_id, subject_id, grade_level, strand, section_number,
                                 status, subject_name, teacher, room_number, student_count,
                                 schedule, created_at, last_updated)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
            (
                &key,
                &section.id,
                subject_code,
                section.grade_level,
                &section.strand,
                section.section_number,
                section.status.as_str(),
                &subject.name,
                subject.teacher_id.as_deref(),
                subject.room_number.as_deref(),
                roster.len() as i64,
                &now,
                &now,
            ),
        )?;
        for entry in &roster {
            conn.execute(
                "INSERT INTO class_students(class_key, student_id, name, lrn) VALUES(?, ?, ?, ?)",
                (&key, &entry.id, &entry.name, &entry.lrn),
            )?;
        }
        counters.class_writes += 1;
        report.created += 1;
        return Ok(Outcome::Created);
    };

    let unchanged = current.grade_level == section.grade_level
        && current.strand == section.strand
        && current.section_number == section.section_number
        && current.status == section.status
        && current.subject_name == subject.name
        && current.teacher == subject.teacher_id
        && current.room_number == subject.room_number;
    if unchanged {
        report.unchanged += 1;
        return Ok(Outcome::Unchanged);
    }

    // Merge: engine-owned columns only. schedule, attendance, assignments
    // and the roster mirror belong to other writers.
    conn.execute(
        "UPDATE classes SET grade_level = ?, strand = ?, section_number = ?, status = ?,
                            subject_name = ?, teacher = ?, room_number = ?, last_updated = ?
         WHERE key = ?",
        (
            section.grade_level,
            &section.strand,
            section.section_number,
            section.status.as_str(),
            &subject.name,
            subject.teacher_id.as_deref(),
            subject.room_number.as_deref(),
            now_rfc3339(),
            &key,
        ),
    )?;
    counters.class_writes += 1;
    report.updated += 1;
    Ok(Outcome::Updated)
}

fn delete_if_present(
    conn: &Connection,
    key: &str,
    counters: &mut SyncCounters,
    report: &mut SyncReport,
) -> anyhow::Result<Outcome> {
    if store::get_class(conn, key)?.is_none() {
        return Ok(Outcome::NothingToDo);
    }
    store::delete_class(conn, key)?;
    counters.class_deletes += 1;
    report.deleted += 1;
    Ok(Outcome::Deleted)
}
