use rusqlite::{Connection, OptionalExtension};

use crate::model::{ClassKey, Section};
use crate::store;

// Pure fan-out: given one upstream change, which derived class keys (or
// which sections, for curriculum-shaped changes) are affected. Read-only
// queries over current snapshots; all writes happen in the materializer and
// scheduler.

/// Class keys a section should materialize, per its linked curriculum.
/// Empty when the section has no curriculum or the curriculum is missing.
pub fn expected_class_keys(conn: &Connection, section: &Section) -> anyhow::Result<Vec<ClassKey>> {
    let Some(cid) = section.curriculum_id.as_deref() else {
        return Ok(Vec::new());
    };
    let codes = store::curriculum_subject_codes(conn, cid)?;
    Ok(codes
        .into_iter()
        .map(|code| ClassKey::new(&section.id, &code))
        .collect())
}

/// Existing class keys referencing a subject, via the reverse index — never
/// a scan of the class collection.
pub fn class_keys_for_subject(conn: &Connection, code: &str) -> anyhow::Result<Vec<ClassKey>> {
    let mut stmt = conn.prepare("SELECT key FROM classes WHERE subject_id = ? ORDER BY key")?;
    let keys = stmt
        .query_map([code], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys.iter().filter_map(|k| ClassKey::parse(k)).collect())
}

/// Sections a subject change can touch: those with a class referencing the
/// subject, plus those whose curriculum names it (a class may be missing and
/// need creating).
pub fn affected_section_ids_for_subject(conn: &Connection, code: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT section_id FROM classes WHERE subject_id = ?1
         UNION
         SELECT s.id FROM sections s
           JOIN curriculum_subjects cs ON cs.curriculum_id = s.curriculum_id
         WHERE cs.subject_code = ?1
         ORDER BY 1",
    )?;
    let ids = stmt
        .query_map([code], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// The active curriculum a section of this grade level and strand should
/// link to. Deterministic pick if several match.
pub fn matching_curriculum(
    conn: &Connection,
    grade_level: i64,
    strand: &str,
) -> anyhow::Result<Option<String>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM curriculums
             WHERE grade_level = ? AND strand = ? AND status = 'active'
             ORDER BY id LIMIT 1",
            (grade_level, strand),
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn sections_linked_to_curriculum(conn: &Connection, curriculum_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM sections WHERE curriculum_id = ? ORDER BY id")?;
    let ids = stmt
        .query_map([curriculum_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Sections matching a curriculum's target that have no curriculum yet —
/// the auto-link candidates.
pub fn unlinked_sections_matching(
    conn: &Connection,
    grade_level: i64,
    strand: &str,
) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM sections
         WHERE grade_level = ? AND strand = ? AND curriculum_id IS NULL
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map((grade_level, strand), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
