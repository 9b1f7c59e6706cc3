use rusqlite::Connection;

use crate::model::{now_rfc3339, RosterEntry};
use crate::store;
use crate::sync::{SyncCounters, SyncReport};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub added: Vec<RosterEntry>,
    pub removed: Vec<String>,
    pub renamed: Vec<RosterEntry>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.renamed.is_empty()
    }
}

/// Minimal patch from a class's embedded copy to the authoritative roster.
pub fn diff_roster(authoritative: &[RosterEntry], mirror: &[RosterEntry]) -> RosterDiff {
    let mut diff = RosterDiff::default();
    for entry in authoritative {
        match mirror.iter().find(|m| m.id == entry.id) {
            None => diff.added.push(entry.clone()),
            Some(m) if m.name != entry.name || m.lrn != entry.lrn => {
                diff.renamed.push(entry.clone())
            }
            Some(_) => {}
        }
    }
    for m in mirror {
        if !authoritative.iter().any(|e| e.id == m.id) {
            diff.removed.push(m.id.clone());
        }
    }
    diff
}

/// Bring every class of a section back in line with the section's roster.
/// Applies only the computed patch — untouched student rows, schedule and
/// the other collaborator columns are never rewritten — and keeps
/// `student_count == |students|` in the same transaction.
pub fn mirror_roster(
    conn: &Connection,
    section_id: &str,
    counters: &mut SyncCounters,
    report: &mut SyncReport,
) -> anyhow::Result<usize> {
    let authoritative = store::roster_for_section(conn, section_id)?;
    let mut patched = 0usize;

    for class_key in store::class_keys_for_section(conn, section_id)? {
        let key = class_key.as_key();
        let mirror = match store::class_students(conn, &key) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(class = %key, "roster mirror read failed: {e:#}");
                report.push_skip(&key, "store_failed", e.to_string());
                counters.skips += 1;
                continue;
            }
        };
        let stored_count: i64 = conn.query_row(
            "SELECT student_count FROM classes WHERE key = ?",
            [&key],
            |r| r.get(0),
        )?;

        let diff = diff_roster(&authoritative, &mirror);
        if diff.is_empty() && stored_count == authoritative.len() as i64 {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        for entry in &diff.added {
            tx.execute(
                "INSERT INTO class_students(class_key, student_id, name, lrn) VALUES(?, ?, ?, ?)",
                (&key, &entry.id, &entry.name, &entry.lrn),
            )?;
        }
        for entry in &diff.renamed {
            tx.execute(
                "UPDATE class_students SET name = ?, lrn = ? WHERE class_key = ? AND student_id = ?",
                (&entry.name, &entry.lrn, &key, &entry.id),
            )?;
        }
        for id in &diff.removed {
            tx.execute(
                "DELETE FROM class_students WHERE class_key = ? AND student_id = ?",
                (&key, id),
            )?;
        }
        tx.execute(
            "UPDATE classes SET student_count = ?, last_updated = ? WHERE key = ?",
            (authoritative.len() as i64, now_rfc3339(), &key),
        )?;
        tx.commit()?;
        counters.roster_patches += 1;
        patched += 1;
    }

    Ok(patched)
}
