use serde_json::json;
use uuid::Uuid;

use crate::feed::{ChangeEvent, EventKind};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::helpers::{
    curriculum_exists, get_required_i64, get_required_str, section_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_rfc3339, SectionStatus};

fn handle_sections_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sections": [] }));
    };

    // Counts included so the admin dashboard needs a single round trip.
    let mut stmt = match conn.prepare(
        "SELECT
           s.id, s.grade_level, s.strand, s.section_number, s.status, s.curriculum_id,
           (SELECT COUNT(*) FROM section_students ss WHERE ss.section_id = s.id) AS student_count,
           (SELECT COUNT(*) FROM classes c WHERE c.section_id = s.id) AS class_count
         FROM sections s
         ORDER BY s.grade_level, s.strand, s.section_number",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "gradeLevel": row.get::<_, i64>(1)?,
                "strand": row.get::<_, String>(2)?,
                "sectionNumber": row.get::<_, i64>(3)?,
                "status": row.get::<_, String>(4)?,
                "curriculumId": row.get::<_, Option<String>>(5)?,
                "studentCount": row.get::<_, i64>(6)?,
                "classCount": row.get::<_, i64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(sections) => ok(&req.id, json!({ "sections": sections })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_params(req: &Request) -> Result<(i64, String, i64, SectionStatus), HandlerErr> {
    let grade_level = get_required_i64(&req.params, "gradeLevel", 1, 12)?;
    let strand = get_required_str(&req.params, "strand")?;
    let section_number = get_required_i64(&req.params, "sectionNumber", 1, 99)?;
    let status_raw = get_required_str(&req.params, "status")?;
    let status = SectionStatus::parse(&status_raw).ok_or_else(|| {
        HandlerErr::bad_params("status must be one of: active, inactive, graduated")
    })?;
    Ok((grade_level, strand, section_number, status))
}

fn handle_sections_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let (grade_level, strand, section_number, status) = match create_params(req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let curriculum_id = match req.params.get("curriculumId").and_then(|v| v.as_str()) {
        Some(cid) => {
            match curriculum_exists(conn, cid) {
                Ok(true) => {}
                Ok(false) => return err(&req.id, "not_found", "curriculum not found", None),
                Err(e) => return e.response(&req.id),
            }
            Some(cid.to_string())
        }
        None => None,
    };

    let section_id = Uuid::new_v4().to_string();
    let now = now_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO sections(id, grade_level, strand, section_number, status, curriculum_id, created_at, last_updated)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &section_id,
            grade_level,
            &strand,
            section_number,
            status.as_str(),
            curriculum_id.as_deref(),
            &now,
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "sections" })),
        );
    }

    let report = state
        .engine
        .pump(conn, vec![ChangeEvent::section(EventKind::Added, &section_id)]);
    ok(
        &req.id,
        json!({ "sectionId": section_id, "sync": report }),
    )
}

fn handle_sections_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let section_id = match get_required_str(&req.params, "sectionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match section_exists(conn, &section_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "section not found", None),
        Err(e) => return e.response(&req.id),
    }
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    if patch.is_empty() {
        return err(&req.id, "bad_params", "patch must not be empty", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for (key, value) in patch {
        let result: Result<(), HandlerErr> = match key.as_str() {
            "gradeLevel" => match value.as_i64() {
                Some(n) if (1..=12).contains(&n) => tx
                    .execute("UPDATE sections SET grade_level = ? WHERE id = ?", (n, &section_id))
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                _ => Err(HandlerErr::bad_params("gradeLevel must be in 1..=12")),
            },
            "strand" => match value.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => tx
                    .execute("UPDATE sections SET strand = ? WHERE id = ?", (s, &section_id))
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                _ => Err(HandlerErr::bad_params("strand must be a non-empty string")),
            },
            "sectionNumber" => match value.as_i64() {
                Some(n) if (1..=99).contains(&n) => tx
                    .execute(
                        "UPDATE sections SET section_number = ? WHERE id = ?",
                        (n, &section_id),
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                _ => Err(HandlerErr::bad_params("sectionNumber must be in 1..=99")),
            },
            "status" => match value.as_str().and_then(SectionStatus::parse) {
                Some(s) => tx
                    .execute(
                        "UPDATE sections SET status = ? WHERE id = ?",
                        (s.as_str(), &section_id),
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                None => Err(HandlerErr::bad_params(
                    "status must be one of: active, inactive, graduated",
                )),
            },
            "curriculumId" => {
                if value.is_null() {
                    tx.execute(
                        "UPDATE sections SET curriculum_id = NULL WHERE id = ?",
                        [&section_id],
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e))
                } else {
                    match value.as_str() {
                        Some(cid) => match curriculum_exists(&tx, cid) {
                            Ok(true) => tx
                                .execute(
                                    "UPDATE sections SET curriculum_id = ? WHERE id = ?",
                                    (cid, &section_id),
                                )
                                .map(|_| ())
                                .map_err(|e| HandlerErr::db("db_update_failed", e)),
                            Ok(false) => Err(HandlerErr::not_found("curriculum not found")),
                            Err(e) => Err(e),
                        },
                        None => Err(HandlerErr::bad_params("curriculumId must be string or null")),
                    }
                }
            }
            _ => Err(HandlerErr::bad_params(format!("unknown section field: {}", key))),
        };
        if let Err(e) = result {
            let _ = tx.rollback();
            return e.response(&req.id);
        }
    }
    if let Err(e) = tx.execute(
        "UPDATE sections SET last_updated = ? WHERE id = ?",
        (now_rfc3339(), &section_id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let report = state
        .engine
        .pump(conn, vec![ChangeEvent::section(EventKind::Changed, &section_id)]);
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

fn handle_sections_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let section_id = match get_required_str(&req.params, "sectionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match section_exists(conn, &section_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "section not found", None),
        Err(e) => return e.response(&req.id),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    // Roster first (no ON DELETE CASCADE); derived classes fall to the
    // engine's removal path below.
    if let Err(e) = tx.execute(
        "DELETE FROM section_students WHERE section_id = ?",
        [&section_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "section_students" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM sections WHERE id = ?", [&section_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "sections" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let report = state
        .engine
        .pump(conn, vec![ChangeEvent::section(EventKind::Removed, &section_id)]);
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.list" => Some(handle_sections_list(state, req)),
        "sections.create" => Some(handle_sections_create(state, req)),
        "sections.update" => Some(handle_sections_update(state, req)),
        "sections.delete" => Some(handle_sections_delete(state, req)),
        _ => None,
    }
}
