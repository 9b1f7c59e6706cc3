use rusqlite::OptionalExtension;
use serde_json::json;

use crate::feed::{ChangeEvent, EventKind};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::helpers::{get_optional_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::RecordStatus;
use crate::store;

const SUBJECT_TYPES: [&str; 3] = ["core", "applied", "specialized"];

fn validate_code(code: &str) -> Result<(), HandlerErr> {
    if code.len() > 32 {
        return Err(HandlerErr::bad_params("code must be at most 32 characters"));
    }
    if code.chars().any(|c| c.is_whitespace()) {
        return Err(HandlerErr::bad_params("code must not contain whitespace"));
    }
    Ok(())
}

fn validate_type(kind: &str) -> Result<(), HandlerErr> {
    if !SUBJECT_TYPES.contains(&kind) {
        return Err(HandlerErr::bad_params(
            "type must be one of: core, applied, specialized",
        ));
    }
    Ok(())
}

fn subject_exists(conn: &rusqlite::Connection, code: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM subjects WHERE code = ?", [code], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    match store::list_subjects(conn) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let code = match get_required_str(&req.params, "code") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = validate_code(&code) {
        return e.response(&req.id);
    }
    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let kind = match get_required_str(&req.params, "type") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = validate_type(&kind) {
        return e.response(&req.id);
    }
    let status_raw = match get_required_str(&req.params, "status") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(status) = RecordStatus::parse(&status_raw) else {
        return err(&req.id, "bad_params", "status must be one of: active, inactive", None);
    };
    let teacher_id = match get_optional_str(&req.params, "teacherId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let room_number = match get_optional_str(&req.params, "roomNumber") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match subject_exists(conn, &code) {
        Ok(false) => {}
        Ok(true) => return err(&req.id, "duplicate_subject", "subject code already exists", None),
        Err(e) => return e.response(&req.id),
    }

    if let Err(e) = conn.execute(
        "INSERT INTO subjects(code, name, type, teacher_id, room_number, status)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &code,
            &name,
            &kind,
            teacher_id.as_deref(),
            room_number.as_deref(),
            status.as_str(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }

    let report = state
        .engine
        .pump(conn, vec![ChangeEvent::subject(EventKind::Added, &code)]);
    ok(&req.id, json!({ "code": code, "sync": report }))
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match get_required_str(&req.params, "code") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match subject_exists(conn, &code) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "subject not found", None),
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
            "name" => match value.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => tx
                    .execute("UPDATE subjects SET name = ? WHERE code = ?", (s, &code))
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                _ => Err(HandlerErr::bad_params("name must be a non-empty string")),
            },
            "type" => match value.as_str().map(str::trim) {
                Some(s) => match validate_type(s) {
                    Ok(()) => tx
                        .execute("UPDATE subjects SET type = ? WHERE code = ?", (s, &code))
                        .map(|_| ())
                        .map_err(|e| HandlerErr::db("db_update_failed", e)),
                    Err(e) => Err(e),
                },
                None => Err(HandlerErr::bad_params("type must be a string")),
            },
            "teacherId" | "roomNumber" => {
                let column = if key == "teacherId" {
                    "teacher_id"
                } else {
                    "room_number"
                };
                if value.is_null() {
                    tx.execute(
                        &format!("UPDATE subjects SET {} = NULL WHERE code = ?", column),
                        [&code],
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e))
                } else {
                    match value.as_str().map(str::trim) {
                        Some(s) if !s.is_empty() => tx
                            .execute(
                                &format!("UPDATE subjects SET {} = ? WHERE code = ?", column),
                                (s, &code),
                            )
                            .map(|_| ())
                            .map_err(|e| HandlerErr::db("db_update_failed", e)),
                        _ => Err(HandlerErr::bad_params(format!(
                            "{} must be a non-empty string or null",
                            key
                        ))),
                    }
                }
            }
            "status" => match value.as_str().and_then(RecordStatus::parse) {
                Some(s) => tx
                    .execute(
                        "UPDATE subjects SET status = ? WHERE code = ?",
                        (s.as_str(), &code),
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                None => Err(HandlerErr::bad_params("status must be one of: active, inactive")),
            },
            _ => Err(HandlerErr::bad_params(format!("unknown subject field: {}", key))),
        };
        if let Err(e) = result {
            let _ = tx.rollback();
            return e.response(&req.id);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let report = state
        .engine
        .pump(conn, vec![ChangeEvent::subject(EventKind::Changed, &code)]);
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let code = match get_required_str(&req.params, "code") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match subject_exists(conn, &code) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "subject not found", None),
        Err(e) => return e.response(&req.id),
    }

    if let Err(e) = conn.execute("DELETE FROM subjects WHERE code = ?", [&code]) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }

    let report = state
        .engine
        .pump(conn, vec![ChangeEvent::subject(EventKind::Removed, &code)]);
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
