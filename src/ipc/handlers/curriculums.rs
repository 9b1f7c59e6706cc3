use serde_json::json;
use uuid::Uuid;

use crate::feed::{ChangeEvent, EventKind};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::helpers::{
    curriculum_exists, get_required_i64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::RecordStatus;
use crate::store;

fn parse_subject_codes(value: &serde_json::Value) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = value.as_array() else {
        return Err(HandlerErr::bad_params("subjects must be an array of codes"));
    };
    let mut codes: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let Some(code) = item.as_str().map(str::trim) else {
            return Err(HandlerErr::bad_params("subjects must contain strings"));
        };
        if code.is_empty() {
            return Err(HandlerErr::bad_params("subject codes must not be empty"));
        }
        if codes.iter().any(|c| c == code) {
            return Err(HandlerErr::bad_params(format!(
                "duplicate subject code: {}",
                code
            )));
        }
        codes.push(code.to_string());
    }
    Ok(codes)
}

fn replace_subject_list(
    tx: &rusqlite::Transaction,
    curriculum_id: &str,
    codes: &[String],
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "DELETE FROM curriculum_subjects WHERE curriculum_id = ?",
        [curriculum_id],
    )?;
    for (i, code) in codes.iter().enumerate() {
        tx.execute(
            "INSERT INTO curriculum_subjects(curriculum_id, subject_code, sort_order) VALUES(?, ?, ?)",
            (curriculum_id, code, i as i64),
        )?;
    }
    Ok(())
}

fn handle_curriculums_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "curriculums": [] }));
    };

    let heads = conn
        .prepare("SELECT id FROM curriculums ORDER BY grade_level, strand")
        .and_then(|mut stmt| {
            stmt.query_map([], |r| r.get::<_, String>(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });
    let ids = match heads {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match store::get_curriculum(conn, &id) {
            Ok(Some(c)) => out.push(serde_json::to_value(&c).unwrap_or(serde_json::Value::Null)),
            Ok(None) => {}
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, json!({ "curriculums": out }))
}

fn handle_curriculums_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let grade_level = match get_required_i64(&req.params, "gradeLevel", 1, 12) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let strand = match get_required_str(&req.params, "strand") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let status_raw = match get_required_str(&req.params, "status") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(status) = RecordStatus::parse(&status_raw) else {
        return err(&req.id, "bad_params", "status must be one of: active, inactive", None);
    };
    let Some(subjects_value) = req.params.get("subjects") else {
        return err(&req.id, "bad_params", "missing subjects", None);
    };
    let codes = match parse_subject_codes(subjects_value) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Unknown codes are allowed: the subject may be registered later, and
    // the engine reports the gap until then.
    for code in &codes {
        if store::get_subject(conn, code).ok().flatten().is_none() {
            tracing::debug!(code = %code, "curriculum references unregistered subject");
        }
    }

    let curriculum_id = Uuid::new_v4().to_string();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO curriculums(id, grade_level, strand, status) VALUES(?, ?, ?, ?)",
        (&curriculum_id, grade_level, &strand, status.as_str()),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "curriculums" })),
        );
    }
    if let Err(e) = replace_subject_list(&tx, &curriculum_id, &codes) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "curriculum_subjects" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let report = state.engine.pump(
        conn,
        vec![ChangeEvent::curriculum(EventKind::Added, &curriculum_id)],
    );
    ok(
        &req.id,
        json!({ "curriculumId": curriculum_id, "sync": report }),
    )
}

fn handle_curriculums_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let curriculum_id = match get_required_str(&req.params, "curriculumId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match curriculum_exists(conn, &curriculum_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "curriculum not found", None),
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
                    .execute(
                        "UPDATE curriculums SET grade_level = ? WHERE id = ?",
                        (n, &curriculum_id),
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                _ => Err(HandlerErr::bad_params("gradeLevel must be in 1..=12")),
            },
            "strand" => match value.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => tx
                    .execute(
                        "UPDATE curriculums SET strand = ? WHERE id = ?",
                        (s, &curriculum_id),
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                _ => Err(HandlerErr::bad_params("strand must be a non-empty string")),
            },
            "status" => match value.as_str().and_then(RecordStatus::parse) {
                Some(s) => tx
                    .execute(
                        "UPDATE curriculums SET status = ? WHERE id = ?",
                        (s.as_str(), &curriculum_id),
                    )
                    .map(|_| ())
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                None => Err(HandlerErr::bad_params("status must be one of: active, inactive")),
            },
            "subjects" => match parse_subject_codes(value) {
                Ok(codes) => replace_subject_list(&tx, &curriculum_id, &codes)
                    .map_err(|e| HandlerErr::db("db_update_failed", e)),
                Err(e) => Err(e),
            },
            _ => Err(HandlerErr::bad_params(format!(
                "unknown curriculum field: {}",
                key
            ))),
        };
        if let Err(e) = result {
            let _ = tx.rollback();
            return e.response(&req.id);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let report = state.engine.pump(
        conn,
        vec![ChangeEvent::curriculum(EventKind::Changed, &curriculum_id)],
    );
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

fn handle_curriculums_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let curriculum_id = match get_required_str(&req.params, "curriculumId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match curriculum_exists(conn, &curriculum_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "curriculum not found", None),
        Err(e) => return e.response(&req.id),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "DELETE FROM curriculum_subjects WHERE curriculum_id = ?",
        [&curriculum_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute("DELETE FROM curriculums WHERE id = ?", [&curriculum_id]) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let report = state.engine.pump(
        conn,
        vec![ChangeEvent::curriculum(EventKind::Removed, &curriculum_id)],
    );
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculums.list" => Some(handle_curriculums_list(state, req)),
        "curriculums.create" => Some(handle_curriculums_create(state, req)),
        "curriculums.update" => Some(handle_curriculums_update(state, req)),
        "curriculums.delete" => Some(handle_curriculums_delete(state, req)),
        _ => None,
    }
}
