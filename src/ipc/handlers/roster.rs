use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use crate::feed::ChangeEvent;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::helpers::{get_required_str, section_exists, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;

fn student_exists(
    conn: &rusqlite::Connection,
    section_id: &str,
    student_id: &str,
) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM section_students WHERE section_id = ? AND id = ?",
        (section_id, student_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn handle_roster_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match store::roster_for_section(conn, &section_id) {
        Ok(roster) => ok(
            &req.id,
            json!({ "students": roster, "count": roster.len() }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_roster_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let section_id = match get_required_str(&req.params, "sectionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let name = match get_required_str(&req.params, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let lrn = match get_required_str(&req.params, "lrn") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match section_exists(conn, &section_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "section not found", None),
        Err(e) => return e.response(&req.id),
    }

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => Uuid::new_v4().to_string(),
    };
    match student_exists(conn, &section_id, &student_id) {
        Ok(false) => {}
        Ok(true) => return err(&req.id, "duplicate_student", "student id already on roster", None),
        Err(e) => return e.response(&req.id),
    }

    if let Err(e) = conn.execute(
        "INSERT INTO section_students(section_id, id, name, lrn, raw_line) VALUES(?, ?, ?, ?, NULL)",
        (&section_id, &student_id, &name, &lrn),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "section_students" })),
        );
    }

    let report = state.engine.pump(conn, vec![ChangeEvent::roster(&section_id)]);
    ok(&req.id, json!({ "studentId": student_id, "sync": report }))
}

fn handle_roster_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let section_id = match get_required_str(&req.params, "sectionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match student_exists(conn, &section_id, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    for (key, value) in patch {
        let applied = match key.as_str() {
            "name" | "lrn" => match value.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => {
                    let sql = if key == "name" {
                        "UPDATE section_students SET name = ? WHERE section_id = ? AND id = ?"
                    } else {
                        "UPDATE section_students SET lrn = ? WHERE section_id = ? AND id = ?"
                    };
                    conn.execute(sql, (s, &section_id, &student_id))
                        .map_err(|e| HandlerErr::db("db_update_failed", e))
                }
                _ => Err(HandlerErr::bad_params(format!(
                    "{} must be a non-empty string",
                    key
                ))),
            },
            _ => Err(HandlerErr::bad_params(format!("unknown roster field: {}", key))),
        };
        if let Err(e) = applied {
            return e.response(&req.id);
        }
    }

    let report = state.engine.pump(conn, vec![ChangeEvent::roster(&section_id)]);
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

fn handle_roster_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let section_id = match get_required_str(&req.params, "sectionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match student_exists(conn, &section_id, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    if let Err(e) = conn.execute(
        "DELETE FROM section_students WHERE section_id = ? AND id = ?",
        (&section_id, &student_id),
    ) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }

    let report = state.engine.pump(conn, vec![ChangeEvent::roster(&section_id)]);
    ok(&req.id, json!({ "ok": true, "sync": report }))
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

// SIS roster exports: "name,lrn" with an optional header row and optional
// third column carrying the student id.
fn handle_roster_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let section_id = match get_required_str(&req.params, "sectionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let csv = match get_required_str(&req.params, "csv") {
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

    let mut imported = 0usize;
    let mut warnings: Vec<serde_json::Value> = Vec::new();
    for (idx, raw_line) in csv.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = parse_csv_record(line);
        if idx == 0 && fields.first().map(|f| f.trim().eq_ignore_ascii_case("name")) == Some(true) {
            continue;
        }
        if fields.len() < 2 {
            warnings.push(json!({
                "line": idx + 1,
                "code": "bad_columns",
                "message": "expected name,lrn"
            }));
            continue;
        }
        let name = fields[0].trim().to_string();
        let lrn = fields[1].trim().to_string();
        if name.is_empty() || lrn.is_empty() {
            warnings.push(json!({
                "line": idx + 1,
                "code": "bad_columns",
                "message": "name and lrn must not be empty"
            }));
            continue;
        }
        let student_id = fields
            .get(2)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO section_students(section_id, id, name, lrn, raw_line)
             VALUES(?, ?, ?, ?, ?)",
            (&section_id, &student_id, &name, &lrn, raw_line),
        );
        match inserted {
            Ok(1) => imported += 1,
            Ok(_) => warnings.push(json!({
                "line": idx + 1,
                "code": "duplicate_student",
                "message": format!("student {} already on roster", student_id)
            })),
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let report = state.engine.pump(conn, vec![ChangeEvent::roster(&section_id)]);
    ok(
        &req.id,
        json!({ "imported": imported, "warnings": warnings, "sync": report }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.list" => Some(handle_roster_list(state, req)),
        "roster.add" => Some(handle_roster_add(state, req)),
        "roster.update" => Some(handle_roster_update(state, req)),
        "roster.remove" => Some(handle_roster_remove(state, req)),
        "roster.importCsv" => Some(handle_roster_import_csv(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_csv_record;

    #[test]
    fn csv_record_handles_quotes_and_embedded_commas() {
        assert_eq!(
            parse_csv_record("\"Reyes, Ana\",108012345678,S001"),
            vec!["Reyes, Ana", "108012345678", "S001"]
        );
        assert_eq!(
            parse_csv_record("\"He said \"\"hi\"\"\",x"),
            vec!["He said \"hi\"", "x"]
        );
    }
}
