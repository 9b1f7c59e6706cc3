use serde_json::{json, Map};

use crate::ipc::error::{err, ok};
use crate::ipc::handlers::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::store;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };
    let section_id = req
        .params
        .get("sectionId")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match store::list_classes(conn, section_id) {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let key = match get_required_str(&req.params, "classKey") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let record = match store::get_class(conn, &key) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let roster = match store::class_students(conn, &key) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // The embedded roster is a map keyed by student id, mirroring the
    // section roster shape the portals already consume.
    let mut students = Map::new();
    for entry in roster {
        students.insert(entry.id.clone(), json!({ "name": entry.name, "lrn": entry.lrn }));
    }

    let mut body = serde_json::to_value(&record).unwrap_or(serde_json::Value::Null);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("students".to_string(), serde_json::Value::Object(students));
    }
    ok(&req.id, json!({ "class": body }))
}

// Write path for the scheduling UI. The sync engine never touches this
// column once the class row exists.
fn handle_classes_schedule_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let key = match get_required_str(&req.params, "classKey") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match store::get_class(conn, &key) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let Some(schedule) = req.params.get("schedule") else {
        return err(&req.id, "bad_params", "missing schedule", None);
    };

    let stored: Option<String> = if schedule.is_null() {
        None
    } else {
        match serde_json::to_string(schedule) {
            Ok(s) => Some(s),
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        }
    };
    if let Err(e) = conn.execute(
        "UPDATE classes SET schedule = ? WHERE key = ?",
        (stored, &key),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

// Same ownership rule for the attendance and assignments modules.
fn handle_classes_module_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let key = match get_required_str(&req.params, "classKey") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let module = match get_required_str(&req.params, "module") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let column = match module.as_str() {
        "attendance" => "attendance",
        "assignments" => "assignments",
        _ => {
            return err(
                &req.id,
                "bad_params",
                "module must be one of: attendance, assignments",
                None,
            )
        }
    };
    match store::get_class(conn, &key) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let Some(payload) = req.params.get("payload") else {
        return err(&req.id, "bad_params", "missing payload", None);
    };

    let stored: Option<String> = if payload.is_null() {
        None
    } else {
        match serde_json::to_string(payload) {
            Ok(s) => Some(s),
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        }
    };
    if let Err(e) = conn.execute(
        &format!("UPDATE classes SET {} = ? WHERE key = ?", column),
        (stored, &key),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.schedule.set" => Some(handle_classes_schedule_set(state, req)),
        "classes.module.set" => Some(handle_classes_module_set(state, req)),
        _ => None,
    }
}
