use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_sync_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, state.engine.status_json())
}

fn handle_sync_rebuild(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match state.engine.rebuild(conn) {
        Ok(report) => ok(&req.id, json!({ "report": report })),
        Err(e) => err(&req.id, "sync_rebuild_failed", format!("{e:#}"), None),
    }
}

fn handle_sync_cleanup(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.engine.cleanup();
    ok(&req.id, state.engine.status_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sync.status" => Some(handle_sync_status(state, req)),
        "sync.rebuild" => Some(handle_sync_rebuild(state, req)),
        "sync.cleanup" => Some(handle_sync_cleanup(state, req)),
        _ => None,
    }
}
