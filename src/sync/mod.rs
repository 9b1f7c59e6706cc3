mod fanout;
mod materializer;
mod roster;
mod scheduler;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use crate::db;
use crate::feed::ListenerRegistry;

/// Cumulative write/dispatch counters since workspace open. Tests use the
/// deltas to assert that converged state performs zero further writes.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounters {
    pub events_dispatched: u64,
    pub class_writes: u64,
    pub class_deletes: u64,
    pub roster_patches: u64,
    pub skips: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSkip {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Aggregated result of one pump or rebuild pass. Per-item failures land in
/// `skipped`; they never abort sibling work.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub skipped: Vec<SyncSkip>,
}

impl SyncReport {
    pub fn push_skip(&mut self, key: &str, code: &str, message: impl Into<String>) {
        self.skipped.push(SyncSkip {
            key: key.to_string(),
            code: code.to_string(),
            message: message.into(),
        });
    }
}

pub struct SyncEngine {
    pub(crate) registry: ListenerRegistry,
    pub(crate) counters: SyncCounters,
    pub(crate) last_report: Option<SyncReport>,
    pub(crate) auto_link: bool,
    pub(crate) convergence_cap: usize,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            registry: ListenerRegistry::new(),
            counters: SyncCounters::default(),
            last_report: None,
            auto_link: true,
            convergence_cap: 10_000,
        }
    }

    pub fn reload_settings(&mut self, conn: &Connection) -> anyhow::Result<()> {
        if let Some(saved) = db::settings_get_json(conn, "setup.sync")? {
            if let Some(v) = saved.get("autoLinkCurriculums").and_then(|v| v.as_bool()) {
                self.auto_link = v;
            }
            if let Some(v) = saved.get("convergenceCap").and_then(|v| v.as_i64()) {
                if v > 0 {
                    self.convergence_cap = v as usize;
                }
            }
        }
        Ok(())
    }

    /// Drop every listener. After this, queued or late events are inert
    /// until the next bootstrap.
    pub fn cleanup(&mut self) {
        let dropped = self.registry.len();
        if dropped > 0 {
            tracing::debug!(dropped, "deregistered all sync listeners");
        }
        self.registry.clear();
    }

    pub fn counters(&self) -> &SyncCounters {
        &self.counters
    }

    pub fn status_json(&self) -> serde_json::Value {
        json!({
            "listeners": {
                "collections": self.registry.collection_count(),
                "rosters": self.registry.roster_count(),
                "total": self.registry.len(),
            },
            "autoLinkCurriculums": self.auto_link,
            "counters": serde_json::to_value(&self.counters).unwrap_or(serde_json::Value::Null),
            "lastReport": self
                .last_report
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok())
                .unwrap_or(serde_json::Value::Null),
        })
    }
}
