use std::collections::VecDeque;

use rusqlite::Connection;

use crate::feed::{ChangeEvent, EventKind, ListenerKey};
use crate::model::now_rfc3339;
use crate::store;
use crate::sync::{fanout, materializer, roster, SyncEngine, SyncReport};

impl SyncEngine {
    /// Register the three collection listeners plus one roster listener per
    /// known section. Safe to call repeatedly; registration is idempotent.
    pub fn bootstrap(&mut self, conn: &Connection) -> anyhow::Result<()> {
        self.reload_settings(conn)?;
        self.registry.register(ListenerKey::Sections);
        self.registry.register(ListenerKey::Subjects);
        self.registry.register(ListenerKey::Curriculums);
        for sid in store::all_section_ids(conn)? {
            self.registry.register(ListenerKey::Roster(sid));
        }
        tracing::debug!(listeners = self.registry.len(), "sync engine bootstrapped");
        Ok(())
    }

    /// Drain a batch of change events plus everything they cascade into.
    /// Single-threaded: one event is fully handled before the next starts.
    /// Convergence is guaranteed by the no-op write discipline (a settled
    /// state produces no follow-up events); the cap turns a broken cascade
    /// into a reported error instead of a hang.
    pub fn pump(&mut self, conn: &Connection, initial: Vec<ChangeEvent>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut queue: VecDeque<ChangeEvent> = initial.into();
        let mut steps = 0usize;

        while let Some(ev) = queue.pop_front() {
            steps += 1;
            if steps > self.convergence_cap {
                tracing::error!(
                    cap = self.convergence_cap,
                    pending = queue.len() + 1,
                    "sync pump exceeded convergence cap; dropping remaining events"
                );
                report.push_skip(&ev.id, "convergence_cap", "event cascade did not settle");
                self.counters.skips += 1;
                break;
            }

            // An event queued before its listener was deregistered must not
            // apply any write.
            if !self.registry.is_active(&ev.listener) {
                continue;
            }
            self.counters.events_dispatched += 1;

            let mut followups = Vec::new();
            let result = match &ev.listener {
                ListenerKey::Sections => self.on_section_event(conn, &ev, &mut report, &mut followups),
                ListenerKey::Subjects => self.on_subject_event(conn, &ev, &mut report),
                ListenerKey::Curriculums => {
                    self.on_curriculum_event(conn, &ev, &mut report, &mut followups)
                }
                ListenerKey::Roster(section_id) => {
                    let sid = section_id.clone();
                    roster::mirror_roster(conn, &sid, &mut self.counters, &mut report).map(|_| ())
                }
            };
            if let Err(e) = result {
                tracing::warn!(id = %ev.id, "sync pass abandoned: {e:#}");
                report.push_skip(&ev.id, "store_failed", e.to_string());
                self.counters.skips += 1;
            }
            queue.extend(followups);
        }

        self.last_report = Some(report.clone());
        report
    }

    fn on_section_event(
        &mut self,
        conn: &Connection,
        ev: &ChangeEvent,
        report: &mut SyncReport,
        followups: &mut Vec<ChangeEvent>,
    ) -> anyhow::Result<()> {
        match ev.kind {
            EventKind::Added | EventKind::Changed => {
                let Some(section) = store::get_section(conn, &ev.id)? else {
                    // Raced with a delete; treat as removal.
                    return self.drop_section(conn, &ev.id, report);
                };
                if ev.kind == EventKind::Added {
                    self.registry.register(ListenerKey::Roster(section.id.clone()));
                }
                if self.auto_link && section.curriculum_id.is_none() {
                    if let Some(cid) =
                        fanout::matching_curriculum(conn, section.grade_level, &section.strand)?
                    {
                        set_section_curriculum(conn, &section.id, Some(&cid))?;
                        followups.push(ChangeEvent::section(EventKind::Changed, &section.id));
                        return Ok(());
                    }
                }
                self.reconcile_section(conn, &ev.id, report)
            }
            EventKind::Removed => self.drop_section(conn, &ev.id, report),
            EventKind::Value => Ok(()),
        }
    }

    fn on_subject_event(
        &mut self,
        conn: &Connection,
        ev: &ChangeEvent,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        match ev.kind {
            EventKind::Added | EventKind::Changed => {
                for sid in fanout::affected_section_ids_for_subject(conn, &ev.id)? {
                    let section = match store::get_section(conn, &sid) {
                        Ok(Some(s)) => s,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(section = %sid, "skipping section in subject fan-out: {e:#}");
                            report.push_skip(&sid, "store_failed", e.to_string());
                            self.counters.skips += 1;
                            continue;
                        }
                    };
                    if let Err(e) = materializer::materialize(
                        conn,
                        &section,
                        &ev.id,
                        &mut self.counters,
                        report,
                    ) {
                        let key = format!("{}_{}", sid, ev.id);
                        tracing::warn!(class = %key, "materialization abandoned: {e:#}");
                        report.push_skip(&key, "store_failed", e.to_string());
                        self.counters.skips += 1;
                    }
                }
                Ok(())
            }
            EventKind::Removed => {
                for key in fanout::class_keys_for_subject(conn, &ev.id)? {
                    store::delete_class(conn, &key.as_key())?;
                    self.counters.class_deletes += 1;
                    report.deleted += 1;
                }
                Ok(())
            }
            EventKind::Value => Ok(()),
        }
    }

    fn on_curriculum_event(
        &mut self,
        conn: &Connection,
        ev: &ChangeEvent,
        report: &mut SyncReport,
        followups: &mut Vec<ChangeEvent>,
    ) -> anyhow::Result<()> {
        match ev.kind {
            EventKind::Added | EventKind::Changed => {
                let Some(curriculum) = store::get_curriculum(conn, &ev.id)? else {
                    return self.unlink_curriculum(conn, &ev.id, followups);
                };
                for sid in fanout::sections_linked_to_curriculum(conn, &ev.id)? {
                    let Some(section) = store::get_section(conn, &sid)? else {
                        continue;
                    };
                    if section.grade_level != curriculum.grade_level
                        || section.strand != curriculum.strand
                    {
                        // The curriculum was re-targeted away from this
                        // section; the follow-up event empties its classes.
                        set_section_curriculum(conn, &sid, None)?;
                        followups.push(ChangeEvent::section(EventKind::Changed, &sid));
                    } else if let Err(e) = self.reconcile_section(conn, &sid, report) {
                        tracing::warn!(section = %sid, "reconcile abandoned: {e:#}");
                        report.push_skip(&sid, "store_failed", e.to_string());
                        self.counters.skips += 1;
                    }
                }
                if self.auto_link && curriculum.status == crate::model::RecordStatus::Active {
                    for sid in fanout::unlinked_sections_matching(
                        conn,
                        curriculum.grade_level,
                        &curriculum.strand,
                    )? {
                        set_section_curriculum(conn, &sid, Some(&curriculum.id))?;
                        followups.push(ChangeEvent::section(EventKind::Changed, &sid));
                    }
                }
                Ok(())
            }
            EventKind::Removed => self.unlink_curriculum(conn, &ev.id, followups),
            EventKind::Value => Ok(()),
        }
    }

    fn unlink_curriculum(
        &mut self,
        conn: &Connection,
        curriculum_id: &str,
        followups: &mut Vec<ChangeEvent>,
    ) -> anyhow::Result<()> {
        for sid in fanout::sections_linked_to_curriculum(conn, curriculum_id)? {
            set_section_curriculum(conn, &sid, None)?;
            followups.push(ChangeEvent::section(EventKind::Changed, &sid));
        }
        Ok(())
    }

    /// Converge one section: materialize every class its curriculum entails,
    /// then delete derived rows that are no longer entailed.
    pub(crate) fn reconcile_section(
        &mut self,
        conn: &Connection,
        section_id: &str,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        let Some(section) = store::get_section(conn, section_id)? else {
            return self.drop_section(conn, section_id, report);
        };

        let expected = match section.curriculum_id.as_deref() {
            Some(cid) => {
                if store::get_curriculum(conn, cid)?.is_none() {
                    report.push_skip(
                        section_id,
                        "missing_curriculum",
                        format!("section references unknown curriculum {}", cid),
                    );
                    self.counters.skips += 1;
                    Vec::new()
                } else {
                    fanout::expected_class_keys(conn, &section)?
                }
            }
            None => Vec::new(),
        };

        for key in &expected {
            if let Err(e) = materializer::materialize(
                conn,
                &section,
                &key.subject_code,
                &mut self.counters,
                report,
            ) {
                tracing::warn!(class = %key.as_key(), "materialization abandoned: {e:#}");
                report.push_skip(&key.as_key(), "store_failed", e.to_string());
                self.counters.skips += 1;
            }
        }

        for existing in store::class_keys_for_section(conn, section_id)? {
            if !expected.iter().any(|k| k.subject_code == existing.subject_code) {
                store::delete_class(conn, &existing.as_key())?;
                self.counters.class_deletes += 1;
                report.deleted += 1;
            }
        }
        Ok(())
    }

    /// Section removal: deregister its roster listener and delete its
    /// derived classes.
    fn drop_section(
        &mut self,
        conn: &Connection,
        section_id: &str,
        report: &mut SyncReport,
    ) -> anyhow::Result<()> {
        self.registry
            .deregister(&ListenerKey::Roster(section_id.to_string()));
        for key in store::class_keys_for_section(conn, section_id)? {
            store::delete_class(conn, &key.as_key())?;
            self.counters.class_deletes += 1;
            report.deleted += 1;
        }
        Ok(())
    }

    /// Full repair pass. Classes are a pure cache, so this is always safe:
    /// orphans are dropped, every expected class is re-materialized, every
    /// roster mirror re-diffed, and listener registrations are trued up.
    pub fn rebuild(&mut self, conn: &Connection) -> anyhow::Result<SyncReport> {
        let mut report = SyncReport::default();

        for key in store::orphan_class_keys(conn)? {
            store::delete_class(conn, &key)?;
            self.counters.class_deletes += 1;
            report.deleted += 1;
        }

        let section_ids = store::all_section_ids(conn)?;
        for sid in &section_ids {
            self.registry.register(ListenerKey::Roster(sid.clone()));
            if let Err(e) = self.reconcile_section(conn, sid, &mut report) {
                tracing::warn!(section = %sid, "rebuild reconcile abandoned: {e:#}");
                report.push_skip(sid, "store_failed", e.to_string());
                self.counters.skips += 1;
            }
            if let Err(e) = roster::mirror_roster(conn, sid, &mut self.counters, &mut report) {
                tracing::warn!(section = %sid, "rebuild roster mirror abandoned: {e:#}");
                report.push_skip(sid, "store_failed", e.to_string());
                self.counters.skips += 1;
            }
        }

        // Roster listeners for sections that no longer exist are leaks.
        for sid in self.registry.roster_ids() {
            if !section_ids.contains(&sid) {
                self.registry.deregister(&ListenerKey::Roster(sid));
            }
        }

        self.last_report = Some(report.clone());
        Ok(report)
    }
}

fn set_section_curriculum(
    conn: &Connection,
    section_id: &str,
    curriculum_id: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE sections SET curriculum_id = ?, last_updated = ? WHERE id = ?",
        (curriculum_id, now_rfc3339(), section_id),
    )?;
    Ok(())
}
