mod test_support;

use serde_json::json;
use test_support::{class_keys, request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn after_cleanup_events_are_inert_until_the_next_bootstrap() {
    let workspace = temp_dir("schoolsync-cleanup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (_section_id, _) = seed_stem_fixture(&mut stdin, &mut reader, true);
    assert_eq!(class_keys(&mut stdin, &mut reader, "2").len(), 2);

    let status = request_ok(&mut stdin, &mut reader, "3", "sync.cleanup", json!({}));
    assert_eq!(
        status.pointer("/listeners/total").and_then(|v| v.as_u64()),
        Some(0)
    );

    // With no listeners, this write produces no derived data.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "sections.create",
        json!({
            "gradeLevel": 11,
            "strand": "STEM",
            "sectionNumber": 2,
            "status": "active",
        }),
    );
    let sec2 = created
        .get("sectionId")
        .and_then(|v| v.as_str())
        .expect("sectionId")
        .to_string();
    assert_eq!(
        created.pointer("/sync/created").and_then(|v| v.as_u64()),
        Some(0)
    );
    assert_eq!(class_keys(&mut stdin, &mut reader, "5").len(), 2);

    // Re-selecting the workspace bootstraps the listener set again. The
    // second section was created while the feed was down, so it is still
    // unlinked; the next event that reaches it links it.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let status = request_ok(&mut stdin, &mut reader, "7", "sync.status", json!({}));
    assert_eq!(
        status.pointer("/listeners/collections").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(
        status.pointer("/listeners/rosters").and_then(|v| v.as_u64()),
        Some(2)
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "sections.update",
        json!({ "sectionId": sec2, "patch": { "status": "active" } }),
    );
    assert_eq!(
        updated.pointer("/sync/created").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(class_keys(&mut stdin, &mut reader, "9").len(), 4);
}
