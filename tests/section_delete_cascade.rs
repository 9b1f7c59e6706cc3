mod test_support;

use serde_json::json;
use test_support::{class_keys, request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn deleting_a_section_removes_classes_and_its_roster_listener() {
    let workspace = temp_dir("schoolsync-cascade");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (section_id, _) = seed_stem_fixture(&mut stdin, &mut reader, true);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.add",
        json!({ "sectionId": section_id, "name": "Reyes, Ana", "lrn": "108012340001" }),
    );

    let status = request_ok(&mut stdin, &mut reader, "3", "sync.status", json!({}));
    assert_eq!(
        status.pointer("/listeners/collections").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(
        status.pointer("/listeners/rosters").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(class_keys(&mut stdin, &mut reader, "4").len(), 2);

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sections.delete",
        json!({ "sectionId": section_id }),
    );
    assert_eq!(
        deleted.pointer("/sync/deleted").and_then(|v| v.as_u64()),
        Some(2)
    );

    // Registry back to the collection-listener baseline; no orphans.
    assert!(class_keys(&mut stdin, &mut reader, "6").is_empty());
    let status = request_ok(&mut stdin, &mut reader, "7", "sync.status", json!({}));
    assert_eq!(
        status.pointer("/listeners/rosters").and_then(|v| v.as_u64()),
        Some(0)
    );
    assert_eq!(
        status.pointer("/listeners/total").and_then(|v| v.as_u64()),
        Some(3)
    );
}
