mod test_support;

use serde_json::json;
use test_support::{counters, request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn settled_state_performs_zero_further_writes() {
    let workspace = temp_dir("schoolsync-idem");
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

    let before = counters(&mut stdin, &mut reader, "3");

    // Re-delivering the same change twice must converge to no-ops.
    for i in 0..2 {
        let updated = request_ok(
            &mut stdin,
            &mut reader,
            &format!("touch{}", i),
            "sections.update",
            json!({ "sectionId": section_id, "patch": { "status": "active" } }),
        );
        assert_eq!(
            updated.pointer("/sync/created").and_then(|v| v.as_u64()),
            Some(0)
        );
        assert_eq!(
            updated.pointer("/sync/updated").and_then(|v| v.as_u64()),
            Some(0)
        );
        assert_eq!(
            updated.pointer("/sync/unchanged").and_then(|v| v.as_u64()),
            Some(2)
        );
    }

    // A full repair pass over settled data is also write-free.
    let rebuilt = request_ok(&mut stdin, &mut reader, "4", "sync.rebuild", json!({}));
    assert_eq!(
        rebuilt.pointer("/report/created").and_then(|v| v.as_u64()),
        Some(0)
    );
    assert_eq!(
        rebuilt.pointer("/report/updated").and_then(|v| v.as_u64()),
        Some(0)
    );
    assert_eq!(
        rebuilt.pointer("/report/deleted").and_then(|v| v.as_u64()),
        Some(0)
    );

    let after = counters(&mut stdin, &mut reader, "5");
    let writes = |c: &serde_json::Value| c.get("classWrites").and_then(|v| v.as_u64()).unwrap();
    let deletes = |c: &serde_json::Value| c.get("classDeletes").and_then(|v| v.as_u64()).unwrap();
    let patches = |c: &serde_json::Value| c.get("rosterPatches").and_then(|v| v.as_u64()).unwrap();
    assert_eq!(writes(&after), writes(&before));
    assert_eq!(deletes(&after), deletes(&before));
    assert_eq!(patches(&after), patches(&before));
}
