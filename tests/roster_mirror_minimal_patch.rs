mod test_support;

use serde_json::json;
use test_support::{request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn roster_changes_patch_the_mirror_and_preserve_collaborator_fields() {
    let workspace = temp_dir("schoolsync-mirror");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (section_id, _) = seed_stem_fixture(&mut stdin, &mut reader, true);
    let math_key = format!("{}_MATH101", section_id);

    for (i, (sid, name)) in [("S001", "Reyes, Ana"), ("S002", "Cruz, Ben")].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{}", i),
            "roster.add",
            json!({
                "sectionId": section_id,
                "studentId": sid,
                "name": name,
                "lrn": format!("10801234000{}", i)
            }),
        );
    }

    // Collaborator modules write their own sub-fields.
    let schedule = json!({ "day": "MWF", "period": 2, "room": "R204" });
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.schedule.set",
        json!({ "classKey": math_key, "schedule": schedule }),
    );
    let assignments = json!([{ "title": "Problem Set 1", "due": "2025-07-04" }]);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.module.set",
        json!({ "classKey": math_key, "module": "assignments", "payload": assignments }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "roster.remove",
        json!({ "sectionId": section_id, "studentId": "S001" }),
    );

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.get",
        json!({ "classKey": math_key }),
    );
    assert_eq!(
        got.pointer("/class/studentCount").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert!(got.pointer("/class/students/S001").is_none());
    assert_eq!(
        got.pointer("/class/students/S002/name").and_then(|v| v.as_str()),
        Some("Cruz, Ben")
    );
    assert_eq!(got.pointer("/class/schedule"), Some(&schedule));
    assert_eq!(got.pointer("/class/assignments"), Some(&assignments));

    // Renames flow through as updates, not delete/re-add.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "roster.update",
        json!({
            "sectionId": section_id,
            "studentId": "S002",
            "patch": { "name": "Cruz, Benjamin" }
        }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.get",
        json!({ "classKey": math_key }),
    );
    assert_eq!(
        got.pointer("/class/students/S002/name").and_then(|v| v.as_str()),
        Some("Cruz, Benjamin")
    );
    assert_eq!(
        got.pointer("/class/studentCount").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(got.pointer("/class/schedule"), Some(&schedule));
}
