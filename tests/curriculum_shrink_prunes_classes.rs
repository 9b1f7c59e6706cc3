mod test_support;

use serde_json::json;
use test_support::{class_keys, counters, request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn dropping_a_subject_deletes_its_class_without_touching_siblings() {
    let workspace = temp_dir("schoolsync-shrink");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (section_id, curriculum_id) = seed_stem_fixture(&mut stdin, &mut reader, true);
    assert_eq!(class_keys(&mut stdin, &mut reader, "2").len(), 2);

    let math_key = format!("{}_MATH101", section_id);
    let before = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.get",
        json!({ "classKey": math_key }),
    );
    let last_updated_before = before
        .pointer("/class/lastUpdated")
        .and_then(|v| v.as_str())
        .expect("lastUpdated")
        .to_string();
    let counters_before = counters(&mut stdin, &mut reader, "4");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "curriculums.update",
        json!({ "curriculumId": curriculum_id, "patch": { "subjects": ["MATH101"] } }),
    );

    let keys = class_keys(&mut stdin, &mut reader, "6");
    assert_eq!(keys, vec![math_key.clone()]);

    // The surviving class saw no spurious write.
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.get",
        json!({ "classKey": math_key }),
    );
    assert_eq!(
        after.pointer("/class/lastUpdated").and_then(|v| v.as_str()),
        Some(last_updated_before.as_str())
    );

    let counters_after = counters(&mut stdin, &mut reader, "8");
    let writes = |c: &serde_json::Value| c.get("classWrites").and_then(|v| v.as_u64()).unwrap();
    let deletes = |c: &serde_json::Value| c.get("classDeletes").and_then(|v| v.as_u64()).unwrap();
    assert_eq!(writes(&counters_after), writes(&counters_before));
    assert_eq!(deletes(&counters_after), deletes(&counters_before) + 1);
}
