mod test_support;

use serde_json::json;
use test_support::{class_keys, request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn linking_a_curriculum_materializes_exactly_its_classes() {
    let workspace = temp_dir("schoolsync-link");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (section_id, curriculum_id) = seed_stem_fixture(&mut stdin, &mut reader, false);

    for (i, (sid, name, lrn)) in [
        ("S001", "Reyes, Ana", "108012340001"),
        ("S002", "Cruz, Ben", "108012340002"),
    ]
    .iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{}", i),
            "roster.add",
            json!({ "sectionId": section_id, "studentId": sid, "name": name, "lrn": lrn }),
        );
    }

    // Auto-link is off and the section has no curriculum: nothing derived.
    assert!(class_keys(&mut stdin, &mut reader, "2").is_empty());

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sections.update",
        json!({ "sectionId": section_id, "patch": { "curriculumId": curriculum_id } }),
    );
    assert_eq!(
        updated.pointer("/sync/created").and_then(|v| v.as_u64()),
        Some(2)
    );

    let mut keys = class_keys(&mut stdin, &mut reader, "4");
    keys.sort();
    let mut expected = vec![
        format!("{}_ENG101", section_id),
        format!("{}_MATH101", section_id),
    ];
    expected.sort();
    assert_eq!(keys, expected);

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.get",
        json!({ "classKey": format!("{}_MATH101", section_id) }),
    );
    assert_eq!(
        got.pointer("/class/gradeLevel").and_then(|v| v.as_i64()),
        Some(11)
    );
    assert_eq!(
        got.pointer("/class/strand").and_then(|v| v.as_str()),
        Some("STEM")
    );
    assert_eq!(
        got.pointer("/class/status").and_then(|v| v.as_str()),
        Some("active")
    );
    assert_eq!(
        got.pointer("/class/subjectName").and_then(|v| v.as_str()),
        Some("General Mathematics")
    );
    assert_eq!(
        got.pointer("/class/teacher").and_then(|v| v.as_str()),
        Some("T-9")
    );
    assert_eq!(
        got.pointer("/class/roomNumber").and_then(|v| v.as_str()),
        Some("R204")
    );
    assert_eq!(
        got.pointer("/class/studentCount").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert!(got.pointer("/class/schedule").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        got.pointer("/class/students/S001/name").and_then(|v| v.as_str()),
        Some("Reyes, Ana")
    );
    assert_eq!(
        got.pointer("/class/students/S002/lrn").and_then(|v| v.as_str()),
        Some("108012340002")
    );
}
