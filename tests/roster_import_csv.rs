mod test_support;

use serde_json::json;
use test_support::{request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn csv_import_tolerates_headers_quotes_and_bad_lines() {
    let workspace = temp_dir("schoolsync-csv");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let (section_id, _) = seed_stem_fixture(&mut stdin, &mut reader, true);

    let csv = "name,lrn\n\
               \"Reyes, Ana\",108012340001,S001\n\
               Cruz Ben,108012340002,S002\n\
               \n\
               only-one-column\n\
               \"Diaz, Carla\",108012340003,S001\n";
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.importCsv",
        json!({ "sectionId": section_id, "csv": csv }),
    );
    assert_eq!(imported.get("imported").and_then(|v| v.as_u64()), Some(2));
    let warnings = imported
        .get("warnings")
        .and_then(|v| v.as_array())
        .expect("warnings");
    assert_eq!(warnings.len(), 2);
    assert_eq!(
        warnings[0].get("code").and_then(|v| v.as_str()),
        Some("bad_columns")
    );
    assert_eq!(
        warnings[1].get("code").and_then(|v| v.as_str()),
        Some("duplicate_student")
    );

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "roster.list",
        json!({ "sectionId": section_id }),
    );
    assert_eq!(roster.get("count").and_then(|v| v.as_u64()), Some(2));

    // The mirror settles in the same call.
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.get",
        json!({ "classKey": format!("{}_MATH101", section_id) }),
    );
    assert_eq!(
        got.pointer("/class/studentCount").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert_eq!(
        got.pointer("/class/students/S001/name").and_then(|v| v.as_str()),
        Some("Reyes, Ana")
    );
}
