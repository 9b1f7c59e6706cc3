mod test_support;

use serde_json::json;
use test_support::{class_keys, request, request_ok, seed_stem_fixture, spawn_sidecar, temp_dir};

#[test]
fn bundle_export_import_preserves_the_workspace() {
    let workspace = temp_dir("schoolsync-backup-src");
    let restored = temp_dir("schoolsync-backup-dst");
    let bundle = workspace.join("backup.ssbackup.zip");
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
        json!({ "sectionId": section_id, "studentId": "S001", "name": "Reyes, Ana", "lrn": "108012340001" }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle.to_string_lossy()
        }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("schoolsync-workspace-v1")
    );
    let sha = exported
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .expect("dbSha256");
    assert_eq!(sha.len(), 64);

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": restored.to_string_lossy(),
            "inPath": bundle.to_string_lossy()
        }),
    );
    assert_eq!(
        imported.get("checksumVerified").and_then(|v| v.as_bool()),
        Some(true)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": restored.to_string_lossy() }),
    );
    assert_eq!(class_keys(&mut stdin, &mut reader, "6").len(), 2);
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.get",
        json!({ "classKey": format!("{}_MATH101", section_id) }),
    );
    assert_eq!(
        got.pointer("/class/studentCount").and_then(|v| v.as_i64()),
        Some(1)
    );
}

#[test]
fn export_without_a_database_fails_cleanly() {
    let empty = temp_dir("schoolsync-backup-empty");
    let out = empty.join("nothing.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": empty.to_string_lossy(),
            "outPath": out.to_string_lossy()
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("backup_export_failed")
    );
}
