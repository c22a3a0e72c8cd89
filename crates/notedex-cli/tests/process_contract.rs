use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::{env, str};

use serde_json::Value;
use tempfile::tempdir;

fn cli_bin_path() -> PathBuf {
    if let Ok(path) = env::var("CARGO_BIN_EXE_notedex") {
        return PathBuf::from(path);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let workspace_root = manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .expect("workspace root");
    let bin_name = if cfg!(windows) {
        "notedex.exe"
    } else {
        "notedex"
    };
    let fallback = workspace_root.join("target").join("debug").join(bin_name);
    assert!(
        fallback.exists(),
        "notedex binary not found at {}",
        fallback.display()
    );
    fallback
}

fn run(root: &Path, args: &[&str]) -> Output {
    Command::new(cli_bin_path())
        .arg("--root")
        .arg(root)
        .args(args)
        .env("NOTEDEX_LOG", "off")
        .output()
        .expect("run notedex")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn init_reports_seeded_system_collections() {
    let root = tempdir().expect("tempdir");
    let payload = stdout_json(&run(root.path(), &["init"]));
    assert_eq!(payload["status"], "ok");
    assert!(payload["default_collection_id"].is_i64());
    assert!(payload["inbox_collection_id"].is_i64());
    assert_ne!(
        payload["default_collection_id"],
        payload["inbox_collection_id"]
    );
}

#[test]
fn add_then_resolve_and_search_round_through_the_process() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path().join("data");
    let note_path = temp.path().join("note.md");
    fs::write(&note_path, "# Field Guide\nBirds and [[Feathers]]. #nature").expect("note");

    let processed = stdout_json(&run(&root, &["add", note_path.to_str().expect("path")]));
    assert_eq!(processed["title"], "Field Guide");
    assert_eq!(processed["outcome"], "created");
    let note_id = processed["note_id"].as_i64().expect("note id");

    let again = stdout_json(&run(&root, &["add", note_path.to_str().expect("path")]));
    assert_eq!(again["outcome"], "unchanged");
    assert_eq!(again["note_id"].as_i64(), Some(note_id));

    let resolved = stdout_json(&run(&root, &["resolve", "FIELD   guide"]));
    assert_eq!(resolved["note_id"].as_i64(), Some(note_id));

    let page = stdout_json(&run(&root, &["search", "birds", "--snippets"]));
    assert_eq!(page["total_count"], 1);
    assert_eq!(page["items"][0]["note_id"].as_i64(), Some(note_id));

    let links = stdout_json(&run(&root, &["note", "links", &note_id.to_string()]));
    assert_eq!(links[0]["target_key"], "feathers");
    assert!(links[0]["target_id"].is_null());

    let tags = stdout_json(&run(&root, &["tags"]));
    assert_eq!(tags[0]["tag"], "nature");
}

#[test]
fn deleting_a_system_collection_fails_with_error_payload() {
    let root = tempdir().expect("tempdir");
    let init = stdout_json(&run(root.path(), &["init"]));
    let inbox = init["inbox_collection_id"].as_i64().expect("inbox id");

    let output = run(root.path(), &["collection", "rm", &inbox.to_string()]);
    assert!(
        !output.status.success(),
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    let payload: Value = serde_json::from_slice(&output.stderr).expect("stderr is JSON");
    assert_eq!(payload["code"], "PERMISSION_DENIED");
    assert_eq!(payload["operation"], "collection.delete");
}

#[test]
fn collection_rename_is_visible_through_path_lookup() {
    let root = tempdir().expect("tempdir");
    let work = stdout_json(&run(root.path(), &["collection", "create", "Work"]));
    let work_id = work["id"].as_i64().expect("work id").to_string();
    let alpha = stdout_json(&run(
        root.path(),
        &["collection", "create", "Alpha", "--parent", &work_id],
    ));
    assert_eq!(alpha["path"], "work/alpha");

    let renamed = stdout_json(&run(
        root.path(),
        &["collection", "update", &work_id, "--name", "Projects"],
    ));
    assert_eq!(renamed["path"], "projects");

    let found = stdout_json(&run(root.path(), &["collection", "path", "projects/alpha"]));
    assert_eq!(found["id"], alpha["id"]);

    let missing = run(root.path(), &["collection", "path", "work/alpha"]);
    assert!(!missing.status.success());
    let stderr = str::from_utf8(&missing.stderr).expect("utf8 stderr");
    assert!(stderr.contains("NOT_FOUND"), "stderr: {stderr}");
}

#[test]
fn invalid_page_token_is_a_validation_failure() {
    let root = tempdir().expect("tempdir");
    let output = run(root.path(), &["collection", "ls", "--page-token", "%%%"]);
    assert!(!output.status.success());
    let payload: Value = serde_json::from_slice(&output.stderr).expect("stderr is JSON");
    assert_eq!(payload["code"], "VALIDATION_FAILED");
}
