use assert_cmd::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn has_git() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    assert!(Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap()
        .success());
}

fn init_git_repo(dir: &Path) {
    git(dir, &["init"]);
    git(dir, &["config", "core.autocrlf", "false"]);
    git(dir, &["config", "user.email", "you@example.com"]);
    git(dir, &["config", "user.name", "Your Name"]);
}

fn commit_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.sync_all().unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", &format!("add {name}")]);
}

fn commit_raw(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, bytes) in files {
        fs::write(dir.join(name), bytes).unwrap();
    }
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "raw files"]);
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

const CHANGESETS: &str = r#"[
  {
    "id": "1",
    "author": "author1",
    "timestamp": "2018-07-05T00:00:00Z",
    "file_deltas": [
      {"path": "//p/File1.cs", "added": 1, "deleted": 2, "before_lines": 10, "after_lines": 5},
      {"path": "//p/File2.cs", "added": 1, "deleted": 2, "before_lines": 10, "after_lines": 5}
    ]
  },
  {
    "id": "2",
    "author": "author1",
    "timestamp": "2018-07-05T10:00:00Z",
    "file_deltas": [
      {"path": "//p/File1.cs", "added": 1, "deleted": 2, "before_lines": 10, "after_lines": 5}
    ]
  }
]"#;

#[test]
fn extract_from_git_writes_a_ledger() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    init_git_repo(dir.path());
    commit_file(dir.path(), "lib.rs", "pub fn hi(){}\n");
    commit_file(dir.path(), "lib.rs", "pub fn hi(){}\npub fn bye(){}\n");

    let out = dir.path().join("out/ledger.json");
    Command::cargo_bin("churnmeter")
        .unwrap()
        .current_dir(dir.path())
        .arg("extract")
        .arg("--repo")
        .arg(dir.path())
        .arg("--cache")
        .arg(dir.path().join("cache"))
        .arg("--output-file")
        .arg(&out)
        .assert()
        .success();

    let ledger = read_json(&out);
    let records = ledger.as_array().unwrap();
    assert!(!records.is_empty());
    let total_added: u64 = records
        .iter()
        .filter(|r| r["file_name"] == "lib.rs")
        .map(|r| r["added"].as_u64().unwrap())
        .sum();
    assert_eq!(total_added, 2);
}

fn extract_git(dir: &Path, out: &Path, binary: bool) -> Vec<serde_json::Value> {
    let mut cmd = Command::cargo_bin("churnmeter").unwrap();
    cmd.arg("extract")
        .arg("--repo")
        .arg(dir)
        .arg("--cache")
        .arg(dir.join("cache"))
        .arg("--output-file")
        .arg(out);
    if binary {
        cmd.arg("--binary");
    }
    cmd.assert().success();
    read_json(out).as_array().unwrap().clone()
}

#[test]
fn every_touched_file_counts_as_a_change() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    init_git_repo(dir.path());
    commit_raw(
        dir.path(),
        &[
            ("img.bin", &[0x89u8, 0x50, 0x00, 0x01, 0x02][..]),
            ("latin.txt", &b"caf\xe9\nna\xefve\n"[..]),
            ("empty.txt", &b""[..]),
        ],
    );
    let out = dir.path().join("ledger.json");

    let text_only = extract_git(dir.path(), &out, false);
    let files: Vec<&str> = text_only.iter().map(|r| r["file_name"].as_str().unwrap()).collect();
    assert_eq!(files.len(), 2, "{files:?}");
    let latin = text_only.iter().find(|r| r["file_name"] == "latin.txt").unwrap();
    assert_eq!(latin["added"], 2);
    let empty = text_only.iter().find(|r| r["file_name"] == "empty.txt").unwrap();
    assert_eq!(empty["number_of_changes"], 1);

    // same cache, binary files now requested
    let with_binary = extract_git(dir.path(), &out, true);
    assert_eq!(with_binary.len(), 3);
    let img = with_binary.iter().find(|r| r["file_name"] == "img.bin").unwrap();
    assert_eq!(img["number_of_changes"], 1);
}

#[test]
fn missing_blob_aborts_the_extraction() {
    let dir = tempdir().unwrap();
    if !has_git() {
        return;
    }
    init_git_repo(dir.path());
    commit_file(dir.path(), "lib.rs", "pub fn hi(){}\n");

    let blob = Command::new("git")
        .args(["rev-parse", "HEAD:lib.rs"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    let blob = String::from_utf8(blob.stdout).unwrap().trim().to_string();
    fs::remove_file(dir.path().join(".git/objects").join(&blob[..2]).join(&blob[2..])).unwrap();

    let out = dir.path().join("ledger.json");
    Command::cargo_bin("churnmeter")
        .unwrap()
        .arg("extract")
        .arg("--repo")
        .arg(dir.path())
        .arg("--cache")
        .arg(dir.path().join("cache"))
        .arg("--output-file")
        .arg(&out)
        .assert()
        .failure();
    assert!(!out.exists());
}

#[test]
fn extract_then_measures_from_changeset_json() {
    let dir = tempdir().unwrap();
    let changesets = dir.path().join("changesets.json");
    fs::write(&changesets, CHANGESETS).unwrap();
    let ledger = dir.path().join("ledger.json");

    Command::cargo_bin("churnmeter")
        .unwrap()
        .arg("extract")
        .arg("--changesets")
        .arg(&changesets)
        .arg("--output-file")
        .arg(&ledger)
        .assert()
        .success();

    let records = read_json(&ledger);
    let file1 = records
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["file_name"] == "//p/File1.cs")
        .unwrap()
        .clone();
    assert_eq!(file1["timestamp"], "2018/07/05 00:00:00");
    assert_eq!(file1["added"], 2);
    assert_eq!(file1["number_of_changes"], 2);

    let measures = dir.path().join("measures.json");
    Command::cargo_bin("churnmeter")
        .unwrap()
        .arg("measures")
        .arg("--ledger")
        .arg(&ledger)
        .args(["--from", "2018-07-05", "--to", "2018-07-06"])
        .args(["--metric", "changes=number-of-changes", "--prefix", "//p/"])
        .arg("--output")
        .arg(&measures)
        .assert()
        .success();

    let collection = read_json(&measures);
    let file1 = collection["measures"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["file"] == "File1.cs")
        .unwrap()
        .clone();
    assert_eq!(file1["metric_key"], "changes");
    assert_eq!(file1["value"], 2);
    assert_eq!(collection["metrics"][0]["key"], "changes");
}

#[test]
fn multiple_file_output_splits_by_day() {
    let dir = tempdir().unwrap();
    let changesets = dir.path().join("changesets.json");
    fs::write(&changesets, CHANGESETS).unwrap();

    Command::cargo_bin("churnmeter")
        .unwrap()
        .arg("extract")
        .arg("--changesets")
        .arg(&changesets)
        .arg("--output-file")
        .arg(dir.path().join("ledger.json"))
        .args(["--output-type", "multiple-file"])
        .assert()
        .success();

    assert!(dir.path().join("ledger_2018-07-05.json").exists());
    assert!(!dir.path().join("ledger.json").exists());
}

#[test]
fn bug_database_without_output_file_fails() {
    let dir = tempdir().unwrap();
    let changesets = dir.path().join("changesets.json");
    fs::write(&changesets, CHANGESETS).unwrap();

    let out = Command::cargo_bin("churnmeter")
        .unwrap()
        .arg("extract")
        .arg("--changesets")
        .arg(&changesets)
        .arg("--output-file")
        .arg(dir.path().join("ledger.json"))
        .args(["--bug-database-provider", "json-file"])
        .args(["--bug-database-arg", "bugs.json"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();

    let stderr = String::from_utf8_lossy(&out);
    assert!(stderr.contains("Dll specified without known output file"), "{stderr}");
}

#[test]
fn bug_database_marks_fix_churn() {
    let dir = tempdir().unwrap();
    let changesets = dir.path().join("changesets.json");
    fs::write(&changesets, CHANGESETS).unwrap();
    let bugs = dir.path().join("bugs.json");
    fs::write(
        &bugs,
        r#"[{"changeset_id": "2", "work_item_id": "BUG-7", "closed_date": "2018-07-05T12:00:00Z"}]"#,
    )
    .unwrap();
    let ledger = dir.path().join("ledger.json");

    Command::cargo_bin("churnmeter")
        .unwrap()
        .arg("extract")
        .arg("--changesets")
        .arg(&changesets)
        .arg("--output-file")
        .arg(&ledger)
        .args(["--bug-database-provider", "json-file"])
        .arg("--bug-database-arg")
        .arg(&bugs)
        .arg("--bug-database-output-file")
        .arg(dir.path().join("workitems/bugs.json"))
        .assert()
        .success();

    assert!(dir.path().join("workitems/bugs.json").exists());
    let records = read_json(&ledger);
    let file1 = records
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["file_name"] == "//p/File1.cs")
        .unwrap()
        .clone();
    assert_eq!(file1["number_of_changes_with_fixes"], 1);
    assert_eq!(file1["added_with_fixes"], 1);
}

#[test]
fn measures_requires_a_metric() {
    let dir = tempdir().unwrap();
    let ledger = dir.path().join("ledger.json");
    fs::write(&ledger, "[]").unwrap();

    Command::cargo_bin("churnmeter")
        .unwrap()
        .arg("measures")
        .arg("--ledger")
        .arg(&ledger)
        .args(["--from", "2018-07-05", "--to", "2018-07-06"])
        .arg("--output")
        .arg(dir.path().join("m.json"))
        .assert()
        .failure();
}
