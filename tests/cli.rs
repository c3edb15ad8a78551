//! Tests for the `bibsync` binary.

mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::*;

fn bibsync(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bibsync"))
        .args(args)
        .current_dir(dir)
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .env_remove("BIBSYNC_REPO")
        .output()
        .expect("failed to run bibsync")
}

#[test]
fn merge_prints_merged_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.bib", BASE);
    write(dir.path(), "local.bib", &with_author("X2"));
    write(dir.path(), "remote.bib", &with_title("New"));

    let out = bibsync(dir.path(), &["merge", "base.bib", "local.bib", "remote.bib"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        with_author("X2").replace("title = {Old}", "title = {New}")
    );
}

#[test]
fn merge_conflict_writes_json_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.bib", BASE);
    write(dir.path(), "local.bib", &with_author("L"));
    write(dir.path(), "remote.bib", &with_author("R"));

    let out = bibsync(
        dir.path(),
        &[
            "merge",
            "base.bib",
            "local.bib",
            "remote.bib",
            "--conflicts-json",
            "conflicts.json",
        ],
    );
    assert!(!out.status.success());
    let json: serde_json::Value = serde_json::from_str(&read(dir.path(), "conflicts.json")).unwrap();
    assert_eq!(json[0]["key"], "a");
    assert_eq!(json[0]["kind"]["type"], "both_modified");
    assert_eq!(json[0]["fields"][0]["field"], "author");
    assert_eq!(json[0]["fields"][0]["local"], "L");
    assert_eq!(json[0]["fields"][0]["remote"], "R");

    let out = bibsync(
        dir.path(),
        &["merge", "base.bib", "local.bib", "remote.bib", "--strategy", "local", "-o", "out.bib"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(dir.path(), "out.bib"), with_author("L"));
}

#[test]
fn merge_rejects_unparsable_input() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.bib", BASE);
    write(dir.path(), "local.bib", "@article{a, title = {open");
    write(dir.path(), "remote.bib", BASE);

    let out = bibsync(dir.path(), &["merge", "base.bib", "local.bib", "remote.bib"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("local.bib"));
}

#[test]
fn sync_from_subdirectory() {
    let fx = setup();
    write(fx.bob(), BIB, &with_title("New"));
    publish(fx.bob(), "retitle b");
    std::fs::create_dir(fx.alice().join("sub")).unwrap();

    let out = bibsync(&fx.alice().join("sub"), &["sync", "../refs.bib"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read(fx.alice(), BIB), with_title("New"));
    assert!(fx.alice().join(".git/bibsync-refs.bib.lock").exists());
}

#[test]
fn sync_conflict_exits_nonzero() {
    let fx = setup();
    write(fx.bob(), BIB, &with_author("R"));
    publish(fx.bob(), "bob");
    write(fx.alice(), BIB, &with_author("L"));
    commit_all(fx.alice(), "alice");

    let out = bibsync(fx.alice(), &["sync", BIB, "--conflicts-json", "c.json"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("resolution abandoned"), "{stderr}");
    assert!(fx.alice().join("c.json").exists());
}

#[test]
fn sync_json_reports_summary() {
    let fx = setup();
    write(fx.alice(), BIB, &with_author("X2"));

    let out = bibsync(fx.alice(), &["sync", BIB, "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["phase"], "done");
    assert_eq!(json["records"], 2);
    assert_eq!(json["commit"], head(fx.alice()));
    assert!(json.get("error").is_none());
}

#[test]
fn sync_json_reports_conflicts_on_failure() {
    let fx = setup();
    write(fx.bob(), BIB, &with_author("R"));
    publish(fx.bob(), "bob");
    write(fx.alice(), BIB, &with_author("L"));
    commit_all(fx.alice(), "alice");

    let out = bibsync(fx.alice(), &["sync", BIB, "--json"]);
    assert!(!out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["phase"], "failed");
    assert_eq!(json["conflicts"][0]["key"], "a");
    assert!(json["error"].as_str().unwrap().contains("resolution abandoned"));
}

#[test]
fn completions_are_generated() {
    let dir = tempfile::tempdir().unwrap();
    let out = bibsync(dir.path(), &["completions", "bash"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("bibsync"));
}
