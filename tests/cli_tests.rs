//! Integration tests for the taskdesk CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to get a taskdesk command
fn taskdesk() -> Command {
    Command::cargo_bin("taskdesk").unwrap()
}

/// Helper to create a test workspace in a temp directory
fn setup_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    taskdesk()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success();
    tmp
}

/// Run a command expected to succeed and capture its trimmed stdout
fn capture(tmp: &TempDir, args: &[&str]) -> String {
    let output = taskdesk()
        .current_dir(tmp.path())
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "command {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Helper to create a task and return its full id (quiet mode prints
/// the bare id)
fn create_task(tmp: &TempDir) -> String {
    capture(tmp, &["task", "new", "acme", "onboarding", "-q"])
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    taskdesk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("task store"));
}

#[test]
fn test_version_displays() {
    taskdesk()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("taskdesk"));
}

#[test]
fn test_unknown_command_fails() {
    taskdesk()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_outside_workspace_fails() {
    let tmp = TempDir::new().unwrap();
    taskdesk()
        .current_dir(tmp.path())
        .args(["task", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not inside"));
}

// ============================================================================
// Init Command Tests
// ============================================================================

#[test]
fn test_init_creates_workspace() {
    let tmp = TempDir::new().unwrap();

    taskdesk()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    assert!(tmp.path().join(".taskdesk").is_dir());
    assert!(tmp.path().join(".taskdesk/config.yaml").is_file());
    assert!(tmp.path().join(".taskdesk/taskdesk.db").is_file());
}

#[test]
fn test_init_twice_warns_without_failing() {
    let tmp = setup_workspace();

    taskdesk()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_init_force_reinitializes() {
    let tmp = setup_workspace();

    taskdesk()
        .current_dir(tmp.path())
        .args(["init", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));
}

// ============================================================================
// Task / Type / Source Command Tests
// ============================================================================

#[test]
fn test_task_new_and_list() {
    let tmp = setup_workspace();
    let id = create_task(&tmp);
    assert!(id.starts_with("TASK-"), "unexpected id: {id}");

    taskdesk()
        .current_dir(tmp.path())
        .args(["task", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("onboarding"))
        .stdout(predicate::str::contains("acme"));

    // Id format pipes cleanly
    let ids = capture(&tmp, &["task", "list", "-f", "id"]);
    assert_eq!(ids, id);
}

#[test]
fn test_task_show_defaults_to_yaml() {
    let tmp = setup_workspace();
    let id = create_task(&tmp);

    taskdesk()
        .current_dir(tmp.path())
        .args(["task", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("tenant: acme"))
        .stdout(predicate::str::contains("name: onboarding"));
}

#[test]
fn test_type_duplicate_name_fails() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["type", "new", &task, "bug", "-q"]);

    taskdesk()
        .current_dir(tmp.path())
        .args(["type", "new", &task, "bug"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_type_and_source_placement() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);

    let type_id = capture(&tmp, &["type", "new", &task, "bug", "-q"]);
    assert!(type_id.starts_with("TYPE-"));
    let source_id = capture(&tmp, &["source", "new", &task, "email", "-q"]);
    assert!(source_id.starts_with("SRC-"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["type", "list", &task])
        .assert()
        .success()
        .stdout(predicate::str::contains("bug"));

    // Instances can point at both placement targets
    taskdesk()
        .current_dir(tmp.path())
        .args([
            "instance", "new", &task, "--type", &type_id, "--source", &source_id,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created instance"));
}

#[test]
fn test_placement_rejects_foreign_type() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    let other = capture(&tmp, &["task", "new", "acme", "other", "-q"]);
    let foreign_type = capture(&tmp, &["type", "new", &other, "bug", "-q"]);

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "new", &task, "--type", &foreign_type])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not belong"));
}

// ============================================================================
// Property Command Tests
// ============================================================================

#[test]
fn test_prop_new_and_list() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);

    let prop = capture(
        &tmp,
        &[
            "prop", "new", &task, "priority", "--kind", "integer", "--required", "-q",
        ],
    );
    assert!(prop.starts_with("PROP-"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["prop", "list", &task])
        .assert()
        .success()
        .stdout(predicate::str::contains("priority"))
        .stdout(predicate::str::contains("integer"))
        .stdout(predicate::str::contains("required"));
}

#[test]
fn test_prop_duplicate_name_fails() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);

    // Same name in a different case still collides
    taskdesk()
        .current_dir(tmp.path())
        .args(["prop", "new", &task, "Status", "--kind", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_prop_retype_migrates_values() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    let prop = capture(&tmp, &["prop", "new", &task, "score", "--kind", "text", "-q"]);
    let inst = capture(
        &tmp,
        &["instance", "new", &task, "--set", "score=42", "-q"],
    );

    taskdesk()
        .current_dir(tmp.path())
        .args(["prop", "retype", &task, &prop, "integer"])
        .assert()
        .success()
        .stdout(predicate::str::contains("text -> integer"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "show", &task, &inst])
        .assert()
        .success()
        .stdout(predicate::str::contains("score: 42"));
}

#[test]
fn test_prop_rm_refuses_index_member_without_force() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    let prop = capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);
    capture(
        &tmp,
        &["index", "new", &task, "by-status", "--prop", "status", "-q"],
    );

    taskdesk()
        .current_dir(tmp.path())
        .args(["prop", "rm", &task, &prop])
        .assert()
        .failure()
        .stderr(predicate::str::contains("member of"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["prop", "rm", &task, &prop, "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted property"));

    // The lone-member index went with it
    taskdesk()
        .current_dir(tmp.path())
        .args(["index", "list", &task])
        .assert()
        .success()
        .stdout(predicate::str::contains("No indexes found"));
}

// ============================================================================
// Instance Command Tests
// ============================================================================

#[test]
fn test_instance_lifecycle() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);

    let inst = capture(
        &tmp,
        &["instance", "new", &task, "--set", "status=open", "-q"],
    );
    assert!(inst.starts_with("INST-"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "show", &task, &inst])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: open"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "patch", &task, &inst, "--set", "status=closed"])
        .assert()
        .success();

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "show", &task, &inst])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: closed"));

    // Soft delete hides it, recover brings it back
    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "rm", &task, &inst])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recycled"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "show", &task, &inst])
        .assert()
        .failure()
        .stderr(predicate::str::contains("soft-deleted"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "recover", &task, &inst])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recovered"));

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "show", &task, &inst])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: closed"));
}

#[test]
fn test_instance_set_rejects_bad_kind() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(
        &tmp,
        &["prop", "new", &task, "priority", "--kind", "integer", "-q"],
    );

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "new", &task, "--set", "priority=high"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an integer"));
}

#[test]
fn test_instance_set_rejects_unknown_property() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "new", &task, "--set", "ghost=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown property"));
}

#[test]
fn test_instance_import_csv() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);
    capture(
        &tmp,
        &["prop", "new", &task, "score", "--kind", "integer", "-q"],
    );

    let csv_path = tmp.path().join("rows.csv");
    fs::write(&csv_path, "status,score\nopen,5\nclosed,9\n").unwrap();

    taskdesk()
        .current_dir(tmp.path())
        .args(["instance", "import", &task, csv_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 instance(s), 0 error(s)"));

    let count = capture(&tmp, &["query", &task, "--count"]);
    assert_eq!(count, "2");
}

#[test]
fn test_instance_import_dry_run_writes_nothing() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);

    let csv_path = tmp.path().join("rows.csv");
    fs::write(&csv_path, "status\nopen\n").unwrap();

    taskdesk()
        .current_dir(tmp.path())
        .args([
            "instance",
            "import",
            &task,
            csv_path.to_str().unwrap(),
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("dry run"));

    let count = capture(&tmp, &["query", &task, "--count"]);
    assert_eq!(count, "0");
}

// ============================================================================
// Query Command Tests
// ============================================================================

#[test]
fn test_query_filters_and_counts() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);

    for status in ["open", "open", "closed"] {
        capture(
            &tmp,
            &[
                "instance",
                "new",
                &task,
                "--set",
                &format!("status={status}"),
                "-q",
            ],
        );
    }

    let count = capture(&tmp, &["query", &task, "-w", "status=eq(open)", "--count"]);
    assert_eq!(count, "2");

    // Substring vs equality
    let count = capture(&tmp, &["query", &task, "-w", "status=o", "--count"]);
    assert_eq!(count, "3");
    let count = capture(&tmp, &["query", &task, "-w", "status=eq(o)", "--count"]);
    assert_eq!(count, "0");

    // The table footer reports page size against the total
    taskdesk()
        .current_dir(tmp.path())
        .args(["query", &task, "-w", "status=eq(open)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 of 2 instance(s)"));
}

#[test]
fn test_query_results_identical_with_and_without_index() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);
    for status in ["open", "closed"] {
        capture(
            &tmp,
            &[
                "instance",
                "new",
                &task,
                "--set",
                &format!("status={status}"),
                "-q",
            ],
        );
    }

    let before = capture(&tmp, &["query", &task, "-w", "status=eq(open)", "-f", "id"]);
    let index = capture(
        &tmp,
        &["index", "new", &task, "by-status", "--prop", "status", "-q"],
    );
    let with_index = capture(&tmp, &["query", &task, "-w", "status=eq(open)", "-f", "id"]);
    assert_eq!(before, with_index);

    capture(&tmp, &["index", "rm", &task, &index, "-q"]);
    let after = capture(&tmp, &["query", &task, "-w", "status=eq(open)", "-f", "id"]);
    assert_eq!(before, after);
}

#[test]
fn test_query_unknown_property_fails() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);

    taskdesk()
        .current_dir(tmp.path())
        .args(["query", &task, "-w", "ghost=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown property"));
}

// ============================================================================
// Index Command Tests
// ============================================================================

#[test]
fn test_index_new_requires_indexable_kind() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "done", "--kind", "boolean", "-q"]);

    taskdesk()
        .current_dir(tmp.path())
        .args(["index", "new", &task, "by-done", "--prop", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot join an index"));
}

#[test]
fn test_index_apply_dry_run_then_apply() {
    let tmp = setup_workspace();
    let task = create_task(&tmp);
    capture(&tmp, &["prop", "new", &task, "status", "--kind", "text", "-q"]);

    let yaml_path = tmp.path().join("indexes.yaml");
    fs::write(&yaml_path, "- name: by-status\n  properties:\n    - status\n").unwrap();

    taskdesk()
        .current_dir(tmp.path())
        .args([
            "index",
            "apply",
            &task,
            "--file",
            yaml_path.to_str().unwrap(),
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("create: by-status"))
        .stdout(predicate::str::contains("No changes made"));

    // Dry run wrote nothing
    taskdesk()
        .current_dir(tmp.path())
        .args(["index", "list", &task])
        .assert()
        .success()
        .stdout(predicate::str::contains("No indexes found"));

    taskdesk()
        .current_dir(tmp.path())
        .args([
            "index",
            "apply",
            &task,
            "--file",
            yaml_path.to_str().unwrap(),
            "--yes",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 created"));

    // Re-applying the same declarations is a no-op
    taskdesk()
        .current_dir(tmp.path())
        .args([
            "index",
            "apply",
            &task,
            "--file",
            yaml_path.to_str().unwrap(),
            "--yes",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to do"));
}

// ============================================================================
// Status / Completions Tests
// ============================================================================

#[test]
fn test_status_dashboard() {
    let tmp = setup_workspace();
    create_task(&tmp);

    taskdesk()
        .current_dir(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("taskdesk Status"))
        .stdout(predicate::str::contains("Tasks:          1"));
}

#[test]
fn test_status_json() {
    let tmp = setup_workspace();

    taskdesk()
        .current_dir(tmp.path())
        .args(["status", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"schema_version\": 1"));
}

#[test]
fn test_completions_generate() {
    taskdesk()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("taskdesk"));
}
