use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const TEMPLATE_LINE_0: &str = "#### title\n- Usage \n\n```bash\n$  \n```\n\n\
[✏️ Edit](command:mymy.editDocumentation?%7B%22line%22%3A0%7D)\n\
[🗑️ Delete](command:mymy.deleteDocumentation?%7B%22line%22%3A0%7D)\n";

#[allow(deprecated)]
fn mymy(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mymy").expect("binary");
    cmd.current_dir(root)
        .env_remove("MYMY_STORAGE_DIR")
        .env_remove("MYMY_PREVIEW_CHARS")
        .arg("--quiet");
    cmd
}

fn setup_repo() -> TempDir {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("run.sh"),
        "#!/bin/sh\necho hello\nexit 0\n",
    )
    .unwrap();
    temp
}

fn note_file(root: &Path, text: &str) -> std::path::PathBuf {
    let output = mymy(root).args(["fingerprint", text]).output().unwrap();
    let fp = String::from_utf8(output.stdout).unwrap();
    root.join(".mymy").join(fp.trim())
}

#[test]
fn fingerprint_matches_known_vector() {
    let temp = tempdir().unwrap();
    mymy(temp.path())
        .args(["fingerprint", "echo hello"])
        .assert()
        .success()
        .stdout("2e26648e784ec7a0cf4d08534ddda41df35f1a30\n");
}

#[test]
fn create_writes_template_and_keeps_existing_notes() {
    let temp = setup_repo();
    let root = temp.path();
    let note = note_file(root, "echo hello");

    mymy(root)
        .args(["create", "run.sh", "--line", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "2e26648e784ec7a0cf4d08534ddda41df35f1a30",
        ));
    let body = fs::read_to_string(&note).unwrap();
    assert!(body.starts_with("#### title\n- Usage \n"));
    assert!(body.contains("command:mymy.deleteDocumentation?%7B%22line%22%3A1%7D"));

    fs::write(&note, "keep me").unwrap();
    mymy(root)
        .args(["create", "run.sh", "--line", "1"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&note).unwrap(), "keep me");
}

#[test]
fn show_marks_annotated_lines() {
    let temp = setup_repo();
    let root = temp.path();
    fs::create_dir_all(root.join(".mymy")).unwrap();
    fs::write(note_file(root, "echo hello"), "\nSays hello\n").unwrap();

    mymy(root)
        .args(["show", "run.sh"])
        .assert()
        .success()
        .stdout("#!/bin/sh\necho hello 📌 Says hello\nexit 0\n");
}

#[test]
fn hover_switches_between_prompt_and_note() {
    let temp = setup_repo();
    let root = temp.path();

    mymy(root)
        .args(["hover", "run.sh", "--line", "0"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "📌 **Create a note for this line?**",
        ))
        .stdout(predicate::str::contains(
            "command:mymy.createDocumentation?%7B%22line%22%3A0%7D",
        ));

    mymy(root)
        .args(["create", "run.sh", "--line", "0"])
        .assert()
        .success();
    mymy(root)
        .args(["hover", "run.sh", "--line", "0"])
        .assert()
        .success()
        .stdout(format!("{TEMPLATE_LINE_0}\n"));
}

#[test]
fn delete_is_idempotent_and_list_reflects_it() {
    let temp = setup_repo();
    let root = temp.path();

    mymy(root)
        .args(["create", "run.sh", "--line", "2"])
        .assert()
        .success();

    let output = mymy(root).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let listed: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let notes = listed.as_array().expect("array");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["preview"], "#### title");
    assert_eq!(
        notes[0]["fingerprint"].as_str().map(str::len),
        Some(40),
        "fingerprint is 40 hex chars"
    );

    for _ in 0..2 {
        mymy(root)
            .args(["delete", "run.sh", "--line", "2"])
            .assert()
            .success();
    }
    assert!(!note_file(root, "exit 0").exists());

    let output = mymy(root).args(["list", "--json"]).output().unwrap();
    let listed: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(listed, Value::Array(Vec::new()));
}

#[test]
fn list_without_notes_directory_is_empty() {
    let temp = tempdir().unwrap();
    mymy(temp.path()).arg("list").assert().success().stdout("");
}

#[test]
fn run_action_follows_links_from_the_template() {
    let temp = setup_repo();
    let root = temp.path();
    let note = note_file(root, "#!/bin/sh");

    mymy(root)
        .args([
            "run-action",
            "run.sh",
            "command:mymy.createDocumentation?%7B%22line%22%3A0%7D",
        ])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&note).unwrap(), TEMPLATE_LINE_0);

    mymy(root)
        .args([
            "run-action",
            "run.sh",
            "command:mymy.deleteDocumentation?%7B%22line%22%3A0%7D",
        ])
        .assert()
        .success();
    assert!(!note.exists());

    mymy(root)
        .args(["run-action", "run.sh", "command:other.thing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown command"));
}

#[test]
fn out_of_range_line_fails() {
    let temp = setup_repo();
    mymy(temp.path())
        .args(["create", "run.sh", "--line", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 42"));
}

#[test]
fn storage_dir_and_preview_come_from_config() {
    let temp = setup_repo();
    let root = temp.path();
    fs::write(
        root.join("mymy.toml"),
        "storage_dir = \"docs/notes\"\n\n[render]\npreview_chars = 4\n",
    )
    .unwrap();

    mymy(root)
        .args(["create", "run.sh", "--line", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docs/notes"));
    assert!(!root.join(".mymy").exists());

    mymy(root)
        .args(["show", "run.sh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("echo hello 📌 ####…"));

    mymy(root)
        .args(["--storage-dir", "other", "list"])
        .assert()
        .success()
        .stdout("");
}
