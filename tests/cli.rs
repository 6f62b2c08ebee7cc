use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn nsync_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("nsync");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/nsync.sqlite"

[client]
transport = "local"
pointer_path = "{root}/data/pointers.json"

[sync]
debounce_ms = 50
"#,
        root = root.display()
    );

    let config_path = config_dir.join("nsync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_nsync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = nsync_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run nsync binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_nsync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_nsync(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_note_create_show_rename() {
    let (_tmp, config_path) = setup_test_env();
    run_nsync(&config_path, &["init"]);

    let (stdout, stderr, success) = run_nsync(&config_path, &["note", "create", "Groceries"]);
    assert!(success, "create failed: {}", stderr);
    assert!(stdout.contains("Created note 1"), "got: {}", stdout);

    let (stdout, _, success) = run_nsync(&config_path, &["note", "rename", "1", "Errands"]);
    assert!(success);
    assert!(stdout.contains("Errands"));

    let (stdout, _, success) = run_nsync(&config_path, &["note", "show", "1"]);
    assert!(success);
    assert!(stdout.contains("title:   Errands"), "got: {}", stdout);
}

#[test]
fn test_show_unknown_note_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_nsync(&config_path, &["init"]);

    let (_, stderr, success) = run_nsync(&config_path, &["note", "show", "99"]);
    assert!(!success);
    assert!(stderr.contains("404"), "got: {}", stderr);
}

#[test]
fn test_consecutive_saves_update_one_fragment() {
    let (tmp, config_path) = setup_test_env();
    run_nsync(&config_path, &["init"]);
    run_nsync(&config_path, &["note", "create", "Draft"]);

    let draft = tmp.path().join("draft.html");
    fs::write(&draft, r#"<p data-id="a1">first</p>"#).unwrap();
    let (first, stderr, success) =
        run_nsync(&config_path, &["save", "1", "--file", draft.to_str().unwrap()]);
    assert!(success, "save failed: {}", stderr);
    assert!(first.starts_with("Saved fragment "));

    fs::write(&draft, r#"<p data-id="a2">second</p>"#).unwrap();
    let (second, _, success) =
        run_nsync(&config_path, &["save", "1", "--file", draft.to_str().unwrap()]);
    assert!(success);
    assert_eq!(first, second, "second save should update the same fragment");

    let (stdout, _, success) = run_nsync(&config_path, &["open", "1"]);
    assert!(success);
    assert_eq!(stdout.trim(), "<p>second</p>");

    let pointers = fs::read_to_string(tmp.path().join("data/pointers.json")).unwrap();
    assert!(pointers.contains("lastBlockId-1"));
}

#[test]
fn test_open_by_slug_with_seed_content() {
    let (tmp, config_path) = setup_test_env();
    run_nsync(&config_path, &["init"]);

    let seed = tmp.path().join("seed.html");
    fs::write(&seed, "<p>seeded</p>").unwrap();
    let (stdout, _, success) = run_nsync(
        &config_path,
        &["note", "create", "Seeded", "--file", seed.to_str().unwrap()],
    );
    assert!(success);
    let slug = stdout
        .trim()
        .rsplit('(')
        .next()
        .unwrap()
        .trim_end_matches(')')
        .to_string();

    let (stdout, _, success) = run_nsync(&config_path, &["open", &slug]);
    assert!(success);
    assert_eq!(stdout.trim(), "<p>seeded</p>");
}

#[test]
fn test_open_empty_note() {
    let (_tmp, config_path) = setup_test_env();
    run_nsync(&config_path, &["init"]);
    run_nsync(&config_path, &["note", "create", "Blank"]);

    let (stdout, stderr, success) = run_nsync(&config_path, &["open", "1"]);
    assert!(success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("no saved content"));
}
