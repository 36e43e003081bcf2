use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn threadvec_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("threadvec");
    path
}

const ITEMS: &str = r#"{"id": "m1", "title": "Budget review", "body": "Please review the quarterly budget numbers.", "created_at": "2024-03-01T09:00:00Z", "tags": ["gmail:inbox"], "metadata": {"thread_id": "T1", "from": "alice@example.com", "to": "bob@example.com"}}
{"id": "m2", "title": "Re: Budget review", "body": "Looks good to me.\n\nOn Fri, Mar 1, 2024 Alice wrote:\n> Please review the quarterly budget numbers.", "created_at": "2024-03-01T10:30:00Z", "tags": ["gmail:inbox"], "metadata": {"thread_id": "T1", "from": "bob@example.com", "to": "alice@example.com"}}
{"id": "m3", "title": "Team offsite", "body": "Photos from the beach offsite are uploaded.", "created_at": "2024-03-02T12:00:00Z", "tags": ["gmail:inbox"], "metadata": {"thread_id": "T2", "from": "carol@example.com"}}
{"id": "e1", "title": "Budget planning", "body": "Quarterly budget planning session.", "created_at": "2024-03-04T15:00:00Z", "tags": ["calendar:work"], "metadata": {"organizer": "alice@example.com", "attendees": ["bob@example.com"], "location": "Room 4"}}
"#;

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let items_path = root.join("items.jsonl");
    fs::write(&items_path, ITEMS).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/threadvec.sqlite"

[embedding]
provider = "hash"
dims = 1024

[retrieval]
final_limit = 5
"#,
        root.display()
    );

    let config_path = config_dir.join("threadvec.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, items_path)
}

fn run_threadvec(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = threadvec_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run threadvec binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_threadvec(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, again) = run_threadvec(&config_path, &["init"]);
    assert!(again, "Second init failed (not idempotent)");
}

#[test]
fn test_index_reports_per_source() {
    let (_tmp, config_path, items_path) = setup_test_env();

    let (stdout, stderr, success) = run_threadvec(
        &config_path,
        &["index", items_path.to_str().unwrap(), "--progress", "off"],
    );
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("index calendar: 1 groups, 1 indexed, 0 skipped, 0 failed"));
    assert!(stdout.contains("index gmail: 2 groups, 2 indexed, 0 skipped, 0 failed"));
}

#[test]
fn test_index_twice_skips() {
    let (_tmp, config_path, items_path) = setup_test_env();
    let file = items_path.to_str().unwrap();

    run_threadvec(&config_path, &["index", file, "--progress", "off"]);
    let (stdout, _, success) = run_threadvec(&config_path, &["index", file, "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("index gmail: 2 groups, 0 indexed, 2 skipped, 0 failed"));

    let (stdout, _, success) =
        run_threadvec(&config_path, &["index", file, "--progress", "off", "--reindex"]);
    assert!(success);
    assert!(stdout.contains("index gmail: 2 groups, 2 indexed, 0 skipped, 0 failed"));

    let (stdout, _, _) = run_threadvec(&config_path, &["stats", "--json"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["total_documents"], 3);
}

#[test]
fn test_index_explicit_source() {
    let (_tmp, config_path, items_path) = setup_test_env();

    let (stdout, _, success) = run_threadvec(
        &config_path,
        &["index", items_path.to_str().unwrap(), "--source", "archive", "--progress", "off"],
    );
    assert!(success);
    assert!(stdout.contains("index archive: 3 groups, 3 indexed"));
}

#[test]
fn test_search_json_and_filters() {
    let (_tmp, config_path, items_path) = setup_test_env();
    run_threadvec(
        &config_path,
        &["index", items_path.to_str().unwrap(), "--progress", "off"],
    );

    let (stdout, stderr, success) =
        run_threadvec(&config_path, &["search", "please review the quarterly budget numbers", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["title"], "Budget review");
    assert_eq!(results[0]["message_count"], 2);

    let (stdout, _, _) = run_threadvec(
        &config_path,
        &["search", "quarterly budget", "--type", "calendar", "--json"],
    );
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["source_name"], "calendar");

    let (stdout, _, _) =
        run_threadvec(&config_path, &["search", "budget", "--limit", "1", "--json"]);
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn test_search_text_output() {
    let (_tmp, config_path, items_path) = setup_test_env();
    run_threadvec(
        &config_path,
        &["index", items_path.to_str().unwrap(), "--progress", "off"],
    );

    let (stdout, _, success) = run_threadvec(&config_path, &["search", "beach offsite photos"]);
    assert!(success);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("gmail / Team offsite"));
}

#[test]
fn test_get_document() {
    let (_tmp, config_path, items_path) = setup_test_env();
    run_threadvec(
        &config_path,
        &["index", items_path.to_str().unwrap(), "--progress", "off"],
    );

    let (stdout, _, _) = run_threadvec(&config_path, &["search", "budget review numbers", "--json"]);
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    let id = results[0]["id"].as_i64().unwrap().to_string();

    let (stdout, stderr, success) = run_threadvec(&config_path, &["get", &id]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("Subject: Budget review"));
    assert!(stdout.contains("Looks good to me."));
    assert!(!stdout.contains("> Please review"));

    let (_, stderr, success) = run_threadvec(&config_path, &["get", "9999"]);
    assert!(!success);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_stats_text() {
    let (_tmp, config_path, items_path) = setup_test_env();
    run_threadvec(
        &config_path,
        &["index", items_path.to_str().unwrap(), "--progress", "off"],
    );

    let (stdout, _, success) = run_threadvec(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("calendar"));
}

#[test]
fn test_index_requires_embeddings() {
    let (tmp, _, items_path) = setup_test_env();
    let config_path = tmp.path().join("config").join("disabled.toml");
    fs::write(
        &config_path,
        format!("[db]\npath = \"{}/data/off.sqlite\"\n", tmp.path().display()),
    )
    .unwrap();

    let (_, stderr, success) =
        run_threadvec(&config_path, &["index", items_path.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("requires embeddings"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_threadvec(Path::new("/nonexistent/threadvec.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
