use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Config pointing both backends at a port nothing listens on.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config_content = format!(
        r#"[search]
url = "http://127.0.0.1:{port}"
timeout_secs = 2

[model]
url = "http://127.0.0.1:{port}"
timeout_secs = 2

[logging]
filter = "error"
{extra}
"#
    );
    let config_path = tmp.path().join("rag.toml");
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

fn run_ragd(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_ragd"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("ELASTICSEARCH_URL")
        .env_remove("OLLAMA_HOST")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run ragd");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ragd(&tmp.path().join("nope.toml"), &["seed"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "{}", stderr);
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env("[retrieval]\ntop_k = 0\n");
    let (_, stderr, success) = run_ragd(&config_path, &["context", "list"]);
    assert!(!success);
    assert!(stderr.contains("retrieval.top_k"), "{}", stderr);
}

#[test]
fn test_search_backend_down_reported() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_ragd(&config_path, &["context", "list"]);
    assert!(!success);
    assert!(stderr.contains("search backend unavailable"), "{}", stderr);
}

#[test]
fn test_update_requires_a_field() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_ragd(&config_path, &["context", "update", "abc"]);
    assert!(!success);
    assert!(stderr.contains("Nothing to update"), "{}", stderr);
}

#[test]
fn test_ask_with_backends_down_fails_at_retrieve() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_ragd(&config_path, &["ask", "What is AI?"]);
    assert!(!success);
    assert!(stderr.contains("retrieve stage failed"), "{}", stderr);
}

#[test]
fn test_agent_with_backends_down_fails_at_model() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_ragd(&config_path, &["agent", "What is AI?"]);
    assert!(!success);
    assert!(stderr.contains("agent model call failed"), "{}", stderr);
}

#[test]
fn test_agent_blank_query_rejected() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_ragd(&config_path, &["agent", "  "]);
    assert!(!success);
    assert!(stderr.contains("query must not be empty"), "{}", stderr);
}
