use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("fragment-store.toml");
    let config = format!(
        "[storage]\nroot = {:?}\n\n[codec]\nencode_url = \"http://127.0.0.1:9/encode\"\ndecode_url = \"http://127.0.0.1:9/decode\"\ntimeout_seconds = 2\n",
        dir.path().join("store").display().to_string()
    );
    std::fs::write(&path, config).unwrap();
    path
}

#[test]
fn list_on_empty_store() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("fragment-store")
        .unwrap()
        .args(["--config", config.to_str().unwrap(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no files stored"));
}

#[test]
fn ingest_reports_unreachable_encoder() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let input = dir.path().join("input.txt");
    std::fs::write(&input, "some content").unwrap();

    Command::cargo_bin("fragment-store")
        .unwrap()
        .args(["--config", config.to_str().unwrap(), "ingest", "--owner", "tester", "--file"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encoding service unavailable"));
}

#[test]
fn retrieve_unknown_id_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("fragment-store")
        .unwrap()
        .args([
            "--config",
            config.to_str().unwrap(),
            "retrieve",
            "--file-id",
            "7f2c1a52-8a4e-4a55-9d1c-2b8f5f7e0c11",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fragment set not found"));
}

#[test]
fn malformed_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    Command::cargo_bin("fragment-store")
        .unwrap()
        .args(["--config", config.to_str().unwrap(), "info", "--file-id", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid file id"));
}
