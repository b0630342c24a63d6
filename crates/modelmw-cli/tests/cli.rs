// End-to-end tests for the mmw binary. None of them reach the network.

use std::process::Command;

fn mmw() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_mmw"));
    command
        .env_remove("RUST_LOG")
        .env_remove("MMW_API_KEY")
        .env_remove("MMW_HOST")
        .env_remove("MMW_CACHE_DIR");
    command
}

#[test]
fn cli_help_displays_correctly() {
    let output = mmw().arg("--help").output().expect("failed to run mmw --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ModelMyWatershed"));
    for command in ["run", "lookup", "batch", "gwlfe", "endpoints", "config"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn run_help_shows_options() {
    let output = mmw()
        .args(["run", "--help"])
        .output()
        .expect("failed to run mmw run --help");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--payload"));
    assert!(stdout.contains("--form"));
    assert!(stdout.contains("--no-cache"));
    assert!(stdout.contains("--needed-key"));
}

#[test]
fn endpoints_lists_catalogue() {
    let output = mmw()
        .args(["endpoints", "--format", "json"])
        .output()
        .expect("failed to run mmw endpoints");

    assert!(output.status.success());
    let entries: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("endpoints output should be JSON");
    let endpoints: Vec<&str> = entries
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|entry| entry["endpoint"].as_str())
        .collect();
    assert!(endpoints.contains(&"api/analyze/soil/"));
    assert!(endpoints.contains(&"api/modeling/gwlf-e/prepare/"));
    assert!(endpoints.contains(&"api/analyze/land/2019_2019/"));
}

#[test]
fn config_init_then_show_redacts_key() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("config.toml");

    let output = mmw()
        .args(["config", "init", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run mmw config init");
    assert!(output.status.success(), "{output:?}");
    assert!(path.exists());

    let output = mmw()
        .args(["config", "show", "--format", "json", "--config"])
        .arg(&path)
        .env("MMW_API_KEY", "super-secret")
        .output()
        .expect("failed to run mmw config show");
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("super-secret"));
    assert!(stdout.contains("<redacted>"));

    // Refuses to overwrite.
    let output = mmw()
        .args(["config", "init", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run mmw config init");
    assert!(!output.status.success());
}

#[test]
fn lookup_without_saved_result_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = mmw()
        .args(["lookup", "api/analyze/soil/", "02040205"])
        .env("MMW_CACHE_DIR", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path())
        .env("HOME", tmp.path())
        .output()
        .expect("failed to run mmw lookup");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No saved soil result"));
}
