//! CLI integration tests: run the `verity` binary against temporary files.

use std::process::{Command, Output};

fn verity(args: &[&str]) -> Output {
    verity_with_log(args, "off")
}

fn verity_with_log(args: &[&str], filter: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_verity"))
        .args(args)
        .env("RUST_LOG", filter)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run `verity {}`: {}", args.join(" "), e))
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_parse_redacts_password() {
    let output = verity(&["parse", "VMware:https://vc.example.com/sdk;admin;s3cret"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["protocol"], "vmware");
    assert_eq!(json["management_server"], "vc.example.com");
    assert_eq!(json["username"], "admin");
    assert!(!stdout(&output).contains("s3cret"));
}

#[test]
fn test_parse_rejects_unknown_vendor() {
    let output = verity(&["parse", "hyperv:https://h1.example.com"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid connection string"));
}

#[test]
fn test_resolve_policy_id() {
    let dir = tempfile::TempDir::new().unwrap();
    let host = dir.path().join("host.json");
    std::fs::write(
        &host,
        r#"{"name":"h1.example.com","connectionString":"intel:https://h1.example.com:1443","tlsPolicyId":"p1"}"#,
    )
    .unwrap();

    let output = verity(&["resolve", host.to_str().unwrap()]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["policy"]["tlsPolicyId"], "p1");
    assert_eq!(json["source"], "host");
}

#[test]
fn test_resolve_without_policy_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let host = dir.path().join("host.json");
    std::fs::write(&host, r#"{"name":"h1.example.com"}"#).unwrap();

    let output = verity(&["resolve", host.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no TLS policy"));
}

#[test]
fn test_anchors_with_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("verity.yaml");
    std::fs::write(
        &config,
        format!("config_dir: {}\n", dir.path().display()),
    )
    .unwrap();

    let output = verity(&["anchors", "--json", "--config", config.to_str().unwrap()]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json, serde_json::json!([]));
}

#[test]
fn test_anchors_warns_when_file_unreadable() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("verity.yaml");
    std::fs::write(
        &config,
        format!("config_dir: {}\n", dir.path().display()),
    )
    .unwrap();

    let args = ["anchors", "--config", config.to_str().unwrap()];
    let output = verity_with_log(&args, "warn");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Trust anchors unavailable"));

    let quiet = verity(&args);
    assert!(quiet.stderr.is_empty());
}
