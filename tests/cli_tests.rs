mod common;

use clap::Parser;
use common::pages::{LOGIN_PAGE, LOGIN_URL, PSEUDO_LOGIN_PAGE};
use vault_autofill::cli::commands::{ReplayScript, render_scan, run_replay, scan_report};
use vault_autofill::cli::config::{AppConfig, Cli, Commands, load_config, log_level};
use vault_autofill::flows::flow_model::SavePolicy;
use vault_autofill::forms::form_model::{FormType, ScannerOptions};

// ============================================================================
// CLI Argument Parsing Tests
// ============================================================================

#[test]
fn cli_parse_scan_file() {
    let cli = Cli::parse_from(["vault-autofill", "scan", "--file", "page.html"]);
    match cli.command {
        Commands::Scan { file, url, format } => {
            assert_eq!(file.as_deref(), Some("page.html"));
            assert_eq!(url, None);
            assert_eq!(format, "text");
        }
        _ => panic!("Expected Scan command"),
    }
    assert_eq!(cli.verbose, 0);
    assert_eq!(cli.config, None);
}

#[test]
fn cli_parse_scan_url_json_with_globals() {
    let cli = Cli::parse_from([
        "vault-autofill",
        "-vv",
        "scan",
        "--url",
        "https://example.com/login",
        "--format",
        "json",
        "--config",
        "custom.yaml",
    ]);
    match cli.command {
        Commands::Scan { file, url, format } => {
            assert_eq!(file, None);
            assert_eq!(url.as_deref(), Some("https://example.com/login"));
            assert_eq!(format, "json");
        }
        _ => panic!("Expected Scan command"),
    }
    assert_eq!(cli.verbose, 2);
    assert_eq!(cli.config.as_deref(), Some("custom.yaml"));
}

#[test]
fn cli_scan_needs_exactly_one_source() {
    assert!(Cli::try_parse_from(["vault-autofill", "scan"]).is_err());
    assert!(
        Cli::try_parse_from([
            "vault-autofill",
            "scan",
            "--file",
            "a.html",
            "--url",
            "https://example.com"
        ])
        .is_err()
    );
}

#[test]
fn cli_parse_replay() {
    let cli = Cli::parse_from([
        "vault-autofill",
        "replay",
        "--script",
        "session.yaml",
        "--trace",
        "flows.jsonl",
    ]);
    match cli.command {
        Commands::Replay { script, trace } => {
            assert_eq!(script, "session.yaml");
            assert_eq!(trace.as_deref(), Some("flows.jsonl"));
        }
        _ => panic!("Expected Replay command"),
    }
}

// ============================================================================
// Config File Tests
// ============================================================================

#[test]
fn config_defaults_when_missing() {
    let config = load_config(Some("/nonexistent/vault-autofill.yaml"));
    assert_eq!(config.flows.save_policy(), SavePolicy::default());
    assert_eq!(config.scanner.options(), ScannerOptions::default());
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.trace_file, None);
}

#[test]
fn config_partial_file_keeps_other_defaults() {
    let path = std::env::temp_dir().join(format!("vault_autofill_config_{}.yaml", std::process::id()));
    std::fs::write(
        &path,
        "flows:\n  save_retries: 5\nscanner:\n  second_pass: false\nlogging:\n  trace_file: flows.jsonl\n",
    )
    .unwrap();

    let config = load_config(path.to_str());
    let policy = config.flows.save_policy();
    assert_eq!(policy.retries, 5);
    assert_eq!(policy.timeout_ms, 10_000);
    assert_eq!(policy.retry_time_ms, 1_000);
    assert!(!config.scanner.second_pass);
    assert!(config.scanner.prune_removed);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.trace_file.as_deref(), Some("flows.jsonl"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn config_malformed_falls_back_to_defaults() {
    let path = std::env::temp_dir().join(format!("vault_autofill_bad_{}.yaml", std::process::id()));
    std::fs::write(&path, "flows: [this is: not, a map").unwrap();

    let config = load_config(path.to_str());
    assert_eq!(config.flows.save_retries, 3);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn log_level_prefers_verbosity() {
    let mut config = AppConfig::default();
    config.logging.level = "error".to_string();
    assert_eq!(log_level(0, &config), "error");
    assert_eq!(log_level(1, &config), "info");
    assert_eq!(log_level(2, &config), "debug");
    assert_eq!(log_level(5, &config), "trace");
}

// ============================================================================
// scan
// ============================================================================

#[test]
fn scan_report_counts_forms() {
    let report = scan_report(LOGIN_PAGE, LOGIN_URL, ScannerOptions::default()).unwrap();
    assert_eq!(report.url, LOGIN_URL);
    assert_eq!(report.title, "Example login");
    assert_eq!(report.forms.len(), 1);
    assert_eq!(report.count(FormType::Login), 1);
    assert_eq!(report.fillable(), 1);

    let form = &report.forms[0];
    assert_eq!(form.fingerprint.len(), 40);
    assert!(form.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(form.inputs[0].name.as_deref(), Some("user"));
    assert_eq!(form.submits[0].text, "Log in");
}

#[test]
fn fingerprint_ignores_values_and_node_ids() {
    let plain = scan_report(LOGIN_PAGE, LOGIN_URL, ScannerOptions::default()).unwrap();
    let padded_html = LOGIN_PAGE.replace("<body>", "<body><p>News</p><p>More</p>");
    let padded = scan_report(&padded_html, LOGIN_URL, ScannerOptions::default()).unwrap();

    assert_ne!(plain.forms[0].container, padded.forms[0].container);
    assert_eq!(plain.forms[0].fingerprint, padded.forms[0].fingerprint);
}

#[test]
fn render_scan_text() {
    let out = render_scan(LOGIN_PAGE, LOGIN_URL, "text", ScannerOptions::default()).unwrap();
    assert!(out.starts_with(&format!("=== Scan: {} ===\n", LOGIN_URL)));
    assert!(out.contains("Title: Example login"));
    assert!(out.contains("[login]  <form id=\"auth\" method=\"post\"> (form, 2 inputs, 1 submit)"));
    assert!(out.contains("    username  user"));
    assert!(out.contains("    password  pass"));
    assert!(out.ends_with("=== 1 form, 1 fillable ===\n"));
}

#[test]
fn render_scan_json_marks_pseudo_forms() {
    let out = render_scan(PSEUDO_LOGIN_PAGE, LOGIN_URL, "json", ScannerOptions::default()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    let forms = json["forms"].as_array().unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0]["kind"], "pseudo");
    assert_eq!(forms[0]["form_type"], "login");
    assert_eq!(forms[0]["inputs"][1]["input_type"], "password");
}

// ============================================================================
// replay
// ============================================================================

const REPLAY: &str = r#"
start_ms: 1700000000000
sessions:
  - host: safe.example.org
    token: t1
    createdAt: 1699999990000
objects:
  - host: safe.example.org
    id: "42"
    name: Example
    fields:
      - { name: url, value: "https://www.example.com/login" }
      - { name: username, value: alice }
      - { name: password, value: s3cret, isEncrypted: true }
steps:
  - connect:
      id: 1
      name: content_script
      sender: { tabId: 3, url: "https://www.example.com/login", title: Example }
  - message:
      port: 1
      message: { type: fill.init }
  - message:
      port: 1
      message:
        type: save.submit
        data:
          fields: [[username, bob], [password, hunter2]]
  - message:
      port: 1
      message: { type: save.bogus }
  - advance_ms: 10000
  - disconnect: 1
  - connect:
      id: 2
      name: content_script
      sender: { tabId: 3, url: "https://www.example.com/login" }
"#;

#[tokio::test]
async fn replay_drives_fill_and_save() {
    let script: ReplayScript = serde_yaml::from_str(REPLAY).unwrap();
    let outcome = run_replay(script, SavePolicy::default(), None).await.unwrap();

    let sent: Vec<(u64, &str)> = outcome
        .outbound
        .iter()
        .map(|m| (m.port, m.message.message_type.as_str()))
        .collect();
    assert_eq!(
        sent,
        vec![(1, "fill.fill"), (1, "save.open"), (2, "save.close")]
    );
    assert_eq!(outcome.outbound[0].message.data.as_ref().unwrap()["password"], "s3cret");
    assert_eq!(outcome.errors.len(), 1, "save.bogus is rejected");
}

#[tokio::test]
async fn replay_drops_results_of_rejected_sessions() {
    let script: ReplayScript = serde_yaml::from_str(
        r#"
start_ms: 1700000000000
sessions:
  - { host: safe.example.org, token: t1, createdAt: 1699999990000 }
objects:
  - host: safe.example.org
    id: "42"
    name: Example
    fields:
      - { name: url, value: "https://www.example.com/login" }
steps:
  - connect: { id: 1, name: content_script, sender: { tabId: 3, url: "https://www.example.com/login" } }
  - message: { port: 1, message: { type: fill.init } }
  - check_sessions: true
"#,
    )
    .unwrap();
    let outcome = run_replay(script.clone(), SavePolicy::default(), None).await.unwrap();
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.outbound.len(), 1);

    let mut unreachable = script;
    unreachable.unreachable = vec!["safe.example.org".to_string()];
    let outcome = run_replay(unreachable, SavePolicy::default(), None).await.unwrap();
    assert!(outcome.outbound.is_empty());
    assert!(outcome.errors.is_empty());
}
