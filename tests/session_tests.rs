mod common;

use std::cmp::Ordering;
use std::time::Duration;

use common::pages::{find, login_page};
use common::utils::{HOST, NOW_MS, TAB, login_object, session, stores};
use vault_autofill::background::collaborators::TabResultsCache;
use vault_autofill::background::session_tools::{
    hard_timeout_remaining, idle_interval, is_ignored, is_session_active, origin_and_path,
    should_save, simplify_url, strip_url_path, url_comparator, url_to_needle,
};
use vault_autofill::forms::form_model::ScannerOptions;
use vault_autofill::forms::forms_tools::{fill_map, needs_decrypt, parse_result};
use vault_autofill::forms::scanner::PageScanner;
use vault_autofill::vault::client::MemoryVault;
use vault_autofill::vault::vault_model::Settings;

const HOUR_MS: u64 = 3_600_000;

// ============================================================================
// URL helpers
// ============================================================================

#[test]
fn needle_is_the_registrable_domain() {
    assert_eq!(url_to_needle("https://accounts.example.com/login"), "example.com");
    assert_eq!(url_to_needle("https://www.login.example.co.uk/x"), "example.co.uk");
    assert_eq!(url_to_needle("https://www.example.com:8443/a"), "example.com");
    assert_eq!(url_to_needle("localhost"), "localhost");
}

#[test]
fn url_shapes() {
    assert_eq!(simplify_url("https://a.example.com/x?y=1"), "https://a.example.com/x");
    assert_eq!(
        strip_url_path("https://www.example.com/account/login?next=1"),
        "https://www.example.com/account/"
    );
    assert_eq!(strip_url_path("https://www.example.com"), "https://www.example.com/");
    assert_eq!(
        origin_and_path("https://www.example.com/login?next=/home#top"),
        "https://www.example.com/login"
    );
}

#[test]
fn comparator_prefers_closer_urls() {
    let page = "https://www.example.com/login";
    let compare = url_comparator(page);

    assert_eq!(compare(page, "https://www.example.com/"), Ordering::Greater);
    assert_eq!(
        compare("https://www.example.com/login?x=1", "http://www.example.com/login"),
        Ordering::Greater
    );
    assert_eq!(
        compare("http://www.example.com/login", "https://www.example.com/other"),
        Ordering::Greater
    );
    assert_eq!(
        compare("https://example.org/login", "https://www.example.com/other"),
        Ordering::Less
    );
    assert_eq!(compare("https://a.test/", "https://a.test/"), Ordering::Equal);
}

#[test]
fn ignore_list_entries_are_patterns() {
    let url = "https://bank.example.com/login";
    assert!(is_ignored(url, &["bank\\.example".to_string()]));
    assert!(!is_ignored(url, &["shop\\.example".to_string()]));
    assert!(!is_ignored(url, &[]));

    // Does not compile as a regex, matched literally
    assert!(is_ignored("https://x.example.com/a(b", &["a(b".to_string()]));
}

#[tokio::test]
async fn known_credentials_are_matched_by_url_not_username() {
    let page = "https://www.example.com/admin/login";
    let data = vec![
        ("username".to_string(), "admin".to_string()),
        ("password".to_string(), "pw".to_string()),
    ];
    let stores = stores(vec![]);
    let collab = stores.collaborators();

    // Username appears in the page url, the cached url does not
    stores
        .tab_results
        .set(TAB, vec![login_object("9", "admin", "x", "https://other.org/")])
        .await
        .unwrap();
    assert!(should_save(&collab, TAB, page, &data, NOW_MS).await.unwrap());

    stores
        .tab_results
        .set(TAB, vec![login_object("9", "admin", "x", page)])
        .await
        .unwrap();
    assert!(!should_save(&collab, TAB, page, &data, NOW_MS).await.unwrap());

    stores
        .tab_results
        .set(TAB, vec![login_object("9", "root", "x", page)])
        .await
        .unwrap();
    assert!(should_save(&collab, TAB, page, &data, NOW_MS).await.unwrap());
}

// ============================================================================
// Session timing
// ============================================================================

#[test]
fn sessions_expire_after_max_token_life() {
    let settings = Settings::default();
    let mut s = session();

    s.created_at = NOW_MS - 8 * HOUR_MS + 1;
    assert!(is_session_active(&s, &settings, NOW_MS));
    s.created_at = NOW_MS - 8 * HOUR_MS;
    assert!(!is_session_active(&s, &settings, NOW_MS));

    let unlimited = Settings {
        max_token_life: 0,
        ..Settings::default()
    };
    assert!(is_session_active(&s, &unlimited, NOW_MS));
}

#[test]
fn hard_timeout_counts_down() {
    let settings = Settings::default();
    let mut s = session();
    s.created_at = NOW_MS - HOUR_MS;
    assert_eq!(
        hard_timeout_remaining(&s, &settings, NOW_MS),
        Some(Duration::from_millis(7 * HOUR_MS))
    );

    s.created_at = NOW_MS - 9 * HOUR_MS;
    assert_eq!(hard_timeout_remaining(&s, &settings, NOW_MS), Some(Duration::ZERO));

    let unlimited = Settings {
        max_token_life: 0,
        ..Settings::default()
    };
    assert_eq!(hard_timeout_remaining(&s, &unlimited, NOW_MS), None);
}

#[test]
fn idle_interval_has_a_floor() {
    assert_eq!(idle_interval(&Settings::default()), Duration::from_secs(20 * 60));
    let eager = Settings {
        idle_max: 0,
        ..Settings::default()
    };
    assert_eq!(idle_interval(&eager), Duration::from_secs(15));
}

// ============================================================================
// Fill values
// ============================================================================

#[test]
fn redacted_results_need_decrypting() {
    let object = login_object("42", "alice", "s3cret", "https://www.example.com/login");
    assert!(!needs_decrypt(&object));

    let redacted = object.redacted();
    assert!(needs_decrypt(&redacted));
    let values = fill_map(&redacted);
    assert_eq!(values.get("username").map(String::as_str), Some("alice"));
    assert!(!values.contains_key("password"));
}

#[tokio::test]
async fn parse_result_decrypts_on_demand() {
    let object = login_object("42", "alice", "s3cret", "https://www.example.com/login");
    let vault = MemoryVault::with_objects(vec![object.clone()]);

    let values = parse_result(&vault, &object.redacted()).await.unwrap();
    assert_eq!(values["password"], "s3cret");
    assert_eq!(values["url"], "https://www.example.com/login");

    vault.set_unreachable(HOST).await;
    assert!(parse_result(&vault, &object.redacted()).await.is_err());
    // Nothing to fetch, so the vault is not asked
    assert_eq!(parse_result(&vault, &object).await.unwrap()["password"], "s3cret");
}

#[tokio::test]
async fn scanner_fills_a_vault_result() {
    let object = login_object("42", "alice", "s3cret", "https://www.example.com/login");
    let vault = MemoryVault::with_objects(vec![object.clone()]);
    let mut doc = login_page();
    let mut scanner = PageScanner::new(ScannerOptions::default()).unwrap();
    scanner.scan_page(&doc).unwrap();

    let report = scanner.fill_result(&mut doc, &vault, &object.redacted()).await.unwrap();
    assert_eq!(report.filled.len(), 2);
    assert_eq!(doc.value(find(&doc, "input", "user")), "alice");
    assert_eq!(doc.value(find(&doc, "input", "pass")), "s3cret");
}
