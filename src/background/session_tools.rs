use std::cmp::Ordering;
use std::time::Duration;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::background::collaborators::{Collaborators, Sessions};
use crate::error::Result;
use crate::messages::port::TabId;
use crate::vault::vault_model::{Session, Settings};

const HOUR_MS: u64 = 3_600_000;
const MIN_IDLE_INTERVAL: Duration = Duration::from_secs(15);

// ============================================================================
// URL helpers
// ============================================================================

/// Page URL without its query string.
pub fn simplify_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// URL up to and including the last `/` of its path; the key for
/// last-used preferences.
pub fn strip_url_path(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.has_host() {
            let path = parsed.path();
            let dir = path.rfind('/').map(|i| &path[..=i]).unwrap_or("/");
            return format!("{}{}", parsed.origin().ascii_serialization(), dir);
        }
    }
    match url.rfind('/') {
        Some(i) => url[..=i].to_string(),
        None => url.to_string(),
    }
}

/// Origin and path, the way a submitted page is recorded.
pub fn origin_and_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => {
            format!("{}{}", parsed.origin().ascii_serialization(), parsed.path())
        }
        _ => simplify_url(url).split('#').next().unwrap_or(url).to_string(),
    }
}

/// Registrable-ish domain of `url` used as a vault search needle, e.g.
/// `https://www.login.example.co.uk/x` -> `example.co.uk`.
pub fn url_to_needle(url: &str) -> String {
    let Some(fqdn) = fqdn(url) else {
        return url.to_string();
    };
    let parts: Vec<&str> = fqdn.split('.').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return fqdn;
    }
    let mut take = 2;
    if parts.len() >= 3 && matches!(parts[parts.len() - 2], "org" | "co") {
        take = 3;
    }
    parts[parts.len() - take..].join(".")
}

/// Host part without scheme, `www.` or path.
fn fqdn(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let host: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
        .collect();
    if host.is_empty() { None } else { Some(host) }
}

fn strip_protocol(url: &str) -> &str {
    url.split_once("://").map(|(_, r)| r).unwrap_or(url)
}

/// Order candidate URLs by how well they match `url`; `Greater` means `a` is
/// the better match. Exact match beats match without query, which beats
/// match without protocol, then same host, then share of `a` covered by `url`.
pub fn url_comparator(url: &str) -> impl Fn(&str, &str) -> Ordering + '_ {
    move |a: &str, b: &str| {
        if a == b {
            return Ordering::Equal;
        }
        if a == url {
            return Ordering::Greater;
        }
        if b == url {
            return Ordering::Less;
        }

        let (u, a1, b1) = (simplify_url(url), simplify_url(a), simplify_url(b));
        if let Some(o) = prefer_equal(u, a1, b1) {
            return o;
        }
        let (u, a2, b2) = (strip_protocol(u), strip_protocol(a1), strip_protocol(b1));
        if let Some(o) = prefer_equal(u, a2, b2) {
            return o;
        }
        let (u, a3, b3) = (fqdn(u), fqdn(a2), fqdn(b2));
        if let Some(o) = prefer_equal(u.as_deref(), a3.as_deref(), b3.as_deref()) {
            return o;
        }

        let share = |s: &str| {
            if !s.is_empty() && s.contains(url) {
                url.len() as f64 / s.len() as f64
            } else {
                0.0
            }
        };
        share(a).partial_cmp(&share(b)).unwrap_or(Ordering::Equal)
    }
}

fn prefer_equal<T: PartialEq>(target: T, a: T, b: T) -> Option<Ordering> {
    if a == b {
        return None;
    }
    if a == target {
        Some(Ordering::Greater)
    } else if b == target {
        Some(Ordering::Less)
    } else {
        None
    }
}

// ============================================================================
// Session timing
// ============================================================================

/// Whether `session` is younger than `maxTokenLife` (0 = unlimited).
pub fn is_session_active(session: &Session, settings: &Settings, now_ms: u64) -> bool {
    settings.max_token_life == 0
        || now_ms.saturating_sub(session.created_at) < settings.max_token_life * HOUR_MS
}

pub fn active_sessions<'a>(sessions: &'a Sessions, settings: &Settings, now_ms: u64) -> Vec<&'a Session> {
    let mut active: Vec<&Session> = sessions
        .values()
        .filter(|s| is_session_active(s, settings, now_ms))
        .collect();
    active.sort_by(|a, b| a.host.cmp(&b.host));
    active
}

/// Time left before `session` hits its hard timeout; `None` when unlimited.
pub fn hard_timeout_remaining(session: &Session, settings: &Settings, now_ms: u64) -> Option<Duration> {
    if settings.max_token_life == 0 {
        return None;
    }
    let expires = session.created_at + settings.max_token_life * HOUR_MS;
    Some(Duration::from_millis(expires.saturating_sub(now_ms)))
}

/// Idle detection interval: `idleMax` minutes, at least 15 seconds.
pub fn idle_interval(settings: &Settings) -> Duration {
    Duration::from_secs(settings.idle_max * 60).max(MIN_IDLE_INTERVAL)
}

/// At least one active vault session.
pub async fn check_online_status(collab: &Collaborators, now_ms: u64) -> Result<bool> {
    let sessions = collab.sessions.fetch().await?;
    let settings = collab.settings.fetch().await?;
    Ok(!active_sessions(&sessions, &settings, now_ms).is_empty())
}

/// Hosts whose session is expired or whose token the vault rejects.
pub async fn invalid_sessions(collab: &Collaborators, now_ms: u64) -> Result<Vec<String>> {
    let sessions = collab.sessions.fetch().await?;
    let settings = collab.settings.fetch().await?;
    let mut invalid = Vec::new();
    let mut hosts: Vec<&Session> = sessions.values().collect();
    hosts.sort_by(|a, b| a.host.cmp(&b.host));
    for session in hosts {
        if !is_session_active(session, &settings, now_ms) {
            invalid.push(session.host.clone());
            continue;
        }
        if let Err(e) = collab.vault.check(&session.host).await {
            debug!(host = %session.host, error = %e, "session check failed");
            invalid.push(session.host.clone());
        }
    }
    Ok(invalid)
}

// ============================================================================
// Save guard
// ============================================================================

/// Ignore-list entries are regexes; an entry that does not compile is
/// matched as a plain substring.
pub fn is_ignored(url: &str, ignore_list: &[String]) -> bool {
    ignore_list.iter().any(|pattern| match Regex::new(pattern) {
        Ok(re) => re.is_match(url),
        Err(_) => url.contains(pattern.as_str()),
    })
}

fn submitted<'a>(data: &'a [(String, String)], key: &str) -> Option<&'a str> {
    data.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Whether submitted `data` on `url` should start a save flow.
pub async fn should_save(
    collab: &Collaborators,
    tab_id: TabId,
    url: &str,
    data: &[(String, String)],
    now_ms: u64,
) -> Result<bool> {
    let has_secret = data
        .iter()
        .any(|(k, v)| (k == "password" || k == "pincode") && !v.is_empty());
    if !has_secret {
        debug!(tab_id, "nothing secret submitted");
        return Ok(false);
    }

    if !check_online_status(collab, now_ms).await? {
        debug!(tab_id, "no active session");
        return Ok(false);
    }

    let ignore_list = collab.ignore.fetch().await?;
    if is_ignored(url, &ignore_list) {
        debug!(tab_id, url, "url is ignored");
        return Ok(false);
    }

    let page = simplify_url(url);
    let username = submitted(data, "username");
    let results = collab.tab_results.get(tab_id).await?;
    for result in &results {
        let same_page = result
            .fields
            .iter()
            .filter(|f| f.name == "url" || f.name == "host")
            .filter_map(|f| f.value.as_deref())
            .any(|v| !v.is_empty() && (v.contains(page) || page.contains(v)));
        if same_page && result.field_value("username") == username {
            debug!(tab_id, "credentials already known");
            return Ok(false);
        }
    }

    Ok(true)
}
