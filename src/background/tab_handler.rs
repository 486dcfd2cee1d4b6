use std::cmp::Ordering;

use tracing::{debug, error};

use crate::background::collaborators::Collaborators;
use crate::background::session_tools::{active_sessions, url_comparator, url_to_needle};
use crate::error::Result;
use crate::messages::port::TabId;
use crate::vault::vault_model::VaultObject;

/// Per-tab search results: cached lookups and vault searches for a page.
#[derive(Clone)]
pub struct TabHandler {
    collab: Collaborators,
}

impl TabHandler {
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    pub async fn get_results(&self, tab_id: TabId) -> Result<Vec<VaultObject>> {
        self.collab.tab_results.get(tab_id).await
    }

    /// Cached results for the tab, or a fresh search for `url` that is then cached.
    pub async fn results_for(&self, tab_id: TabId, url: &str, now_ms: u64) -> Result<Vec<VaultObject>> {
        let cached = self.get_results(tab_id).await?;
        if !cached.is_empty() {
            debug!(tab_id, results = cached.len(), "using cached results");
            return Ok(cached);
        }
        let found = self.find(url, now_ms).await?;
        self.collab.tab_results.set(tab_id, found.clone()).await?;
        Ok(found)
    }

    /// Search every active session for `url`, best URL match first. A host
    /// that fails is logged and skipped.
    pub async fn find(&self, url: &str, now_ms: u64) -> Result<Vec<VaultObject>> {
        let needle = url_to_needle(url);
        let sessions = self.collab.sessions.fetch().await?;
        let settings = self.collab.settings.fetch().await?;

        let mut results = Vec::new();
        for session in active_sessions(&sessions, &settings, now_ms) {
            match self.collab.vault.find(&session.host, &needle).await {
                Ok(found) => results.extend(found),
                Err(e) => error!(host = %session.host, error = %e, "search failed"),
            }
        }

        let compare = url_comparator(url);
        results.sort_by(|a, b| {
            let a_url = a.field_value("url").unwrap_or("");
            let b_url = b.field_value("url").unwrap_or("");
            match (a_url.is_empty(), b_url.is_empty()) {
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                _ => compare(b_url, a_url),
            }
        });
        debug!(needle = %needle, results = results.len(), "searched vaults");
        Ok(results)
    }

    pub async fn purge_tab(&self, tab_id: TabId) -> Result<()> {
        self.collab.tab_results.remove(tab_id).await
    }

    /// Forget results from `host`, e.g. after its session was invalidated.
    pub async fn purge_host(&self, host: &str) -> Result<()> {
        self.collab.tab_results.purge_host(host).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.collab.tab_results.clear().await
    }
}
