use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, watch};

use crate::background::collaborators::{
    Collaborators, IgnoreListStore, PreferencesStore, Sessions, SessionsStore, SettingsStore,
    TabResultsCache,
};
use crate::error::Result;
use crate::messages::port::TabId;
use crate::vault::client::MemoryVault;
use crate::vault::vault_model::{LastUsedResult, Session, Settings, VaultObject};

// ============================================================================
// Sessions
// ============================================================================

pub struct MemorySessions {
    tx: watch::Sender<Sessions>,
}

impl MemorySessions {
    pub fn new(sessions: Vec<Session>) -> Self {
        let map = sessions.into_iter().map(|s| (s.host.clone(), s)).collect();
        let (tx, _rx) = watch::channel(map);
        Self { tx }
    }

    pub fn insert(&self, session: Session) {
        self.tx.send_modify(|m| {
            m.insert(session.host.clone(), session);
        });
    }

    pub fn remove(&self, host: &str) {
        self.tx.send_modify(|m| {
            m.remove(host);
        });
    }
}

#[async_trait]
impl SessionsStore for MemorySessions {
    async fn fetch(&self) -> Result<Sessions> {
        Ok(self.tx.borrow().clone())
    }

    fn on_changed(&self) -> watch::Receiver<Sessions> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Settings, ignore list
// ============================================================================

#[derive(Default)]
pub struct MemorySettings {
    settings: RwLock<Settings>,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub async fn replace(&self, settings: Settings) {
        *self.settings.write().await = settings;
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn fetch(&self) -> Result<Settings> {
        Ok(*self.settings.read().await)
    }
}

#[derive(Default)]
pub struct MemoryIgnoreList {
    patterns: RwLock<Vec<String>>,
}

impl MemoryIgnoreList {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns: RwLock::new(patterns),
        }
    }

    pub async fn add(&self, pattern: &str) {
        self.patterns.write().await.push(pattern.to_string());
    }
}

#[async_trait]
impl IgnoreListStore for MemoryIgnoreList {
    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.patterns.read().await.clone())
    }
}

// ============================================================================
// Tab results, preferences
// ============================================================================

#[derive(Default)]
pub struct MemoryTabResults {
    results: RwLock<HashMap<TabId, Vec<VaultObject>>>,
}

impl MemoryTabResults {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TabResultsCache for MemoryTabResults {
    async fn get(&self, tab_id: TabId) -> Result<Vec<VaultObject>> {
        Ok(self.results.read().await.get(&tab_id).cloned().unwrap_or_default())
    }

    async fn set(&self, tab_id: TabId, results: Vec<VaultObject>) -> Result<()> {
        self.results.write().await.insert(tab_id, results);
        Ok(())
    }

    async fn remove(&self, tab_id: TabId) -> Result<()> {
        self.results.write().await.remove(&tab_id);
        Ok(())
    }

    async fn purge_host(&self, host: &str) -> Result<()> {
        for results in self.results.write().await.values_mut() {
            results.retain(|r| r.host != host);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.results.write().await.clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPreferences {
    last_used: RwLock<HashMap<String, LastUsedResult>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferencesStore for MemoryPreferences {
    async fn last_used(&self, url: &str) -> Result<Option<LastUsedResult>> {
        Ok(self.last_used.read().await.get(url).cloned())
    }

    async fn set_last_used(&self, url: &str, host: &str, object_id: &str) -> Result<()> {
        self.last_used.write().await.insert(
            url.to_string(),
            LastUsedResult {
                host: host.to_string(),
                object_id: object_id.to_string(),
            },
        );
        Ok(())
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Concrete in-memory stores, kept typed so callers can seed and inspect them.
#[derive(Clone)]
pub struct MemoryStores {
    pub vault: Arc<MemoryVault>,
    pub sessions: Arc<MemorySessions>,
    pub settings: Arc<MemorySettings>,
    pub ignore: Arc<MemoryIgnoreList>,
    pub tab_results: Arc<MemoryTabResults>,
    pub preferences: Arc<MemoryPreferences>,
}

impl MemoryStores {
    pub fn new(vault: MemoryVault, sessions: Vec<Session>, settings: Settings, ignore: Vec<String>) -> Self {
        Self {
            vault: Arc::new(vault),
            sessions: Arc::new(MemorySessions::new(sessions)),
            settings: Arc::new(MemorySettings::new(settings)),
            ignore: Arc::new(MemoryIgnoreList::new(ignore)),
            tab_results: Arc::new(MemoryTabResults::new()),
            preferences: Arc::new(MemoryPreferences::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            vault: self.vault.clone(),
            sessions: self.sessions.clone(),
            settings: self.settings.clone(),
            ignore: self.ignore.clone(),
            tab_results: self.tab_results.clone(),
            preferences: self.preferences.clone(),
        }
    }
}
