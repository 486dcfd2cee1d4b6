//! Storage collaborators consumed by the background coordinator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;
use crate::messages::port::TabId;
use crate::vault::client::VaultClient;
use crate::vault::vault_model::{LastUsedResult, Session, Settings, VaultObject};

/// Active vault sessions keyed by host.
pub type Sessions = HashMap<String, Session>;

#[async_trait]
pub trait SessionsStore: Send + Sync {
    async fn fetch(&self) -> Result<Sessions>;

    /// Receiver that observes every change to the session map.
    fn on_changed(&self) -> watch::Receiver<Sessions>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch(&self) -> Result<Settings>;
}

#[async_trait]
pub trait IgnoreListStore: Send + Sync {
    /// URL patterns for which saving is never offered.
    async fn fetch(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait TabResultsCache: Send + Sync {
    async fn get(&self, tab_id: TabId) -> Result<Vec<VaultObject>>;
    async fn set(&self, tab_id: TabId, results: Vec<VaultObject>) -> Result<()>;
    async fn remove(&self, tab_id: TabId) -> Result<()>;
    /// Drop cached results that came from `host`.
    async fn purge_host(&self, host: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait PreferencesStore: Send + Sync {
    async fn last_used(&self, url: &str) -> Result<Option<LastUsedResult>>;
    async fn set_last_used(&self, url: &str, host: &str, object_id: &str) -> Result<()>;
}

/// Everything the coordinator talks to outside of its own state.
#[derive(Clone)]
pub struct Collaborators {
    pub vault: Arc<dyn VaultClient>,
    pub sessions: Arc<dyn SessionsStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub ignore: Arc<dyn IgnoreListStore>,
    pub tab_results: Arc<dyn TabResultsCache>,
    pub preferences: Arc<dyn PreferencesStore>,
}
