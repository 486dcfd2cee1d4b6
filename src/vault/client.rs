use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AutofillError, Result};
use crate::vault::vault_model::VaultObject;

/// Vault API client, one logical connection per host.
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Search objects on `host` matching `needle`. Encrypted values are omitted.
    async fn find(&self, host: &str, needle: &str) -> Result<Vec<VaultObject>>;

    /// Fetch object `id` on `host` with all values decrypted.
    async fn decrypt(&self, host: &str, id: &str) -> Result<VaultObject>;

    /// Verify that the session token for `host` is still accepted.
    async fn check(&self, host: &str) -> Result<()>;
}

/// In-memory vault used by the CLI replay and tests.
#[derive(Default)]
pub struct MemoryVault {
    objects: RwLock<HashMap<String, Vec<VaultObject>>>,
    unreachable: RwLock<HashSet<String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objects: Vec<VaultObject>) -> Self {
        let mut by_host: HashMap<String, Vec<VaultObject>> = HashMap::new();
        for object in objects {
            by_host.entry(object.host.clone()).or_default().push(object);
        }
        Self {
            objects: RwLock::new(by_host),
            unreachable: RwLock::new(HashSet::new()),
        }
    }

    pub async fn insert(&self, object: VaultObject) {
        self.objects
            .write()
            .await
            .entry(object.host.clone())
            .or_default()
            .push(object);
    }

    /// Make every call against `host` fail with a network error.
    pub async fn set_unreachable(&self, host: &str) {
        self.unreachable.write().await.insert(host.to_string());
    }

    async fn ensure_reachable(&self, host: &str) -> Result<()> {
        if self.unreachable.read().await.contains(host) {
            return Err(AutofillError::network(
                "vault",
                format!("host {} is unreachable", host),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VaultClient for MemoryVault {
    async fn find(&self, host: &str, needle: &str) -> Result<Vec<VaultObject>> {
        self.ensure_reachable(host).await?;
        let needle = needle.to_lowercase();
        let objects = self.objects.read().await;
        let found = objects
            .get(host)
            .map(|list| {
                list.iter()
                    .filter(|o| {
                        o.name.to_lowercase().contains(&needle)
                            || o.fields.iter().any(|f| {
                                !f.is_encrypted
                                    && f.value
                                        .as_deref()
                                        .is_some_and(|v| v.to_lowercase().contains(&needle))
                            })
                    })
                    .map(VaultObject::redacted)
                    .collect()
            })
            .unwrap_or_default();
        Ok(found)
    }

    async fn decrypt(&self, host: &str, id: &str) -> Result<VaultObject> {
        self.ensure_reachable(host).await?;
        let objects = self.objects.read().await;
        let mut object = objects
            .get(host)
            .and_then(|list| list.iter().find(|o| o.id == id))
            .cloned()
            .ok_or_else(|| {
                AutofillError::network("vault", format!("no object {} on {}", id, host))
            })?;
        object.is_decrypted = true;
        Ok(object)
    }

    async fn check(&self, host: &str) -> Result<()> {
        self.ensure_reachable(host).await
    }
}
