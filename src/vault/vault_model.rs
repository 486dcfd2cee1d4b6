use serde::{Deserialize, Serialize};

// ============================================================================
// Vault data model (camelCase on the wire)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultField {
    /// Field name, e.g. `username`, `password`, `url`
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Absent for encrypted fields until the object is decrypted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub is_password: bool,
    #[serde(default, rename = "type")]
    pub field_type: String,
}

impl VaultField {
    pub fn plain(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            title: name.to_string(),
            value: Some(value.to_string()),
            is_encrypted: false,
            is_password: false,
            field_type: "text".to_string(),
        }
    }

    pub fn secret(name: &str, value: &str) -> Self {
        Self {
            is_encrypted: true,
            is_password: true,
            field_type: "password".to_string(),
            ..Self::plain(name, value)
        }
    }
}

/// An object stored in a vault on a given host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultObject {
    pub host: String,
    pub id: String,
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub vault_id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub is_decrypted: bool,
    #[serde(default)]
    pub fields: Vec<VaultField>,
}

impl VaultObject {
    pub fn field(&self, name: &str) -> Option<&VaultField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|f| f.value.as_deref())
    }

    /// Same `(host, id)` identity.
    pub fn same_object(&self, host: &str, id: &str) -> bool {
        self.host == host && self.id == id
    }

    /// Copy with encrypted field values removed, as a search returns it.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.is_decrypted = false;
        for field in copy.fields.iter_mut().filter(|f| f.is_encrypted) {
            field.value = None;
        }
        copy
    }
}

// ============================================================================
// Sessions and settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub host: String,
    pub token: String,
    /// Milliseconds since the epoch
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Minutes of inactivity before sessions are invalidated
    #[serde(default = "default_idle_max")]
    pub idle_max: u64,
    /// Hours a token stays valid, 0 = unlimited
    #[serde(default = "default_max_token_life")]
    pub max_token_life: u64,
    #[serde(default = "default_true")]
    pub auto_fill: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_max: default_idle_max(),
            max_token_life: default_max_token_life(),
            auto_fill: true,
        }
    }
}

fn default_idle_max() -> u64 { 20 }
fn default_max_token_life() -> u64 { 8 }
fn default_true() -> bool { true }

/// Identifies the result last used to fill a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUsedResult {
    pub host: String,
    pub object_id: String,
}
