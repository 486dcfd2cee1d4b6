use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::vault::client::VaultClient;
use crate::vault::vault_model::VaultObject;

/// Whether `object` still has encrypted values to fetch before it can fill.
pub fn needs_decrypt(object: &VaultObject) -> bool {
    !object.is_decrypted
        && object
            .fields
            .iter()
            .any(|f| f.is_encrypted && f.value.is_none())
}

/// Turn a vault object into `field name -> value`, decrypting on demand.
/// Fields without a value are left out.
pub async fn parse_result(
    vault: &dyn VaultClient,
    object: &VaultObject,
) -> Result<HashMap<String, String>> {
    let decrypted;
    let source = if needs_decrypt(object) {
        debug!(host = %object.host, id = %object.id, "decrypting result");
        decrypted = vault.decrypt(&object.host, &object.id).await?;
        &decrypted
    } else {
        object
    };
    Ok(fill_map(source))
}

/// Values already present on `object`, without any decryption.
pub fn fill_map(object: &VaultObject) -> HashMap<String, String> {
    object
        .fields
        .iter()
        .filter_map(|f| f.value.as_ref().map(|v| (f.name.clone(), v.clone())))
        .collect()
}
