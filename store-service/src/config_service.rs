//! Config Entry directory CRUD (spec.md §4.6 "Config Entry CRUD"): a
//! mutable `(config_class, config_key) -> selector` lookup layered over the
//! immutable object model, with tombstoning rather than physical deletion.

use std::sync::Arc;

use store_core::{ConfigEntry, ConfigEntryWrite, ConfigTombstone, ObjectType};
use store_storage::MetadataGateway;

use crate::context::CallerTrust;
use crate::error::{ApiError, ServiceResult};
use crate::validation;

/// All config-object operations require a trusted caller (spec.md §6.1:
/// CONFIG/RESOURCE object types, and by extension their directory entries,
/// sit behind the trusted write surface).
pub struct ConfigService {
    gateway: Arc<MetadataGateway>,
}

impl ConfigService {
    pub fn new(gateway: Arc<MetadataGateway>) -> Self {
        ConfigService { gateway }
    }

    /// `createConfigObject` (spec.md §4.6).
    pub async fn create_config_object(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        item: ConfigEntryWrite,
    ) -> ServiceResult<ConfigEntry> {
        require_trusted(trust)?;
        validate_keys(&item.config_class, &item.config_key)?;
        Ok(self.gateway.create_config_entry(tenant_code, &item).await?)
    }

    /// `updateConfigObject` (spec.md §4.6): supersedes the current latest
    /// entry for the key with a new `config_version`.
    pub async fn update_config_object(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        item: ConfigEntryWrite,
    ) -> ServiceResult<ConfigEntry> {
        require_trusted(trust)?;
        validate_keys(&item.config_class, &item.config_key)?;
        Ok(self.gateway.update_config_entry(tenant_code, &item).await?)
    }

    /// `deleteConfigObject` (spec.md §4.6): tombstones the latest live
    /// entry. The object rows the entry pointed at are left untouched (see
    /// DESIGN.md's Open Question decision).
    pub async fn delete_config_object(&self, tenant_code: &str, trust: CallerTrust, item: ConfigTombstone) -> ServiceResult<()> {
        require_trusted(trust)?;
        validate_keys(&item.config_class, &item.config_key)?;
        Ok(self.gateway.delete_config_entry(tenant_code, &item).await?)
    }

    /// `readConfigObject` (spec.md §4.6).
    pub async fn read_config_object(&self, tenant_code: &str, trust: CallerTrust, config_class: &str, config_key: &str) -> ServiceResult<ConfigEntry> {
        require_trusted(trust)?;
        validate_keys(config_class, config_key)?;
        Ok(self.gateway.read_config_entry(tenant_code, config_class, config_key).await?)
    }

    /// `readConfigBatch` (spec.md §4.6).
    pub async fn read_config_batch(&self, tenant_code: &str, trust: CallerTrust, keys: &[(String, String)]) -> ServiceResult<Vec<ConfigEntry>> {
        require_trusted(trust)?;
        for (config_class, config_key) in keys {
            validate_keys(config_class, config_key)?;
        }
        Ok(self.gateway.read_config_batch(tenant_code, keys).await?)
    }

    /// `listConfigEntries` (spec.md §4.6).
    pub async fn list_config_entries(
        &self,
        tenant_code: &str,
        trust: CallerTrust,
        config_class: &str,
        include_deleted: bool,
        object_type: Option<ObjectType>,
        resource_sub_type: Option<&str>,
    ) -> ServiceResult<Vec<ConfigEntry>> {
        require_trusted(trust)?;
        Ok(self
            .gateway
            .list_config_entries(tenant_code, config_class, include_deleted, object_type, resource_sub_type)
            .await?)
    }
}

fn require_trusted(trust: CallerTrust) -> Result<(), ApiError> {
    if trust != CallerTrust::Trusted {
        return Err(ApiError::permission_denied("config entry operations require a trusted caller"));
    }
    Ok(())
}

/// `config_key` shares the resource-key grammar (spec.md §6.2); no distinct
/// grammar is defined for `config_class`, so the same one is applied to
/// both rather than inventing an ungrounded one.
fn validate_keys(config_class: &str, config_key: &str) -> Result<(), ApiError> {
    validation::validate_resource_key(config_class)?;
    validation::validate_resource_key(config_key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_config_key_rejected() {
        let err = validate_keys("GOOD_CLASS", "bad key").unwrap_err();
        assert_eq!(err.code, crate::error::ApiErrorCode::InvalidArgument);
    }

    #[test]
    fn well_formed_keys_pass() {
        assert!(validate_keys("DATASET_ALIAS", "LATEST_PRICES").is_ok());
    }
}
