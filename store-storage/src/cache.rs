//! Per-tenant lookup cache (tenant_code -> tenant row id is the one hot
//! lookup every query needs, spec.md §5 "in-process caches must be
//! per-tenant-keyed").

use std::collections::HashMap;
use std::sync::RwLock;

use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{pooled_connection::deadpool::Pool, AsyncPgConnection, RunQueryDsl};
use store_core::StoreError;

use crate::schema::tenant::dsl as tenant_dsl;

/// Caches `tenant_code -> tenant.id`, refreshed lazily on miss and
/// invalidated explicitly after a tenant is created.
pub struct TenantCache {
    map: RwLock<HashMap<String, i64>>,
}

impl TenantCache {
    pub fn new() -> Self {
        TenantCache { map: RwLock::new(HashMap::new()) }
    }

    pub async fn resolve(
        &self,
        tenant_code: &str,
        pool: &Pool<AsyncPgConnection>,
    ) -> Result<i64, StoreError> {
        if let Some(id) = self.map.read().unwrap().get(tenant_code) {
            return Ok(*id);
        }

        let mut conn = pool
            .get()
            .await
            .map_err(|e| StoreError::Unexpected(format!("failed to acquire connection: {e}")))?;

        let id: i64 = tenant_dsl::tenant
            .filter(tenant_dsl::tenant_code.eq(tenant_code))
            .select(tenant_dsl::id)
            .first(&mut conn)
            .await
            .map_err(|_| StoreError::not_found("tenant", tenant_code))?;

        self.map.write().unwrap().insert(tenant_code.to_string(), id);
        Ok(id)
    }

    pub fn insert(&self, tenant_code: &str, tenant_row_id: i64) {
        self.map.write().unwrap().insert(tenant_code.to_string(), tenant_row_id);
    }

    pub fn invalidate(&self, tenant_code: &str) {
        self.map.write().unwrap().remove(tenant_code);
    }
}

impl Default for TenantCache {
    fn default() -> Self {
        Self::new()
    }
}
