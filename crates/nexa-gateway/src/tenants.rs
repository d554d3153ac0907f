//! Tenant directory loaded from configuration.

use async_trait::async_trait;
use nexa_kernel::GatewayError;
use nexa_kernel::gateway::{Tenant, TenantDirectory};
use std::collections::HashMap;

/// API key → tenant table fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    by_key: HashMap<String, Tenant>,
}

impl StaticTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder helper: register a key.  A repeated key replaces the earlier
    /// tenant.
    pub fn with_tenant(mut self, api_key: impl Into<String>, tenant: Tenant) -> Self {
        self.by_key.insert(api_key.into(), tenant);
        self
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl FromIterator<(String, Tenant)> for StaticTenantDirectory {
    fn from_iter<I: IntoIterator<Item = (String, Tenant)>>(iter: I) -> Self {
        Self {
            by_key: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn lookup(&self, api_key: &str) -> Result<Option<Tenant>, GatewayError> {
        Ok(self.by_key.get(api_key).cloned())
    }
}
