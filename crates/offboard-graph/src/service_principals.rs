//! Service principal lookups with a bounded TTL cache.
//!
//! Discovery resolves a display name for every grant and role assignment,
//! and most users share a handful of apps, so lookups are cached on the
//! client rather than in process-global state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::models::ServicePrincipal;
use crate::{GraphClient, GraphResult};

const SELECT_FIELDS: &str = "id,appId,displayName,appRoles";

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ServicePrincipal,
    inserted_at: Instant,
}

/// Bounded, TTL-expiring cache of service principals keyed by object id.
#[derive(Debug)]
pub struct ServicePrincipalCache {
    capacity: usize,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ServicePrincipalCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a fresh entry, if any.
    pub async fn get(&self, id: &str) -> Option<ServicePrincipal> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    /// Inserts an entry, dropping expired entries first and then the oldest
    /// one if the cache is still full.
    pub async fn insert(&self, id: &str, value: ServicePrincipal) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.capacity && !entries.contains_key(id) {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        }
        if entries.len() >= self.capacity && !entries.contains_key(id) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            id.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl GraphClient {
    /// Fetches a service principal by object id. Absent apps are `Ok(None)`
    /// and are not cached, so a newly consented app shows up on the next run.
    #[instrument(skip(self))]
    pub async fn get_service_principal(&self, id: &str) -> GraphResult<Option<ServicePrincipal>> {
        if let Some(cached) = self.sp_cache.get(id).await {
            debug!(id, "Service principal cache hit");
            return Ok(Some(cached));
        }

        let mut url = self.url(&["servicePrincipals", id])?;
        url.query_pairs_mut().append_pair("$select", SELECT_FIELDS);

        let found: Option<ServicePrincipal> = self
            .get_optional("get_service_principal", url.as_str())
            .await?;

        if let Some(ref sp) = found {
            self.sp_cache.insert(id, sp.clone()).await;
        }
        Ok(found)
    }

    /// Fetches a service principal by application (client) id. The result
    /// is cached under its object id.
    #[instrument(skip(self))]
    pub async fn get_service_principal_by_app_id(
        &self,
        app_id: &str,
    ) -> GraphResult<Option<ServicePrincipal>> {
        let key = format!("servicePrincipals(appId='{}')", app_id.replace('\'', "''"));
        let mut url = self.url(&[key.as_str()])?;
        url.query_pairs_mut().append_pair("$select", SELECT_FIELDS);

        let found: Option<ServicePrincipal> = self
            .get_optional("get_service_principal_by_app_id", url.as_str())
            .await?;

        if let Some(ref sp) = found {
            self.sp_cache.insert(&sp.id, sp.clone()).await;
        }
        Ok(found)
    }
}
