//! Tenant API keys. Only a SHA-256 hash of each key is stored.

use chrono::{Duration, Utc};
use owner_core::{ApiKey, Collection, OwnerError, OwnerResult, RecordService, Tenant, TenantStatus, quote};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::forms;

pub const KEY_PREFIX: &str = "ok_live_";
/// Random characters after the prefix.
const KEY_BODY_LEN: usize = 40;
/// Characters of the plaintext kept for display.
const DISPLAY_PREFIX_LEN: usize = 12;
/// No 0/O, 1/l/I or o.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";

/// Generates a new plaintext key.
pub fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..KEY_BODY_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}", KEY_PREFIX, body)
}

/// Hex SHA-256 of a plaintext key.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// A freshly issued key. `key` is shown once and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedApiKey {
    pub key: String,
    pub api_key: ApiKey,
}

#[derive(Clone)]
pub struct ApiKeyService {
    records: RecordService,
}

impl ApiKeyService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    pub async fn issue(
        &self,
        tenant_id: &str,
        name: &str,
        scopes: Vec<String>,
        ttl: Option<Duration>,
    ) -> OwnerResult<IssuedApiKey> {
        forms::create_form(Collection::ApiKeys).validate(&json!({ "tenant_id": tenant_id, "name": name }))?;
        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;
        if tenant.status == TenantStatus::Cancelled {
            return Err(OwnerError::conflict("cannot issue keys for a cancelled tenant"));
        }

        let key = generate_key();
        let api_key = ApiKey {
            tenant_id: tenant.id.clone(),
            name: name.trim().to_string(),
            prefix: key[..DISPLAY_PREFIX_LEN].to_string(),
            key_hash: hash_key(&key),
            scopes,
            expires_at: ttl.map(|ttl| Utc::now() + ttl),
            ..Default::default()
        };
        let api_key = self.records.repo::<ApiKey>().create(&api_key).await?;
        tracing::info!(tenant = %tenant.id, key = %api_key.prefix, "api key issued");
        Ok(IssuedApiKey { key, api_key })
    }

    /// Resolves a plaintext key and stamps its use.
    pub async fn authenticate(&self, key: &str) -> OwnerResult<ApiKey> {
        let keys = self.records.repo::<ApiKey>();
        let filter = format!("key_hash = {}", quote(&hash_key(key.trim())));
        let api_key = keys.first(&filter).await?.ok_or(OwnerError::Unauthorized)?;
        if api_key.revoked || api_key.is_expired() {
            return Err(OwnerError::Unauthorized);
        }
        keys.patch(&api_key.id, json!({ "last_used_at": Utc::now() })).await
    }

    pub async fn revoke(&self, id: &str) -> OwnerResult<ApiKey> {
        let api_key = self
            .records
            .repo::<ApiKey>()
            .patch(id, json!({ "revoked": true }))
            .await?;
        tracing::info!(tenant = %api_key.tenant_id, key = %api_key.prefix, "api key revoked");
        Ok(api_key)
    }

    pub async fn list_for_tenant(&self, tenant_id: &str) -> OwnerResult<Vec<ApiKey>> {
        self.records
            .repo::<ApiKey>()
            .full_list(Some(&format!("tenant_id = {}", quote(tenant_id))))
            .await
    }
}
