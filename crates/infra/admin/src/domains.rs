//! Custom domain verification through DNS TXT records.

use async_trait::async_trait;
use chrono::Utc;
use owner_core::{OwnerError, OwnerResult, RecordService, Tenant};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[cfg(feature = "http-client")]
use owner_core::{RetryConfig, retry_async};

/// Host label the TXT record lives under.
pub const DEFAULT_RECORD_PREFIX: &str = "_owner-verification";
/// Prefix of the TXT record value.
const TOKEN_PREFIX: &str = "owner-verify=";

/// Looks up TXT records.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// TXT values for `name`, unquoted. An unknown name has none.
    async fn txt_records(&self, name: &str) -> OwnerResult<Vec<String>>;
}

/// Resolver using a DNS-over-HTTPS JSON endpoint.
#[cfg(feature = "http-client")]
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryConfig,
}

#[cfg(feature = "http-client")]
impl DohResolver {
    pub const DEFAULT_ENDPOINT: &'static str = "https://cloudflare-dns.com/dns-query";

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn query(&self, name: &str) -> OwnerResult<Vec<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", "TXT")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(crate::http::request_error)?;
        let body: DohResponse = crate::http::check_status("dns", response)
            .await?
            .json()
            .await
            .map_err(crate::http::request_error)?;
        body.txt_values()
    }
}

#[cfg(feature = "http-client")]
#[async_trait]
impl DnsResolver for DohResolver {
    async fn txt_records(&self, name: &str) -> OwnerResult<Vec<String>> {
        retry_async(&self.retry, || self.query(name)).await
    }
}

/// DNS JSON API answer.
#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

const NOERROR: u32 = 0;
const NXDOMAIN: u32 = 3;
const TXT: u16 = 16;

impl DohResponse {
    fn txt_values(self) -> OwnerResult<Vec<String>> {
        match self.status {
            NOERROR => Ok(self
                .answer
                .into_iter()
                .filter(|a| a.record_type == TXT)
                .map(|a| unquote_txt(&a.data))
                .collect()),
            NXDOMAIN => Ok(Vec::new()),
            rcode => Err(OwnerError::upstream("dns", 502, format!("lookup failed with rcode {}", rcode))),
        }
    }
}

/// Joins the quoted character-strings of a TXT record.
fn unquote_txt(data: &str) -> String {
    let data = data.trim();
    if !data.starts_with('"') {
        return data.to_string();
    }
    data.split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, part)| part)
        .collect()
}

/// Lowercases and checks a hostname such as `learn.maple.edu`.
pub fn normalize_domain(input: &str) -> OwnerResult<String> {
    let domain = input.trim().trim_end_matches('.').to_ascii_lowercase();
    let invalid = |reason: &str| OwnerError::invalid_field("domain", reason.to_string());

    if domain.is_empty() || domain.len() > 253 {
        return Err(invalid("must be between 1 and 253 characters"));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("must include a top-level domain"));
    }
    for label in &labels {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if !valid {
            return Err(invalid("must be a valid hostname"));
        }
    }
    if labels.last().is_some_and(|tld| !tld.bytes().all(|b| b.is_ascii_alphabetic())) {
        return Err(invalid("must end in an alphabetic top-level domain"));
    }
    Ok(domain)
}

/// The record a tenant must publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationInstructions {
    pub domain: String,
    pub record_type: String,
    pub host: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub tenant: Tenant,
    pub verified: bool,
    /// TXT values found at the verification host.
    pub records: Vec<String>,
}

#[derive(Clone)]
pub struct DomainService {
    records: RecordService,
    resolver: std::sync::Arc<dyn DnsResolver>,
    record_prefix: String,
}

impl DomainService {
    pub fn new(records: RecordService, resolver: std::sync::Arc<dyn DnsResolver>) -> Self {
        Self {
            records,
            resolver,
            record_prefix: DEFAULT_RECORD_PREFIX.to_string(),
        }
    }

    pub fn with_record_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.record_prefix = prefix.into();
        self
    }

    fn instructions(&self, domain: &str, token: &str) -> VerificationInstructions {
        VerificationInstructions {
            domain: domain.to_string(),
            record_type: "TXT".to_string(),
            host: format!("{}.{}", self.record_prefix, domain),
            value: format!("{}{}", TOKEN_PREFIX, token),
        }
    }

    /// Stores the domain with a fresh token and returns the TXT record to publish.
    pub async fn start_verification(&self, tenant_id: &str, domain: &str) -> OwnerResult<VerificationInstructions> {
        let domain = normalize_domain(domain)?;
        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;

        let token = hex::encode(rand::thread_rng().r#gen::<[u8; 16]>());
        self.records
            .repo::<Tenant>()
            .patch(
                &tenant.id,
                json!({
                    "domain": domain,
                    "domain_verified": false,
                    "domain_verification_token": token,
                    "domain_verified_at": null,
                }),
            )
            .await?;

        tracing::info!(tenant = %tenant.id, domain = %domain, "domain verification started");
        Ok(self.instructions(&domain, &token))
    }

    /// Checks DNS for the token and marks the domain verified on a match.
    pub async fn verify(&self, tenant_id: &str) -> OwnerResult<VerificationResult> {
        let tenant = self.records.repo::<Tenant>().require(tenant_id).await?;
        let (Some(domain), Some(token)) = (tenant.domain.clone(), tenant.domain_verification_token.clone()) else {
            return Err(OwnerError::conflict("no domain verification in progress"));
        };
        if tenant.domain_verified {
            return Ok(VerificationResult {
                tenant,
                verified: true,
                records: Vec::new(),
            });
        }

        let expected = self.instructions(&domain, &token);
        let records = self.resolver.txt_records(&expected.host).await?;
        if !records.iter().any(|r| r.trim() == expected.value) {
            tracing::debug!(tenant = %tenant.id, domain = %domain, found = records.len(), "verification record not found");
            return Ok(VerificationResult {
                tenant,
                verified: false,
                records,
            });
        }

        let tenant = self
            .records
            .repo::<Tenant>()
            .patch(
                &tenant.id,
                json!({ "domain_verified": true, "domain_verified_at": Utc::now() }),
            )
            .await?;
        tracing::info!(tenant = %tenant.id, domain = %domain, "domain verified");
        Ok(VerificationResult {
            tenant,
            verified: true,
            records,
        })
    }
}
