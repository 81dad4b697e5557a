//! Shared fixtures: memory-backed services with in-process fakes for the
//! payment provider and DNS.

#![allow(dead_code)]

use async_trait::async_trait;
use owner_adapter_memory::MemoryStore;
use owner_admin::{
    AdminConfig, CheckoutRequest, CheckoutSession, DnsResolver, OwnerAdmin, PaymentProvider,
};
use owner_core::{EventBus, OwnerError, OwnerResult, Plan, RecordService, Tenant, TenantStatus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct FakePayments {
    pub requests: Mutex<Vec<CheckoutRequest>>,
    pub fail_with: Mutex<Option<u16>>,
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> OwnerResult<CheckoutSession> {
        if let Some(status) = *self.fail_with.lock().unwrap() {
            return Err(OwnerError::upstream("stripe", status, "card_declined"));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let session_id = format!("cs_test_{}", requests.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.test/{}", session_id),
            session_id,
        })
    }
}

#[derive(Default)]
pub struct FakeDns {
    pub records: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeDns {
    pub fn publish(&self, name: &str, value: &str) {
        self.records
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
}

#[async_trait]
impl DnsResolver for FakeDns {
    async fn txt_records(&self, name: &str) -> OwnerResult<Vec<String>> {
        Ok(self.records.lock().unwrap().get(name).cloned().unwrap_or_default())
    }
}

pub struct Harness {
    pub admin: OwnerAdmin,
    pub bus: Arc<EventBus>,
    pub payments: Arc<FakePayments>,
    pub dns: Arc<FakeDns>,
}

impl Harness {
    pub fn records(&self) -> &RecordService {
        self.admin.records()
    }

    /// Creates a tenant through the service.
    pub async fn tenant(&self, slug: &str, plan: Plan) -> Tenant {
        self.admin
            .tenants()
            .create(json!({
                "name": format!("School {}", slug),
                "slug": slug,
                "owner_email": format!("admin@{}.edu", slug),
                "plan": plan,
            }))
            .await
            .unwrap()
    }

    /// Creates a tenant and moves it to active.
    pub async fn active_tenant(&self, slug: &str, plan: Plan) -> Tenant {
        let tenant = self.tenant(slug, plan).await;
        let tenant = self.admin.tenants().reactivate(&tenant.id).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        tenant
    }
}

/// Services acting as `owner`, without hooks.
pub async fn harness() -> Harness {
    let bus = Arc::new(EventBus::sequential());
    let records = RecordService::new(Arc::new(MemoryStore::new()), bus.clone());
    let payments = Arc::new(FakePayments::default());
    let dns = Arc::new(FakeDns::default());
    let admin = OwnerAdmin::new(records, AdminConfig::new(), payments.clone(), dns.clone()).as_actor("owner");
    Harness {
        admin,
        bus,
        payments,
        dns,
    }
}

/// Like [`harness`], with the built-in hooks installed.
pub async fn harness_with_hooks() -> Harness {
    let h = harness().await;
    h.admin.install_hooks().await;
    h
}
