//! Tenant cloning.
//!
//! A clone is a new trial tenant on the same plan. Users and webhooks can
//! come along; billing, support, keys, reports and logs never do.

use owner_core::{
    AuditLog, Collection, Event, EventType, OwnerResult, RecordService, Tenant, User, Webhook, quote,
};
use owner_webhooks::generate_secret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};

use crate::forms;

/// What to copy into the clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneOptions {
    pub name: String,
    pub slug: String,
    pub include_users: bool,
    pub include_webhooks: bool,
    pub include_settings: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            slug: String::new(),
            include_users: true,
            include_webhooks: true,
            include_settings: true,
        }
    }
}

impl CloneOptions {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneSummary {
    pub tenant: Tenant,
    pub users_copied: usize,
    pub webhooks_copied: usize,
}

#[derive(Clone)]
pub struct CloneService {
    records: RecordService,
}

impl CloneService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    pub async fn clone_tenant(&self, source_id: &str, options: CloneOptions, actor: &str) -> OwnerResult<CloneSummary> {
        let records = self.records.with_actor(actor);
        let source = records.repo::<Tenant>().require(source_id).await?;

        let form = json!({
            "name": options.name,
            "slug": options.slug,
            "owner_email": source.owner_email,
        });
        forms::create_form(Collection::Tenants).validate(&form)?;

        let mut tenant = Tenant::new(options.name.trim(), options.slug.trim(), &source.owner_email, source.plan);
        tenant.max_students = source.max_students;
        tenant.settings = if options.include_settings {
            source.settings.clone()
        } else {
            Map::new()
        };
        tenant.cloned_from = Some(source.id.clone());
        let tenant = records.repo::<Tenant>().create(&tenant).await?;

        let scope = format!("tenant_id = {}", quote(&source.id));
        let mut users_copied = 0;
        if options.include_users {
            for user in records.repo::<User>().full_list(Some(&scope)).await? {
                let mut copy = User::new(&tenant.id, user.email, user.role);
                copy.name = user.name;
                copy.active = user.active;
                records.repo::<User>().create(&copy).await?;
                users_copied += 1;
            }
        }

        let mut webhooks_copied = 0;
        if options.include_webhooks {
            for webhook in records.repo::<Webhook>().full_list(Some(&scope)).await? {
                let copy = Webhook {
                    id: String::new(),
                    tenant_id: Some(tenant.id.clone()),
                    secret: generate_secret(),
                    active: false,
                    consecutive_failures: 0,
                    last_triggered_at: None,
                    ..webhook
                };
                records.repo::<Webhook>().create(&copy).await?;
                webhooks_copied += 1;
            }
        }

        let mut entry = AuditLog::new(actor, "tenant.cloned", Collection::Tenants.as_str(), &tenant.id);
        entry.tenant_id = Some(tenant.id.clone());
        entry.details = json!({
            "source_tenant_id": source.id,
            "users_copied": users_copied,
            "webhooks_copied": webhooks_copied,
        });
        records.repo::<AuditLog>().create(&entry).await?;

        records
            .publish_event(Event::new(EventType::new("tenant", "cloned"), &tenant).with_tenant(tenant.id.clone()))
            .await;

        tracing::info!(
            source = %source.id,
            tenant = %tenant.id,
            users_copied,
            webhooks_copied,
            "tenant cloned"
        );
        Ok(CloneSummary {
            tenant,
            users_copied,
            webhooks_copied,
        })
    }
}
