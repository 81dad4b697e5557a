//! Record lifecycle hooks.
//!
//! Hooks subscribe to the event bus and write follow-up records. They use
//! the same `RecordService` as everything else, so their writes publish
//! events too.

use async_trait::async_trait;
use owner_core::events::record_actions;
use owner_core::{
    AuditLog, Collection, Event, EventBus, EventError, EventHandler, Incident, RecordService, SYSTEM_ACTOR,
    Severity, SupportTicket, TicketPriority,
};
use serde_json::json;

/// Requester recorded on tickets opened for incidents.
pub const INCIDENT_REQUESTER: &str = "incidents@owner.local";

/// Writes an audit entry for every record change.
#[derive(Clone)]
pub struct AuditTrailHook {
    records: RecordService,
}

impl AuditTrailHook {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }
}

#[async_trait]
impl EventHandler for AuditTrailHook {
    fn id(&self) -> &str {
        "audit_trail"
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        let Some(collection) = event.collection.as_deref().and_then(|c| Collection::parse(c).ok()) else {
            return Ok(());
        };
        let action = event.event_type.action.as_str();
        if !collection.is_audited()
            || ![record_actions::CREATED, record_actions::UPDATED, record_actions::DELETED].contains(&action)
        {
            return Ok(());
        }

        let actor = event.actor.as_deref().unwrap_or(SYSTEM_ACTOR);
        let mut entry = AuditLog::new(
            actor,
            format!("{}.{}", collection.as_str(), action),
            collection.as_str(),
            event.record_id().unwrap_or_default(),
        );
        entry.tenant_id = event.tenant_id.clone();
        entry.details = json!({ "event_id": event.id });

        self.records.with_actor(actor).repo::<AuditLog>().create(&entry).await?;
        Ok(())
    }
}

/// Opens an urgent ticket for every tenant hit by a critical incident.
#[derive(Clone)]
pub struct IncidentTicketHook {
    records: RecordService,
}

impl IncidentTicketHook {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }
}

#[async_trait]
impl EventHandler for IncidentTicketHook {
    fn id(&self) -> &str {
        "incident_tickets"
    }

    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        let Some(incident) = event.record_as::<Incident>() else {
            return Err(EventError::UnexpectedPayload("incident event without an incident record".to_string()));
        };
        if incident.severity != Severity::Critical {
            return Ok(());
        }

        let records = self.records.with_actor(event.actor.as_deref().unwrap_or(SYSTEM_ACTOR));
        for tenant_id in &incident.affected_tenants {
            let mut ticket = SupportTicket::new(
                tenant_id,
                format!("[Incident] {}", incident.title),
                incident.description.clone(),
                INCIDENT_REQUESTER,
            );
            ticket.priority = TicketPriority::Urgent;
            ticket.tags = vec!["incident".to_string()];
            ticket.incident_id = Some(incident.id.clone());
            records.repo::<SupportTicket>().create(&ticket).await?;
        }

        tracing::info!(
            incident = %incident.id,
            tickets = incident.affected_tenants.len(),
            "opened tickets for critical incident"
        );
        Ok(())
    }
}

/// Registers the built-in hooks on `bus`.
pub async fn install(bus: &EventBus, records: &RecordService) {
    bus.on_all(AuditTrailHook::new(records.clone())).await;
    bus.on("incident.created", IncidentTicketHook::new(records.clone())).await;
}
