//! Incident response timeline.

use chrono::{Duration, Utc};
use owner_core::{
    Collection, Incident, IncidentStatus, IncidentUpdate, OwnerError, OwnerResult, RecordService, Severity, quote,
};
use serde::{Deserialize, Serialize};

use crate::forms;

/// Input for [`IncidentService::open`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub affected_tenants: Vec<String>,
}

/// How long a resolved incident lasted.
pub fn incident_duration(incident: &Incident) -> Option<Duration> {
    incident.resolved_at.map(|resolved| resolved - incident.started_at)
}

#[derive(Clone)]
pub struct IncidentService {
    records: RecordService,
}

impl IncidentService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    /// Opens an incident in `investigating`, with the description as the
    /// first timeline entry.
    pub async fn open(&self, input: NewIncident) -> OwnerResult<Incident> {
        forms::create_form(Collection::Incidents).validate(&serde_json::to_value(&input)?)?;

        let now = Utc::now();
        let mut affected = input.affected_tenants;
        affected.sort();
        affected.dedup();

        let incident = Incident {
            title: input.title.trim().to_string(),
            description: input.description.clone(),
            severity: input.severity,
            status: IncidentStatus::Investigating,
            affected_tenants: affected,
            updates: vec![IncidentUpdate {
                status: IncidentStatus::Investigating,
                message: input.description,
                author: self.records.actor().to_string(),
                created_at: now,
            }],
            started_at: now,
            ..Default::default()
        };
        let incident = self.records.repo::<Incident>().create(&incident).await?;
        tracing::info!(
            incident = %incident.id,
            severity = %incident.severity,
            affected = incident.affected_tenants.len(),
            "incident opened"
        );
        Ok(incident)
    }

    /// Appends a timeline entry and moves the incident to `status`.
    ///
    /// Resolved incidents accept no further updates.
    pub async fn post_update(
        &self,
        id: &str,
        status: IncidentStatus,
        message: &str,
        author: &str,
    ) -> OwnerResult<Incident> {
        if message.trim().is_empty() {
            return Err(OwnerError::MissingField {
                field: "message".to_string(),
            });
        }
        let incidents = self.records.repo::<Incident>();
        let mut incident = incidents.require(id).await?;
        if incident.status == IncidentStatus::Resolved {
            return Err(OwnerError::transition("incident", incident.status, status));
        }

        let now = Utc::now();
        incident.updates.push(IncidentUpdate {
            status,
            message: message.trim().to_string(),
            author: author.to_string(),
            created_at: now,
        });
        incident.status = status;
        if status == IncidentStatus::Resolved {
            incident.resolved_at = Some(now);
        }

        let incident = incidents.update(&incident).await?;
        if status == IncidentStatus::Resolved {
            tracing::info!(incident = %incident.id, "incident resolved");
        }
        Ok(incident)
    }

    /// Unresolved incidents, oldest first.
    pub async fn active(&self) -> OwnerResult<Vec<Incident>> {
        let filter = format!("status != {}", quote(IncidentStatus::Resolved.as_str()));
        self.records.repo::<Incident>().full_list(Some(&filter)).await
    }

    /// Unresolved incidents touching one tenant.
    pub async fn active_for_tenant(&self, tenant_id: &str) -> OwnerResult<Vec<Incident>> {
        let filter = format!(
            "status != {} && affected_tenants ?= {}",
            quote(IncidentStatus::Resolved.as_str()),
            quote(tenant_id)
        );
        self.records.repo::<Incident>().full_list(Some(&filter)).await
    }
}
