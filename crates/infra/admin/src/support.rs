//! Support ticket workflow.

use chrono::Utc;
use owner_core::{
    Collection, ListQuery, ListResult, OwnerError, OwnerResult, RecordService, SupportTicket, TicketStatus, all_of,
    quote,
};
use serde_json::json;

use crate::forms;
use crate::tenants::open_ticket_filter;

#[derive(Clone)]
pub struct SupportService {
    records: RecordService,
}

impl SupportService {
    pub fn new(records: RecordService) -> Self {
        Self { records }
    }

    /// Validates and opens a ticket.
    pub async fn create(&self, ticket: &SupportTicket) -> OwnerResult<SupportTicket> {
        let record = owner_core::into_record(serde_json::to_value(ticket)?)?;
        forms::create_form(Collection::SupportTickets).validate(&record.into())?;
        let mut ticket = ticket.clone();
        ticket.status = TicketStatus::Open;
        self.records.repo::<SupportTicket>().create(&ticket).await
    }

    /// Moves a ticket along the workflow and stamps the milestone times.
    pub async fn transition(&self, id: &str, to: TicketStatus) -> OwnerResult<SupportTicket> {
        let tickets = self.records.repo::<SupportTicket>();
        let mut ticket = tickets.require(id).await?;
        let from = ticket.status;
        if !from.can_transition_to(to) {
            return Err(OwnerError::transition("support_ticket", from, to));
        }

        let now = Utc::now();
        if from == TicketStatus::Open && ticket.first_response_at.is_none() {
            ticket.first_response_at = Some(now);
        }
        match to {
            TicketStatus::Resolved => ticket.resolved_at = Some(now),
            TicketStatus::Closed => ticket.closed_at = Some(now),
            TicketStatus::Open => {
                ticket.resolved_at = None;
                ticket.closed_at = None;
            }
            TicketStatus::InProgress | TicketStatus::Waiting => {}
        }
        ticket.status = to;

        let ticket = tickets.update(&ticket).await?;
        tracing::debug!(ticket = %ticket.id, from = %from, to = %to, "ticket status changed");
        Ok(ticket)
    }

    /// Sets or clears the assignee.
    pub async fn assign(&self, id: &str, assignee: Option<&str>) -> OwnerResult<SupportTicket> {
        let assignee = assignee.map(str::trim).filter(|a| !a.is_empty());
        self.records
            .repo::<SupportTicket>()
            .patch(id, json!({ "assignee": assignee }))
            .await
    }

    pub async fn list_for_tenant(&self, tenant_id: &str, query: &ListQuery) -> OwnerResult<ListResult<SupportTicket>> {
        let mut query = query.clone();
        query.filter = Some(all_of([
            format!("tenant_id = {}", quote(tenant_id)),
            query.filter.unwrap_or_default(),
        ]));
        if query.sort.is_none() {
            query.sort = Some("-created_at".to_string());
        }
        self.records.repo::<SupportTicket>().list(&query).await
    }

    /// Tickets still needing work, for one tenant or all of them.
    pub async fn open_count(&self, tenant_id: Option<&str>) -> OwnerResult<usize> {
        let filter = all_of([
            tenant_id.map(|t| format!("tenant_id = {}", quote(t))).unwrap_or_default(),
            open_ticket_filter(),
        ]);
        self.records.repo::<SupportTicket>().count(Some(&filter)).await
    }
}
