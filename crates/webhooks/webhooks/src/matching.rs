//! Which webhooks receive which events.

use owner_core::{Collection, Event, Webhook};
use serde_json::Value;

/// Whether any of the patterns matches an event type string.
///
/// Patterns: `*`, `namespace.*`, or an exact `namespace.action`.
pub fn pattern_matches(patterns: &[String], event: &Event) -> bool {
    patterns.iter().any(|p| event.event_type.matches(p.trim()))
}

/// Whether an active webhook should receive `event`.
///
/// Platform-wide webhooks see every tenant. A tenant webhook sees events of
/// its tenant, and incidents that list the tenant as affected.
pub fn webhook_matches(webhook: &Webhook, event: &Event) -> bool {
    if !webhook.active || !pattern_matches(&webhook.events, event) {
        return false;
    }

    let Some(tenant_id) = webhook.tenant_id.as_deref() else {
        return true;
    };
    if event.tenant_id.as_deref() == Some(tenant_id) {
        return true;
    }

    event.collection.as_deref() == Some(Collection::Incidents.as_str())
        && event
            .record
            .get("affected_tenants")
            .and_then(Value::as_array)
            .is_some_and(|tenants| tenants.iter().any(|t| t.as_str() == Some(tenant_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use owner_core::EventType;
    use serde_json::json;

    fn ticket_event(tenant: &str) -> Event {
        Event::for_record("support_tickets", "created", json!({"id": "t1", "tenant_id": tenant}))
    }

    #[test]
    fn test_patterns() {
        let event = ticket_event("ten_1");
        assert!(pattern_matches(&["*".into()], &event));
        assert!(pattern_matches(&["support_ticket.*".into()], &event));
        assert!(pattern_matches(&["invoice.paid".into(), "support_ticket.created".into()], &event));
        assert!(!pattern_matches(&["support_ticket.updated".into()], &event));
        assert!(!pattern_matches(&[], &event));
    }

    #[test]
    fn test_tenant_scope() {
        let event = ticket_event("ten_1");
        let global = Webhook::new("https://hooks.test/a", "s");
        assert!(webhook_matches(&global, &event));

        let mine = Webhook::new("https://hooks.test/b", "s").for_tenant("ten_1");
        assert!(webhook_matches(&mine, &event));

        let theirs = Webhook::new("https://hooks.test/c", "s").for_tenant("ten_2");
        assert!(!webhook_matches(&theirs, &event));

        let mut inactive = Webhook::new("https://hooks.test/d", "s");
        inactive.active = false;
        assert!(!webhook_matches(&inactive, &event));
    }

    #[test]
    fn test_incidents_reach_affected_tenants() {
        let event = Event::for_record(
            "incidents",
            "created",
            json!({"id": "i1", "severity": "critical", "affected_tenants": ["ten_1", "ten_3"]}),
        );
        let affected = Webhook::new("https://hooks.test/a", "s")
            .for_tenant("ten_3")
            .events(["incident.*"]);
        assert!(webhook_matches(&affected, &event));

        let unaffected = Webhook::new("https://hooks.test/b", "s").for_tenant("ten_2");
        assert!(!webhook_matches(&unaffected, &event));
    }

    #[test]
    fn test_custom_events() {
        let event = Event::new(EventType::new("tenant", "cloned"), json!({"id": "t2"})).with_tenant("t2");
        let hook = Webhook::new("https://hooks.test/a", "s").events(["tenant.cloned"]);
        assert!(webhook_matches(&hook, &event));
    }
}
