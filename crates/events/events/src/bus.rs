//! In-process fan-out of lifecycle events to hooks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::event::Event;
use crate::handler::{BoxedHandler, EventHandler, HookOutcome};

const DEFAULT_HISTORY: usize = 1000;

/// How [`EventBus::emit`] runs the matching hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// One task per hook; `emit` returns before they finish.
    Spawned,
    /// Awaited one after another, in subscription order.
    Inline,
}

struct Subscription {
    pattern: String,
    handler: Arc<BoxedHandler>,
}

/// Routes each emitted [`Event`] to every hook whose pattern matches it.
///
/// Patterns are `*`, `resource.*` or an exact `resource.action`. Hook
/// failures are logged and reported, never propagated to the emitter.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    /// Oldest first, capped at `history_limit`.
    history: RwLock<VecDeque<Event>>,
    history_limit: usize,
    dispatch: Dispatch,
}

impl EventBus {
    /// A bus that spawns hooks and keeps the last 1000 events.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_HISTORY, Dispatch::Spawned)
    }

    /// A bus whose `emit` finishes every hook before returning.
    pub fn sequential() -> Self {
        Self::with_config(DEFAULT_HISTORY, Dispatch::Inline)
    }

    /// `history_limit: 0` disables history.
    pub fn with_config(history_limit: usize, dispatch: Dispatch) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            history_limit,
            dispatch,
        }
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    pub async fn on(&self, pattern: &str, handler: impl EventHandler + 'static) {
        self.subscriptions.write().await.push(Subscription {
            pattern: pattern.to_string(),
            handler: Arc::new(Box::new(handler)),
        });
    }

    pub async fn on_all(&self, handler: impl EventHandler + 'static) {
        self.on("*", handler).await;
    }

    pub async fn emit(&self, event: Event) {
        match self.dispatch {
            Dispatch::Inline => {
                self.emit_sync(event).await;
            }
            Dispatch::Spawned => {
                self.remember(&event).await;
                for handler in self.matching(&event).await {
                    let event = event.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(&event).await {
                            log_failure(handler.id(), &event, &e);
                        }
                    });
                }
            }
        }
    }

    /// Runs every matching hook in order and reports each outcome.
    pub async fn emit_sync(&self, event: Event) -> Vec<HookOutcome> {
        self.remember(&event).await;

        let mut outcomes = Vec::new();
        for handler in self.matching(&event).await {
            let started = Instant::now();
            let result = handler.handle(&event).await;
            if let Err(e) = &result {
                log_failure(handler.id(), &event, e);
            }
            outcomes.push(HookOutcome {
                hook: handler.id().to_string(),
                elapsed: started.elapsed(),
                error: result.err().map(|e| e.to_string()),
            });
        }
        outcomes
    }

    /// Newest first.
    pub async fn recent_events(&self, count: usize) -> Vec<Event> {
        self.history.read().await.iter().rev().take(count).cloned().collect()
    }

    /// Oldest first.
    pub async fn events_matching(&self, pattern: &str) -> Vec<Event> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| e.event_type.matches(pattern))
            .cloned()
            .collect()
    }

    /// Hooks registered under exactly `pattern`.
    pub async fn subscriber_count(&self, pattern: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.pattern == pattern)
            .count()
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    async fn remember(&self, event: &Event) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.write().await;
        if history.len() == self.history_limit {
            history.pop_front();
        }
        history.push_back(event.clone());
    }

    // Snapshot taken under the read lock so hooks are free to emit.
    async fn matching(&self, event: &Event) -> Vec<Arc<BoxedHandler>> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| event.event_type.matches(&s.pattern))
            .map(|s| s.handler.clone())
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn log_failure(hook: &str, event: &Event, error: &crate::EventError) {
    tracing::error!(hook, event = %event.event_type, error = %error, "event hook failed");
}
