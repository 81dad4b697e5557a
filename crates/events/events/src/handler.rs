//! Hooks attached to the event bus.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::EventResult;
use crate::event::Event;

/// What happened when one hook saw one event.
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub hook: String,
    pub elapsed: Duration,
    /// `None` when the hook succeeded.
    pub error: Option<String>,
}

impl HookOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A subscriber on the [`EventBus`](crate::EventBus).
///
/// Hooks run after the mutation has been committed, so a failing hook
/// only produces a logged [`HookOutcome`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and outcomes.
    fn id(&self) -> &str {
        "hook"
    }

    async fn handle(&self, event: &Event) -> EventResult<()>;
}

pub type BoxedHandler = Box<dyn EventHandler>;
