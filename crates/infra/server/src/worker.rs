//! Background webhook retries.

use owner_webhooks::WebhookDispatcher;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs due webhook retries every `interval` until `shutdown` flips.
pub fn spawn_retry_worker(
    dispatcher: WebhookDispatcher,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "webhook retry worker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = dispatcher.process_due().await {
                        tracing::warn!(error = %e, "webhook retry sweep failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("webhook retry worker stopped");
    })
}
