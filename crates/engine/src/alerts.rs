use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use common::{AlertPriority, AlertSink, Result};

/// Alert sink that writes alerts to the log. Used when no external sink is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, message: &str, priority: AlertPriority) -> Result<()> {
        match priority {
            AlertPriority::Normal => info!(%priority, "ALERT: {message}"),
            AlertPriority::Critical => warn!(%priority, "ALERT: {message}"),
        }
        Ok(())
    }
}

/// Send an alert on its own task. Delivery failures are logged and never
/// reach the caller.
pub fn dispatch(sink: &Arc<dyn AlertSink>, message: String, priority: AlertPriority) {
    let sink = sink.clone();
    tokio::spawn(async move {
        if let Err(e) = sink.notify(&message, priority).await {
            warn!(error = %e, %priority, "Alert undeliverable");
        }
    });
}
