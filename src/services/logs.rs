use crate::db::Store;
use crate::domain::events::NotificationEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::error;

/// Persists bus events worth keeping into `system_logs`.
pub struct LogService {
    store: Store,
    event_bus: broadcast::Sender<NotificationEvent>,
}

struct LogEntry {
    level: &'static str,
    message: String,
    details: Option<String>,
}

impl LogService {
    #[must_use]
    pub const fn new(store: Store, event_bus: broadcast::Sender<NotificationEvent>) -> Self {
        Self { store, event_bus }
    }

    pub fn start_listener(self: Arc<Self>) {
        let mut rx = self.event_bus.subscribe();
        let service = self;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = service.handle_event(&event).await {
                            error!(error = %e, "Failed to save log");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        error!(count, "Log listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Log listener event bus closed");
                        break;
                    }
                }
            }
        });
    }

    async fn handle_event(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        let Some(entry) = describe(event)? else {
            return Ok(());
        };

        self.store
            .add_log(event.kind(), entry.level, &entry.message, entry.details)
            .await
    }
}

/// Log row for an event, or `None` for high-frequency events.
fn describe(event: &NotificationEvent) -> anyhow::Result<Option<LogEntry>> {
    let entry = match event {
        NotificationEvent::TransferProgress { .. } => return Ok(None),
        NotificationEvent::TransferStarted {
            title,
            season_number,
            total,
            ..
        } => LogEntry {
            level: "info",
            message: format!("Transfer started: {title} season {season_number}, {total} files"),
            details: Some(serde_json::to_string(event)?),
        },
        NotificationEvent::TransferFileFinished {
            file_name, outcome, ..
        } => LogEntry {
            level: if outcome.is_skip() {
                "info"
            } else if matches!(outcome, crate::models::transfer::FileOutcome::Successful) {
                "success"
            } else {
                "error"
            },
            message: format!("{file_name}: {}", outcome.as_str()),
            details: Some(serde_json::to_string(event)?),
        },
        NotificationEvent::TransferFinished { title, stats, .. } => LogEntry {
            level: if stats.failed > 0 { "warn" } else { "success" },
            message: format!(
                "Transfer finished: {title}, {} successful, {} failed, {} skipped",
                stats.successful, stats.failed, stats.skipped
            ),
            details: Some(serde_json::to_string(event)?),
        },
        NotificationEvent::TransferCancelled { stats, .. } => LogEntry {
            level: "warn",
            message: format!(
                "Transfer cancelled after {} of {} files",
                stats.processed, stats.total
            ),
            details: Some(serde_json::to_string(event)?),
        },
        NotificationEvent::Error { message } => LogEntry {
            level: "error",
            message: message.clone(),
            details: None,
        },
        NotificationEvent::Info { message } => LogEntry {
            level: "info",
            message: message.clone(),
            details: None,
        },
    };
    Ok(Some(entry))
}
