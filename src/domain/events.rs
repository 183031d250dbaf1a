//! Domain events for the application.
//!
//! Events are sent over the event bus, streamed to SSE clients and persisted
//! to the system log table.

use serde::Serialize;

use crate::models::transfer::{FileOutcome, TransferStats};

/// Events sent to connected clients via SSE (Server-Sent Events).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationEvent {
    TransferStarted {
        batch_id: String,
        anime_id: String,
        title: String,
        season_number: i32,
        total: usize,
    },
    TransferProgress {
        batch_id: String,
        file_name: String,
        uploaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    TransferFileFinished {
        batch_id: String,
        file_name: String,
        episode_number: Option<u32>,
        outcome: FileOutcome,
        stats: TransferStats,
    },
    TransferFinished {
        batch_id: String,
        anime_id: String,
        title: String,
        stats: TransferStats,
        elapsed_seconds: u64,
    },
    TransferCancelled {
        batch_id: String,
        stats: TransferStats,
    },

    Error {
        message: String,
    },
    Info {
        message: String,
    },
}

impl NotificationEvent {
    /// Variant name, used as the `event_type` of persisted log rows.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransferStarted { .. } => "TransferStarted",
            Self::TransferProgress { .. } => "TransferProgress",
            Self::TransferFileFinished { .. } => "TransferFileFinished",
            Self::TransferFinished { .. } => "TransferFinished",
            Self::TransferCancelled { .. } => "TransferCancelled",
            Self::Error { .. } => "Error",
            Self::Info { .. } => "Info",
        }
    }
}
