use tokio::sync::broadcast;

use crate::config::Config;
use crate::domain::AnimeId;
use crate::domain::events::NotificationEvent;
use crate::models::transfer::VideoSourceDefaults;
use crate::state::SharedState;

/// Runs one batch in this process and prints per-file results as they
/// arrive. Ctrl+C requests cancellation; the file in flight still finishes.
pub async fn cmd_transfer(
    config: Config,
    anime_id: &str,
    season: i32,
    folder: &str,
    defaults: VideoSourceDefaults,
) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;
    let mut events = state.event_bus.subscribe();

    let started = state
        .transfers
        .start_bulk_transfer(&AnimeId::new(anime_id), season, folder, defaults)
        .await?;

    let accepted = &started.accepted;
    println!("{}", accepted.message);
    println!("Batch: {}", accepted.batch_id);
    for name in &accepted.files {
        println!("  {name}");
    }
    println!("{:-<70}", "");

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(NotificationEvent::TransferFileFinished {
                    file_name,
                    outcome,
                    stats,
                    ..
                }) => {
                    println!(
                        "[{}/{}] {file_name}: {}",
                        stats.processed,
                        stats.total,
                        outcome.as_str()
                    );
                }
                Ok(
                    NotificationEvent::TransferFinished { .. }
                    | NotificationEvent::TransferCancelled { .. },
                )
                | Err(broadcast::error::RecvError::Closed) => break,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    });

    let batch_id = accepted.batch_id.clone();
    let mut worker = started.worker;
    let status = tokio::select! {
        status = &mut worker => status?,
        _ = tokio::signal::ctrl_c() => {
            println!("Cancelling after the current file...");
            state.transfers.cancel_batch(&batch_id).await?;
            worker.await?
        }
    };
    // The finish event precedes the worker's return; give the printer a moment to drain.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), printer).await;

    let stats = status.stats;
    println!("{:-<70}", "");
    println!(
        "Batch {}: {} successful, {} failed, {} skipped of {} ({}s)",
        status.state.as_str(),
        stats.successful,
        stats.failed,
        stats.skipped,
        stats.total,
        status.elapsed_seconds
    );
    for report in status.files.iter().filter(|r| r.detail.is_some()) {
        println!(
            "  {}: {}",
            report.file_name,
            report.detail.as_deref().unwrap_or_default()
        );
    }

    Ok(())
}
