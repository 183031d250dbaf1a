use crate::config::Config;
use crate::db::Store;

pub async fn cmd_batches(config: &Config, limit: u64, anime: Option<&str>) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let batches = match anime {
        Some(anime_id) => store.batches_for_anime(anime_id).await?,
        None => store.recent_batches(limit).await?,
    };

    if batches.is_empty() {
        println!("No transfer batches recorded.");
        return Ok(());
    }

    println!("Transfer batches ({}):", batches.len());
    println!("{:-<70}", "");

    for batch in batches {
        println!(
            "• {} season {} [{}]",
            batch.anime_title, batch.season_number, batch.state
        );
        println!(
            "  {}/{} processed | {} ok, {} failed, {} skipped",
            batch.processed, batch.total, batch.successful, batch.failed, batch.skipped
        );
        println!(
            "  ID: {} | started {} | finished {}",
            batch.id,
            batch.started_at,
            batch.finished_at.as_deref().unwrap_or("-")
        );
        if let Some(error) = batch.error {
            println!("  Error: {error}");
        }
    }

    Ok(())
}
