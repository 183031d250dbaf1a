use crate::config::Config;
use crate::db::Store;

pub async fn cmd_list_anime(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let documents = store.list_anime().await?;

    if documents.is_empty() {
        println!("The catalog is empty.");
        return Ok(());
    }

    println!("Catalog ({} anime)", documents.len());
    println!("{:-<70}", "");

    for doc in documents {
        let seasons: Vec<String> = doc
            .seasons
            .iter()
            .map(|s| format!("S{} ({} eps)", s.season_number, s.episodes.len()))
            .collect();
        println!("• {}", doc.display_title());
        println!("  ID: {} | {}", doc.id, seasons.join(", "));
    }

    Ok(())
}
