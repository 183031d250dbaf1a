use std::sync::Arc;

use crate::clients::drive::DriveClient;
use crate::config::Config;
use crate::parser::episode::extract_episode_number;
use crate::services::{DriveSource, RemoteSource};

/// Dry listing of a folder: what a transfer would attempt, and as which
/// episode.
pub async fn cmd_list_files(config: &Config, folder: &str) -> anyhow::Result<()> {
    let source: Arc<dyn RemoteSource> = Arc::new(DriveSource::new(DriveClient::new(
        reqwest::Client::new(),
        config.drive.clone(),
    )));

    let folder_id = source.normalize_folder_ref(folder);
    let files = source.list_video_files(&folder_id).await?;

    if files.is_empty() {
        println!("No video files in folder {folder_id}.");
        return Ok(());
    }

    println!("Folder {folder_id}: {} video files", files.len());
    println!("{:-<70}", "");

    for file in files {
        let episode = extract_episode_number(&file.name)
            .map_or_else(|| "skip".to_string(), |n| format!("ep {n}"));
        let size = file
            .size
            .map_or_else(|| "?".to_string(), |b| format!("{} MB", b / (1024 * 1024)));
        println!("{episode:>8}  {}  ({size})", file.name);
    }

    Ok(())
}
