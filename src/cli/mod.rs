//! Command-line interface, parsed with clap.

mod commands;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use crate::models::anime::{Language, Quality, SubtitleKind};
use crate::models::transfer::VideoSourceDefaults;

/// Anikura - bulk video ingestion for an anime catalog
#[derive(Parser)]
#[command(name = "anikura")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and background services
    #[command(alias = "daemon", alias = "-d")]
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Transfer every video of a drive folder into a season, in the foreground
    Transfer {
        /// Anime document id
        anime_id: String,
        /// Target season number
        season: i32,
        /// Drive folder id or URL
        folder: String,
        #[command(flatten)]
        defaults: SourceDefaultsArgs,
    },

    /// List the video files of a drive folder with their episode numbers
    #[command(alias = "ls-files")]
    ListFiles {
        /// Drive folder id or URL
        folder: String,
    },

    /// List anime documents in the catalog
    #[command(alias = "ls")]
    List,

    /// Show persisted batch history
    #[command(alias = "history")]
    Batches {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        limit: u64,
        /// Only batches for this anime id
        #[arg(long)]
        anime: Option<String>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct SourceDefaultsArgs {
    /// 360p, 480p, 720p, 1080p or 4K
    #[arg(long, value_parser = parse_serde::<Quality>, default_value = "720p")]
    pub quality: Quality,
    /// TR, JP or EN
    #[arg(long, value_parser = parse_serde::<Language>, default_value = "TR")]
    pub language: Language,
    /// subbed or dubbed
    #[arg(long = "type", value_parser = parse_serde::<SubtitleKind>, default_value = "subbed")]
    pub kind: SubtitleKind,
    /// Fansub group id recorded on every source
    #[arg(long)]
    pub fansub: Option<String>,
}

impl From<SourceDefaultsArgs> for VideoSourceDefaults {
    fn from(args: SourceDefaultsArgs) -> Self {
        Self {
            quality: args.quality,
            language: args.language,
            kind: args.kind,
            fansub: args.fansub,
        }
    }
}

/// Parses a CLI value with the same spelling the JSON API accepts.
fn parse_serde<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unsupported value '{raw}'"))
}

pub use commands::*;
