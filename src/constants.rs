pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "webm", "mov", "wmv", "flv", "m4v"];

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

pub mod transfer {
    use std::time::Duration;

    /// Object store content type for every transferred episode.
    pub const UPLOAD_CONTENT_TYPE: &str = "video/mp4";

    pub const DESTINATION_EXTENSION: &str = "mp4";

    pub const SEASON_DIR_PREFIX: &str = "sezon";

    pub const FALLBACK_SLUG: &str = "anime";

    pub const PERSIST_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
}

pub mod limits {
    pub const DEFAULT_LOG_LIMIT: u64 = 100;
}
