use crate::constants::transfer::{DESTINATION_EXTENSION, FALLBACK_SLUG, SEASON_DIR_PREFIX};

/// Turns an anime title into a stable object-store path segment.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single hyphen and trims hyphens from both ends. Titles with no usable
/// characters fall back to `anime`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Destination path of one episode: `{slug}/sezon-{season}/{episode}.mp4`.
///
/// A pure function of its inputs, so re-running a batch targets the same
/// object.
#[must_use]
pub fn destination_path(anime_title: &str, season_number: i32, episode_number: u32) -> String {
    format!(
        "{}/{SEASON_DIR_PREFIX}-{season_number}/{episode_number}.{DESTINATION_EXTENSION}",
        sanitize_name(anime_title)
    )
}
