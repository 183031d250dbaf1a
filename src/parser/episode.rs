use regex::Regex;
use std::sync::OnceLock;

fn digit_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+").expect("Invalid regex pattern defined in code"))
}

/// Derives an episode number from a file name.
///
/// Takes the first maximal run of ASCII digits anywhere in the name. This is
/// deliberately naive: `2024-episode-03.mp4` yields `2024`. Callers with
/// ambiguous names must normalise them first.
///
/// Returns `None` when the name has no digits, when the run is `0`, or when
/// it does not fit in a `u32`.
///
/// ```
/// use anikura::parser::episode::extract_episode_number;
///
/// assert_eq!(extract_episode_number("01.mp4"), Some(1));
/// assert_eq!(extract_episode_number("notes.mp4"), None);
/// ```
#[must_use]
pub fn extract_episode_number(file_name: &str) -> Option<u32> {
    let run = digit_run().find(file_name)?;
    match run.as_str().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}
