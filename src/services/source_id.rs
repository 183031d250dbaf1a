use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const RANDOM_SUFFIX_LEN: usize = 9;

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..RANDOM_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}

/// Mints `{tag}-{unix_millis}-{9 base36 chars}`, regenerating until the id
/// is absent from `existing`.
///
/// `existing` should hold every `sourceId` of the anime's episode tree (see
/// `AnimeDocument::source_ids`).
#[must_use]
pub fn generate_source_id(tag: &str, existing: &HashSet<String>) -> String {
    loop {
        let candidate = format!(
            "{tag}-{}-{}",
            Utc::now().timestamp_millis(),
            random_suffix()
        );
        if !existing.contains(&candidate) {
            return candidate;
        }
    }
}
