//! Episode file naming
//!
//! Builds the canonical base name used for every per-episode artifact
//! (temporary tracks as well as the final container).

/// Characters that cannot appear in a file name on at least one platform
const ILLEGAL_CHARACTERS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replaces characters that are illegal in file names with a single space
///
/// Every illegal character (`\ / : * ? " < > |`) is replaced 1-for-1, so the
/// result has the same number of characters as the input and everything else
/// stays where it was. Applying it twice gives the same result as once.
pub fn clean_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_CHARACTERS.contains(&c) { ' ' } else { c })
        .collect()
}

/// Formats the canonical file name for an episode
///
/// Produces `"<show> - S0<season>E0<episode> - <description>"` and sanitizes
/// the whole string. The `S0`/`E0` prefixes are literal, so a season of
/// `"12"` becomes `S012`.
///
/// # Arguments
///
/// * `show_title` - Series title
/// * `season` - Season number as shown on the site
/// * `episode` - Episode number as shown on the site
/// * `description` - Episode title
///
/// # Returns
///
/// The sanitized base name, without extension
///
/// # Examples
///
/// ```
/// use crunchyroll_dl::episode_file_name;
///
/// let name = episode_file_name("Show", "1", "2", "Desc");
/// assert_eq!(name, "Show - S01E02 - Desc");
/// ```
pub fn episode_file_name(show_title: &str, season: &str, episode: &str, description: &str) -> String {
    clean_file_name(&format!(
        "{show_title} - S0{season}E0{episode} - {description}"
    ))
}
