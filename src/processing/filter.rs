//! Selection of batch inputs from a directory listing

use crate::processing::formats::is_supported_input_format;

/// Leading character of hidden entries
pub const HIDDEN_MARKER: char = '.';

/// Lower-cased text after the last `.`, or `None` when the name has no dot
pub fn extension_of(name: &str) -> Option<String> {
    name.rfind('.').map(|dot| name[dot + 1..].to_lowercase())
}

/// Whether a directory entry name is hidden
pub fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_MARKER)
}

/// Whether a single entry name passes the filter
pub fn is_batch_input(name: &str) -> bool {
    !is_hidden(name)
        && extension_of(name)
            .map(|ext| is_supported_input_format(&ext))
            .unwrap_or(false)
}

/// Keep the non-hidden `gif`/`webp` names, in input order
pub fn filter_entries<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter(|name| is_batch_input(name.as_ref()))
        .map(|name| name.as_ref().to_string())
        .collect()
}
