use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

static INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9-._]").expect("static regex"));

/// Longest prefix of a correlation id kept in a directory name.
const MAX_NAME_LEN: usize = 64;

/// Transform a random string into something usable as a single path component
/// (only containing alpha/num, dashes, dots & underlines).
///
/// This function replaces invalid characters into double underlines `__`, and
/// prefixes names consisting of dots only, so `.` and `..` never come out.
pub fn transform_string_as_dir_name(s: &str) -> Cow<str> {
    let truncated = match s.char_indices().nth(MAX_NAME_LEN) {
        Some((idx, _)) => &s[..idx],
        None => s,
    };
    let replaced = INVALID_CHARS.replace_all(truncated, "__");
    if replaced.chars().all(|c| c == '.') {
        Cow::Owned(format!("job{}", replaced))
    } else {
        replaced
    }
}
