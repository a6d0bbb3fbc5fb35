/// Management-partition exclusion helpers shared by the inventory readers.
///
/// Patterns are comma-separated globs where `*` matches any substring
/// (including empty). Matching is case-insensitive; no other glob features
/// are supported.
// NovaLink hosts run a management partition per node (`ltc01-nova`, ...).
// It is never known to Nova and must never be offered for deletion.
pub const DEFAULT_MANAGEMENT_PARTITION_PATTERNS: &str = "*ltc*-nova*";

/// Parse comma-separated patterns.
///
/// - Trims whitespace
/// - Drops empty entries
/// - If input is empty/None, returns the default patterns
pub fn parse_partition_patterns(raw: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = raw
        .unwrap_or("")
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();

    if out.is_empty() {
        out = DEFAULT_MANAGEMENT_PARTITION_PATTERNS
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();
    }

    out
}

/// Return true if `text` matches at least one pattern.
pub fn matches_any_pattern(text: &str, patterns: &[String]) -> bool {
    let t = text.trim().to_ascii_lowercase();
    if t.is_empty() {
        return false;
    }

    patterns.iter().any(|pat| glob_match(&t, &pat.trim().to_ascii_lowercase()))
}

fn glob_match(text: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if !pattern.contains('*') {
        return text == pattern;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !text.starts_with(first) {
        return false;
    }
    let mut idx = first.len();

    // Middle parts must appear in order after the prefix.
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[idx..].find(part) {
            Some(pos) => idx += pos + part.len(),
            None => return false,
        }
    }

    // The suffix may not overlap what the prefix and middle parts consumed.
    text[idx..].ends_with(last)
}
