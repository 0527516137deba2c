//! Terminal output cleanup
//!
//! The prompt heuristic is approximate: a line counts as a prompt when,
//! trimmed, it ends in `$`, `#` or `>` and contains `@` or `:`. Output that
//! happens to look like that is dropped, and unusual prompts survive.

use std::sync::OnceLock;

use regex::bytes::{NoExpand, Regex};

/// Substring present on marker lines and on the shell's echo of the
/// wrapped command
pub(crate) const MARKER_TAG: &[u8] = b"<<CMD:";

fn ansi_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // OSC: ESC ] ... BEL | ESC ] ... ESC \
            r"(?-u)\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
            // CSI: ESC [ params letter
            r"(?-u)\x1b\[[0-9;?]*[A-Za-z]",
            // Simple: cursor save/restore, keypad modes
            r"(?-u)\x1b[78=>]",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Remove ANSI escape sequences and carriage returns that rewrite a line
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    for pattern in ansi_patterns() {
        out = pattern.replace_all(&out, NoExpand(b"")).into_owned();
    }

    // Bare CR (not part of CRLF)
    let mut result = Vec::with_capacity(out.len());
    for (i, &b) in out.iter().enumerate() {
        if b == b'\r' && out.get(i + 1) != Some(&b'\n') {
            continue;
        }
        result.push(b);
    }
    result
}

/// Whether a line looks like a shell prompt
pub fn is_prompt_line(line: &[u8]) -> bool {
    let stripped = trim(line);
    match stripped.last() {
        Some(b'$' | b'#' | b'>') => stripped.iter().any(|&b| b == b'@' || b == b':'),
        _ => false,
    }
}

/// Clean the bytes captured between the start and end markers
///
/// Drops marker and echo lines and prompt-shaped lines, removes carriage
/// returns, and trims blank lines at both ends.
pub fn clean_output(raw: &[u8]) -> Vec<u8> {
    let text = strip_ansi(raw);

    let kept: Vec<Vec<u8>> = text
        .split(|&b| b == b'\n')
        .filter(|line| !contains(line, MARKER_TAG))
        .filter(|line| !is_prompt_line(line))
        .map(|line| line.iter().copied().filter(|&b| b != b'\r').collect())
        .collect();

    let first = kept.iter().position(|l| !trim(l).is_empty());
    let last = kept.iter().rposition(|l| !trim(l).is_empty());
    match (first, last) {
        (Some(first), Some(last)) => kept[first..=last].join(&b'\n'),
        _ => Vec::new(),
    }
}

/// Slice without leading and trailing ASCII whitespace
pub(crate) fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// First index of `needle` in `haystack`
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Last index of `needle` in `haystack`
pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(haystack.len());
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
