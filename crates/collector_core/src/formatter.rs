use sha2::{Digest, Sha256};
use url::Url;

/// Derives a deterministic, human-stable artifact name from a URL.
///
/// Formatters are pure and total: absent path segments or query parameters
/// simply contribute nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFormatter {
    /// Joins the non-empty path segments in `[start, stop)` with `-`,
    /// slice-style (negative indices count from the end), stripping a
    /// trailing `.json` extension.
    Components { start: isize, stop: Option<isize> },
    /// Joins `key-value` pairs, in the given key order, for each occurrence
    /// of each key in the query string.
    Parameters(Vec<String>),
    /// Concatenates the outputs of several formatters with `-`.
    Join(Vec<NameFormatter>),
}

impl NameFormatter {
    pub fn components(start: isize, stop: impl Into<Option<isize>>) -> Self {
        NameFormatter::Components {
            start,
            stop: stop.into(),
        }
    }

    pub fn parameters<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameFormatter::Parameters(keys.into_iter().map(Into::into).collect())
    }

    pub fn join(parts: Vec<NameFormatter>) -> Self {
        NameFormatter::Join(parts)
    }

    pub fn format(&self, url: &Url) -> String {
        match self {
            NameFormatter::Components { start, stop } => {
                let segments: Vec<&str> = url
                    .path_segments()
                    .map(|segments| segments.filter(|s| !s.is_empty()).collect())
                    .unwrap_or_default();
                let len = segments.len();
                let lo = clamp_index(*start, len);
                let hi = stop.map_or(len, |stop| clamp_index(stop, len));
                let joined = if lo < hi {
                    segments[lo..hi].join("-")
                } else {
                    String::new()
                };
                joined
                    .strip_suffix(".json")
                    .map(str::to_string)
                    .unwrap_or(joined)
            }
            NameFormatter::Parameters(keys) => {
                let mut parts = Vec::new();
                for key in keys {
                    for (k, v) in url.query_pairs() {
                        if k == *key {
                            parts.push(format!("{key}-{v}"));
                        }
                    }
                }
                parts.join("-")
            }
            NameFormatter::Join(formatters) => {
                let parts: Vec<String> = formatters
                    .iter()
                    .map(|f| f.format(url))
                    .filter(|s| !s.is_empty())
                    .collect();
                parts.join("-")
            }
        }
    }
}

/// Slice-style index resolution: negative indices count from the end, and
/// out-of-range indices clamp instead of failing.
fn clamp_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

/// Filesystem-safe artifact name: the sanitized formatter output plus a
/// short hash of the full URL, so names stay collision-resistant within a
/// crawl even when two URLs format identically.
pub fn file_safe_name(formatter: &NameFormatter, url: &Url) -> String {
    let base = sanitize(&formatter.format(url));
    let hash = short_hash(url.as_str());
    if base.is_empty() {
        hash
    } else {
        format!("{base}--{hash}")
    }
}

fn sanitize(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.trim_matches(&['_', ' ', '.'][..]).chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    if compacted.len() > 80 {
        compacted.truncate(80);
    }
    compacted
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
