//! Pulls redemption-code candidates out of free-form chat text.
//!
//! Drop announcements are noisy: emoji, links, the code split in two
//! halves, a prefix in any case. Every pattern below is tried, each hit is
//! normalized, and only strings with the shape of a real code survive.

use std::collections::BTreeSet;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use grabbot_common::models::Code;

/// Patterns whose whole match (or first group) is a candidate.
const SINGLE_PATTERNS: [&str; 5] = [
    // bare run, any case
    r"(?i)\b[A-Z0-9]{8,10}\b",
    r"(?i)\bcode\s*:?\s*([A-Z0-9]{8,10})\b",
    r"(?i)🔑\s*(?:code\s*:?\s*)?([A-Z0-9]{8,10})\b",
    r"(?i)\bred\s*pack(?:et)?\s*code\s*:?\s*([A-Z0-9]{8,10})\b",
    // alone on its line
    r"(?m)^[ \t]*([A-Za-z0-9]{8,10})[ \t]*$",
];

static SINGLE: Lazy<Vec<Regex>> = Lazy::new(|| {
    SINGLE_PATTERNS
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Skipping code pattern '{}': {}", p, e);
                None
            }
        })
        .collect()
});

/// `AB3D-9F8K` anywhere.
static SPLIT_DASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z0-9]{4})-([A-Z0-9]{4})\b")
        .unwrap_or_else(|_| Regex::new("never match").unwrap())
});

/// `Code: AB3D 9F8K`. Space-joined halves only count after a prefix;
/// elsewhere they are amounts and tickers ("1000 USDT").
static SPLIT_SPACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bcode\s*:?|🔑)\s*([A-Z0-9]{4}) ([A-Z0-9]{4})\b")
        .unwrap_or_else(|_| Regex::new("never match").unwrap())
});

/// Every valid code mentioned in `text`, sorted. Empty when nothing
/// qualifies.
pub fn extract(text: &str) -> BTreeSet<Code> {
    let mut found = BTreeSet::new();
    if text.trim().is_empty() {
        return found;
    }

    for re in SINGLE.iter() {
        for caps in re.captures_iter(text) {
            let raw = caps.get(1).or_else(|| caps.get(0));
            if let Some(m) = raw {
                keep_if_valid(&mut found, m.as_str());
            }
        }
    }

    for split in [&*SPLIT_DASH, &*SPLIT_SPACE] {
        for caps in split.captures_iter(text) {
            let joined = format!("{}{}", &caps[1], &caps[2]);
            keep_if_valid(&mut found, &joined);
        }
    }

    if !found.is_empty() {
        debug!("Extracted {} code(s) from message", found.len());
    }
    found
}

fn keep_if_valid(found: &mut BTreeSet<Code>, candidate: &str) {
    if let Ok(code) = Code::parse(candidate) {
        found.insert(code);
    }
}
