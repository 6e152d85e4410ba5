use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const TOKEN_OPEN: &str = "__E#";
pub const TOKEN_CLOSE: &str = "__";

/// Marker wrapped around the id in the compact form sent to translators.
pub const SENTINEL_MARK: char = '\u{1F7E7}';

pub static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__E#([0-9]+)__").expect("token regex"));

static SENTINEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x{1F7E7}([0-9]+)\x{1F7E7}").expect("sentinel regex"));

const GAP: &str = r"[\s\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}]*";
const DIGITS: &str = r"(?P<id>[0-9\x{FF10}-\x{FF19}]+)";

// Every part of the token survived, but with junk inside.
static SPACED_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"_{GAP}_{GAP}[Ee]{GAP}[#\x{{FF03}}]{GAP}{DIGITS}{GAP}_{GAP}_"
    ))
    .expect("spaced token regex")
});

static SPACED_SENTINEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\x{{1F7E7}}{GAP}{DIGITS}{GAP}\x{{1F7E7}}"))
        .expect("spaced sentinel regex")
});

// Underscores partially stripped, or the whole token in full-width/lower case.
static LOOSE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?P<lead>_{{0,2}})[Ee][#\x{{FF03}}]{DIGITS}(?P<trail>_{{0,2}})"
    ))
    .expect("loose token regex")
});

#[must_use]
pub fn make_token(id: u64) -> String {
    format!("{TOKEN_OPEN}{id}{TOKEN_CLOSE}")
}

/// Numeric id of a canonical token.
#[must_use]
pub fn token_id(token: &str) -> Option<u64> {
    let caps = TOKEN_RE.captures(token)?;
    if caps.get(0)?.as_str().len() != token.len() {
        return None;
    }
    caps.get(1)?.as_str().parse().ok()
}

pub fn token_ids(text: &str) -> Vec<u64> {
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect()
}

pub fn encode_sentinels(text: &str) -> String {
    TOKEN_RE
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{SENTINEL_MARK}{}{SENTINEL_MARK}", &caps[1])
        })
        .into_owned()
}

pub fn decode_sentinels(text: &str) -> String {
    SENTINEL_RE
        .replace_all(text, |caps: &Captures<'_>| make_token_str(&caps[1]))
        .into_owned()
}

fn make_token_str(digits: &str) -> String {
    format!("{TOKEN_OPEN}{digits}{TOKEN_CLOSE}")
}

fn parse_id(digits: &str) -> Option<u64> {
    let ascii: String = digits
        .chars()
        .map(|c| match c {
            '\u{FF10}'..='\u{FF19}' => char::from(b'0' + (c as u32 - 0xFF10) as u8),
            _ => c,
        })
        .collect();
    ascii.parse().ok()
}

/// Rewrites every match of `re` whose id is known and which `accept` agrees to.
fn rewrite_known(
    text: &str,
    re: &Regex,
    known: &HashSet<u64>,
    accept: impl Fn(&Captures<'_>) -> bool,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    for caps in re.captures_iter(text) {
        let Some(m) = caps.get(0) else {
            continue;
        };
        let Some(id) = caps.name("id").and_then(|d| parse_id(d.as_str())) else {
            continue;
        };
        if !known.contains(&id) || !accept(&caps) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(&make_token(id));
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Recovers tokens a translator damaged, for ids in `known` only.
pub fn repair_damaged_tokens(text: &str, known: &HashSet<u64>) -> String {
    if text.is_empty() || known.is_empty() {
        return text.to_string();
    }
    let text = rewrite_known(text, &SPACED_TOKEN_RE, known, |_| true);
    let text = rewrite_known(&text, &SPACED_SENTINEL_RE, known, |_| true);
    rewrite_known(&text, &LOOSE_TOKEN_RE, known, |caps| {
        loose_match_is_damaged(&text, caps)
    })
}

fn loose_match_is_damaged(text: &str, caps: &Captures<'_>) -> bool {
    let (Some(m), Some(lead), Some(trail), Some(id)) =
        (caps.get(0), caps.name("lead"), caps.name("trail"), caps.name("id"))
    else {
        return false;
    };
    let before = text[..m.start()].chars().next_back();
    let after = text[m.end()..].chars().next();
    if before == Some('_') || after == Some('_') {
        return false;
    }
    if lead.as_str().is_empty() && before.is_some_and(|c| c.is_alphanumeric()) {
        return false;
    }
    if trail.as_str().is_empty() && after.is_some_and(|c| c.is_alphanumeric()) {
        return false;
    }
    let canonical = lead.len() == 2
        && trail.len() == 2
        && m.as_str().contains('E')
        && m.as_str().contains('#')
        && id.as_str().bytes().all(|b| b.is_ascii_digit());
    !canonical
}
