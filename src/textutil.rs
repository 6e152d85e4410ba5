use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::sentinels::TOKEN_RE;

pub const NBSP: char = '\u{00A0}';

static PUNCT_OR_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{P}\p{S}]$").expect("punct regex"));

/// Whitespace as the translators return it: Unicode spaces plus the zero-width family.
#[inline]
pub fn is_space_like(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}')
}

#[inline]
pub fn is_punct_or_symbol(c: char) -> bool {
    let mut buf = [0u8; 4];
    PUNCT_OR_SYMBOL_RE.is_match(c.encode_utf8(&mut buf))
}

/// Whitespace or punctuation: no guard is ever needed next to these.
#[inline]
pub fn is_boundary(c: char) -> bool {
    is_space_like(c) || is_punct_or_symbol(c)
}

#[inline]
pub fn is_sentence_boundary(c: char) -> bool {
    matches!(
        c,
        '.' | '!' | '?' | '。' | '！' | '？' | '…' | '\u{FF0E}' | '\u{FF61}'
    )
}

#[inline]
pub fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Han, kana and Hangul.
#[inline]
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{1100}'..='\u{11FF}'
        | '\u{3130}'..='\u{318F}'
        | '\u{AC00}'..='\u{D7A3}')
}

#[inline]
pub fn is_letter_like(c: char) -> bool {
    c.is_alphanumeric()
}

#[inline]
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn strip_tokens(text: &str) -> String {
    TOKEN_RE.replace_all(text, "").into_owned()
}

/// True when nothing but punctuation, symbols and whitespace is left (empty counts).
pub fn is_punct_or_space_only(text: &str) -> bool {
    text.chars().all(|c| is_boundary(c))
}

pub fn nfc(text: &str) -> String {
    text.nfc().collect()
}

#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[inline]
pub fn char_before(text: &str, at: usize) -> Option<char> {
    text[..at].chars().next_back()
}

#[inline]
pub fn char_after(text: &str, at: usize) -> Option<char> {
    text[at..].chars().next()
}
