use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::glossary::GlossaryEntry;
use crate::ir::{shift_spans, RangeKind, TermRange};
use crate::particles::{final_sound, FinalSound};
use crate::pieces::{Piece, SegmentPieces};
use crate::sentinels::{make_token, token_id, TOKEN_RE};
use crate::textutil::{
    char_after, char_before, is_boundary, is_cjk, is_letter_like, is_punct_or_space_only,
    is_punct_or_symbol, is_sentence_boundary, strip_tokens, NBSP,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSpacing {
    #[default]
    Disabled,
    /// Pad tokens next to punctuation in paragraphs that hold nothing else.
    IsolatedSegments,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LockInfo {
    pub placeholder: String,
    pub target: String,
    pub ends_with_batchim: bool,
    pub ends_with_rieul: bool,
    pub is_appellation: bool,
}

impl LockInfo {
    fn new(placeholder: String, entry: &GlossaryEntry) -> Self {
        let sound = final_sound(&entry.target);
        Self {
            placeholder,
            target: entry.target.clone(),
            ends_with_batchim: sound.has_batchim,
            ends_with_rieul: sound.is_rieul,
            is_appellation: entry.is_appellation,
        }
    }

    #[must_use]
    pub fn final_sound(&self) -> FinalSound {
        FinalSound {
            has_batchim: self.ends_with_batchim,
            is_rieul: self.ends_with_rieul,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MaskedPack {
    pub segment_id: String,
    pub masked: String,
    pub locks: BTreeMap<String, LockInfo>,
    pub token_entries: BTreeMap<String, GlossaryEntry>,
    pub ranges: Vec<TermRange>,
}

impl MaskedPack {
    #[must_use]
    pub fn issued_ids(&self) -> HashSet<u64> {
        self.locks.keys().filter_map(|t| token_id(t)).collect()
    }

    /// Tokens sorted by their numeric id.
    #[must_use]
    pub fn tokens_in_issue_order(&self) -> Vec<&str> {
        let mut tokens: Vec<(u64, &str)> = self
            .locks
            .keys()
            .filter_map(|t| token_id(t).map(|id| (id, t.as_str())))
            .collect();
        tokens.sort_unstable();
        tokens.into_iter().map(|(_, t)| t).collect()
    }
}

/// Owns the token counter. One engine per worker, or share it behind a `Mutex`.
#[derive(Debug)]
pub struct MaskingEngine {
    spacing: TokenSpacing,
    next_id: u64,
}

impl Default for MaskingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskingEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::with_spacing(TokenSpacing::Disabled)
    }

    #[must_use]
    pub fn with_spacing(spacing: TokenSpacing) -> Self {
        Self { spacing, next_id: 1 }
    }

    #[must_use]
    pub fn spacing(&self) -> TokenSpacing {
        self.spacing
    }

    /// Id the next issued token will carry.
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    fn issue_token(&mut self) -> String {
        let token = make_token(self.next_id);
        self.next_id += 1;
        token
    }

    pub fn mask_from_pieces(&mut self, pieces: &SegmentPieces) -> MaskedPack {
        let mut masked = String::with_capacity(pieces.original_text.len());
        let mut ranges: Vec<TermRange> = Vec::new();
        let mut locks = BTreeMap::new();
        let mut token_entries = BTreeMap::new();
        let mut guarded: Vec<Range<usize>> = Vec::new();

        for piece in &pieces.pieces {
            match piece {
                Piece::Text { .. } => masked.push_str(pieces.text_of(piece)),
                Piece::Term { entry, .. } if entry.pre_mask => {
                    let token = self.issue_token();
                    let start = masked.len();
                    masked.push_str(&token);
                    let span = start..masked.len();
                    if entry.is_appellation {
                        guarded.push(span.clone());
                    }
                    ranges.push(TermRange::new(entry.clone(), span, RangeKind::Masked));
                    locks.insert(token.clone(), LockInfo::new(token.clone(), entry));
                    token_entries.insert(token, entry.clone());
                }
                Piece::Term { entry, .. } => {
                    let start = masked.len();
                    masked.push_str(pieces.text_of(piece));
                    let span = start..masked.len();
                    ranges.push(TermRange::new(entry.clone(), span, RangeKind::Normalized));
                }
            }
        }

        let guards = appellation_guards(&masked, &guarded);
        insert_all(&mut masked, &mut ranges, guards, NBSP.encode_utf8(&mut [0u8; 4]));
        if self.spacing == TokenSpacing::IsolatedSegments {
            let pads = isolated_token_padding(&masked);
            insert_all(&mut masked, &mut ranges, pads, " ");
        }

        debug!(
            segment = %pieces.segment_id,
            tokens = locks.len(),
            next_id = self.next_id,
            "masked segment"
        );
        MaskedPack {
            segment_id: pieces.segment_id.clone(),
            masked,
            locks,
            token_entries,
            ranges,
        }
    }
}

fn needs_guard(adjacent: Option<char>, beyond: Option<char>, right_side: bool) -> bool {
    let Some(c) = adjacent else {
        return false;
    };
    if is_boundary(c) {
        return false;
    }
    if is_cjk(c) {
        return true;
    }
    if is_letter_like(c) && beyond.is_some_and(is_sentence_boundary) {
        return true;
    }
    right_side && c.is_ascii_alphanumeric()
}

/// Offsets where a guard goes, computed on the unguarded text.
fn appellation_guards(text: &str, spans: &[Range<usize>]) -> Vec<usize> {
    let mut at = Vec::new();
    for span in spans {
        let mut before = text[..span.start].chars().rev();
        let (b1, b2) = (before.next(), before.next());
        let mut after = text[span.end..].chars();
        let (a1, a2) = (after.next(), after.next());
        if needs_guard(b1, b2, false) {
            at.push(span.start);
        }
        if needs_guard(a1, a2, true) {
            at.push(span.end);
        }
    }
    at
}

/// Offsets of spaces to add around tokens in punctuation-only paragraphs.
fn isolated_token_padding(text: &str) -> Vec<usize> {
    let mut at = Vec::new();
    let mut para_start = 0usize;
    for para in text.split('\n') {
        if TOKEN_RE.is_match(para) && is_punct_or_space_only(&strip_tokens(para)) {
            for m in TOKEN_RE.find_iter(para) {
                let (start, end) = (para_start + m.start(), para_start + m.end());
                if char_before(text, start).is_some_and(is_punct_or_symbol) {
                    at.push(start);
                }
                if char_after(text, end).is_some_and(is_punct_or_symbol) {
                    at.push(end);
                }
            }
        }
        para_start += para.len() + 1;
    }
    at
}

/// Inserts `s` at every offset (original coordinates), shifting ranges as it goes.
fn insert_all(text: &mut String, ranges: &mut [TermRange], mut at: Vec<usize>, s: &str) {
    at.sort_unstable_by(|a, b| b.cmp(a));
    for offset in at {
        text.insert_str(offset, s);
        shift_spans(ranges.iter_mut().map(|r| &mut r.span), offset, s.len() as isize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glossary::{Term, TermSource};
    use crate::pieces::build_segment_pieces;

    fn entry(source: &str, target: &str, pre_mask: bool, appellation: bool) -> GlossaryEntry {
        let mut term = Term::new(source, target);
        term.pre_mask = pre_mask;
        term.is_appellation = appellation;
        GlossaryEntry::standalone(
            &term,
            &TermSource {
                text: source.to_string(),
                prohibit_standalone: false,
            },
        )
    }

    fn mask(engine: &mut MaskingEngine, text: &str, entries: &[GlossaryEntry]) -> MaskedPack {
        engine.mask_from_pieces(&build_segment_pieces("s", text, entries))
    }

    #[test]
    fn masks_with_lock_info() {
        let mut engine = MaskingEngine::new();
        let pack = mask(
            &mut engine,
            "Hello 최강자님, welcome!",
            &[entry("최강자", "Choigangja", true, true)],
        );
        assert_eq!(pack.masked, "Hello __E#1__\u{a0}님, welcome!");
        assert_eq!(pack.ranges.len(), 1);
        assert_eq!(pack.ranges[0].text(&pack.masked), Some("__E#1__"));
        let lock = &pack.locks["__E#1__"];
        assert_eq!(lock.target, "Choigangja");
        assert!(!lock.ends_with_batchim);
        assert!(lock.is_appellation);
    }

    #[test]
    fn token_ids_keep_increasing_across_segments() {
        let mut engine = MaskingEngine::new();
        let entries = [entry("카이", "Kai", true, false)];
        let first = mask(&mut engine, "카이 카이", &entries);
        let second = mask(&mut engine, "카이", &entries);
        assert_eq!(first.tokens_in_issue_order(), ["__E#1__", "__E#2__"]);
        assert_eq!(second.tokens_in_issue_order(), ["__E#3__"]);
        assert_eq!(engine.next_id(), 4);
        assert_eq!(second.issued_ids(), HashSet::from([3]));
    }

    #[test]
    fn unmasked_entries_keep_source_text() {
        let mut engine = MaskingEngine::new();
        let pack = mask(&mut engine, "grey sky", &[entry("grey", "gray", false, false)]);
        assert_eq!(pack.masked, "grey sky");
        assert_eq!(pack.ranges[0].kind, RangeKind::Normalized);
        assert!(pack.locks.is_empty());
    }

    #[test]
    fn guard_sides() {
        let mut engine = MaskingEngine::new();
        let e = [entry("Kai", "카이", true, true)];
        assert_eq!(mask(&mut engine, "Kai, hi", &e).masked, "__E#1__, hi");
        assert_eq!(mask(&mut engine, "Kai2", &e).masked, "__E#2__\u{a0}2");
        assert_eq!(mask(&mut engine, "aKai", &e).masked, "a__E#3__");
        assert_eq!(mask(&mut engine, "!aKai", &e).masked, "!a\u{a0}__E#4__");
        assert_eq!(mask(&mut engine, "中Kai中", &e).masked, "中\u{a0}__E#5__\u{a0}中");
    }

    #[test]
    fn guards_shift_later_ranges() {
        let mut engine = MaskingEngine::new();
        let entries = [
            entry("최강자", "Choigangja", true, true),
            entry("grey", "gray", false, false),
        ];
        let pack = mask(&mut engine, "최강자님 grey", &entries);
        let grey = pack.ranges.iter().find(|r| r.kind == RangeKind::Normalized).unwrap();
        assert_eq!(grey.text(&pack.masked), Some("grey"));
    }

    #[test]
    fn isolated_spacing_pads_punctuation_only_paragraphs() {
        let mut engine = MaskingEngine::with_spacing(TokenSpacing::IsolatedSegments);
        let entries = [entry("카이", "Kai", true, false), entry("레나", "Lena", true, false)];
        let pack = mask(&mut engine, "「카이,레나」\n카이,하자", &entries);
        assert_eq!(pack.masked, "「 __E#1__ , __E#2__ 」\n__E#3__,하자");
        for r in &pack.ranges {
            assert!(TOKEN_RE.is_match(r.text(&pack.masked).unwrap()));
        }
    }
}
