//! Property-based invariant tests.
//!
//! 1. Pieces tile the segment exactly, in order, without overlap.
//! 2. Token ids strictly increase across every segment one engine masks.
//! 3. Sentinel decode inverts encode, and encode is idempotent.
//! 4. Adding a deactivation context that occurs in the segment never adds entries.
//! 5. Every restored range holds its entry's target, whatever order the tokens come back in.

use std::collections::BTreeSet;

use glossary_mask::entries::build_entries;
use glossary_mask::glossary::{GlossaryEntry, Term, TermSource};
use glossary_mask::masking::MaskingEngine;
use glossary_mask::matcher::{find_appeared_terms, SourceIndex};
use glossary_mask::pieces::build_segment_pieces;
use glossary_mask::sentinels::{decode_sentinels, encode_sentinels, make_token, token_ids};
use glossary_mask::unmask::unmask_with_order;
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

const SOURCES: [(&str, &str); 5] = [
    ("가나", "Gana"),
    ("나", "Na"),
    ("다라", "달"),
    ("가나다", "Ganada"),
    ("ab", "에이비"),
];

fn segment() -> impl Strategy<Value = String> {
    "[가나다라ab ,]{0,24}"
}

fn terms(pre_mask: bool) -> Vec<Term> {
    SOURCES
        .iter()
        .enumerate()
        .map(|(i, (source, target))| {
            let mut term = Term::new(&format!("t{i}"), target).source(source);
            term.pre_mask = pre_mask;
            term
        })
        .collect()
}

fn standalone_entries(pre_mask: bool) -> Vec<GlossaryEntry> {
    terms(pre_mask)
        .iter()
        .map(|t| {
            GlossaryEntry::standalone(
                t,
                &TermSource {
                    text: t.sources[0].text.clone(),
                    prohibit_standalone: false,
                },
            )
        })
        .collect()
}

fn entry_keys(segment: &str, terms: &[Term]) -> BTreeSet<(String, String)> {
    let index = SourceIndex::new(terms).unwrap();
    let appeared = find_appeared_terms(segment, terms, &index.occurrences(segment));
    build_entries(segment, &appeared, &[])
        .into_iter()
        .map(|e| (e.source, e.target))
        .collect()
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Pieces tile the segment
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn pieces_tile_segment(text in segment()) {
        let pieces = build_segment_pieces("s", &text, &standalone_entries(false));
        let mut pos = 0usize;
        let mut rebuilt = String::new();
        for piece in &pieces.pieces {
            prop_assert_eq!(piece.span().start, pos);
            prop_assert!(piece.span().end > piece.span().start);
            rebuilt.push_str(pieces.text_of(piece));
            pos = piece.span().end;
        }
        prop_assert_eq!(pos, text.len());
        prop_assert_eq!(rebuilt, text);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Token ids strictly increase
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn token_ids_strictly_increase(texts in proptest::collection::vec(segment(), 1..6)) {
        let entries = standalone_entries(true);
        let mut engine = MaskingEngine::new();
        let mut last = 0u64;
        for text in &texts {
            let pack = engine.mask_from_pieces(&build_segment_pieces("s", text, &entries));
            let ids = token_ids(&pack.masked);
            prop_assert_eq!(ids.len(), pack.locks.len());
            for id in ids {
                prop_assert!(id > last, "id {} after {}", id, last);
                last = id;
            }
        }
        prop_assert_eq!(engine.next_id(), last + 1);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Sentinel codec
// ═════════════════════════════════════════════════════════════════════════

fn token_bearing() -> impl Strategy<Value = String> {
    let part = prop_oneof![
        "[a-zE#_0-9 가나]{0,6}",
        (1u64..500).prop_map(make_token),
    ];
    proptest::collection::vec(part, 0..8).prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn decode_inverts_encode(text in token_bearing()) {
        let encoded = encode_sentinels(&text);
        prop_assert_eq!(decode_sentinels(&encoded), text);
    }

    #[test]
    fn encode_is_idempotent(text in token_bearing()) {
        let once = encode_sentinels(&text);
        prop_assert_eq!(encode_sentinels(&once), once.clone());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Deactivation is monotonic
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn deactivation_only_removes(
        text in segment(),
        which in 0usize..SOURCES.len(),
        start in 0usize..24,
        len in 1usize..4,
    ) {
        let chars: Vec<char> = text.chars().collect();
        prop_assume!(start < chars.len());
        let end = (start + len).min(chars.len());
        let context: String = chars[start..end].iter().collect();

        let base = terms(false);
        let mut gated = base.clone();
        gated[which].deactivation_contexts.push(context);

        let before = entry_keys(&text, &base);
        let after = entry_keys(&text, &gated);
        prop_assert!(after.is_subset(&before));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Ranges hold targets after a translation that reorders tokens
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn unmasked_ranges_hold_targets(
        text in segment(),
        rotate in 0usize..8,
        reverse in any::<bool>(),
        glue in proptest::collection::vec("[ 가는을이와]{0,2}", 8),
    ) {
        let mut engine = MaskingEngine::new();
        let pieces = build_segment_pieces("s", &text, &standalone_entries(true));
        let pack = engine.mask_from_pieces(&pieces);

        let mut order: Vec<&str> = pack.tokens_in_issue_order();
        if !order.is_empty() {
            let k = rotate % order.len();
            order.rotate_left(k);
        }
        if reverse {
            order.reverse();
        }
        let mut translated = String::new();
        for (i, token) in order.iter().enumerate() {
            translated.push_str(token);
            translated.push_str(&glue[i % glue.len()]);
        }

        let out = unmask_with_order(&translated, &pack);
        prop_assert_eq!(out.ranges.len(), pack.locks.len());
        for r in &out.ranges {
            prop_assert_eq!(r.text(&out.text), Some(r.entry.target.as_str()));
        }
    }
}
