//! Canonicalizes unmasked glossary terms in translated text.
//!
//! Four passes run in order over one shared state:
//! 1. each term piece, in source order, takes the first canonical/variant spelling found
//!    after the previous match (falling back to the whole text);
//! 2. pieces still unresolved retry with the spellings of their component terms;
//! 3. targets that never matched get one alternation sweep over every spelling;
//! 4. spellings that matched once are searched again to catch repeated mentions.
//!
//! Spans that were already normalized, or passed in as protected, are never rewritten.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::glossary::{EntryOrigin, GlossaryEntry};
use crate::ir::{map_back, overlaps, shift_spans, Edit, RangeKind, ReplacementDelta, TermRange};
use crate::particles::replace_with_particle_fix;
use crate::pieces::SegmentPieces;
use crate::textutil::{char_before, char_len, is_word_char, nfc};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FallbackTerm {
    pub term_key: String,
    pub target: String,
    pub variants: Vec<String>,
}

/// Per-target view of the unmasked terms found in one segment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NameGlossary {
    pub target: String,
    pub variants: Vec<String>,
    pub expected_count: usize,
    pub fallback_terms: Vec<FallbackTerm>,
}

pub fn make_name_glossaries(pieces: &SegmentPieces) -> Vec<NameGlossary> {
    let mut order: Vec<String> = Vec::new();
    let mut by_target: HashMap<String, NameGlossary> = HashMap::new();
    for entry in pieces.unmasked_entries() {
        if entry.target.is_empty() {
            continue;
        }
        let name = by_target.entry(entry.target.clone()).or_insert_with(|| {
            order.push(entry.target.clone());
            NameGlossary {
                target: entry.target.clone(),
                variants: Vec::new(),
                expected_count: 0,
                fallback_terms: Vec::new(),
            }
        });
        name.expected_count += 1;
        for v in &entry.variants {
            if !v.is_empty() && !name.variants.contains(v) {
                name.variants.push(v.clone());
            }
        }
        if let EntryOrigin::Composed { .. } = entry.origin {
            for comp in &entry.component_terms {
                if name.fallback_terms.iter().any(|f| f.term_key == comp.key) {
                    continue;
                }
                name.fallback_terms.push(FallbackTerm {
                    term_key: comp.key.clone(),
                    target: comp.target.clone(),
                    variants: comp.variants.clone(),
                });
            }
        }
    }
    let mut out: Vec<NameGlossary> = order
        .into_iter()
        .filter_map(|t| by_target.remove(&t))
        .collect();
    out.sort_by(|a, b| {
        b.expected_count
            .cmp(&a.expected_count)
            .then_with(|| a.target.cmp(&b.target))
    });
    out
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub text: String,
    /// Normalized ranges in the returned text, sorted by position.
    pub ranges: Vec<TermRange>,
    /// The same replacements located in the input text.
    pub pre_normalized_ranges: Vec<TermRange>,
    pub deltas: Vec<ReplacementDelta>,
}

impl NormalizeOutcome {
    #[must_use]
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }
}

/// Forward-only search position of one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Cursor(usize);

#[derive(Clone, Debug)]
struct Found {
    candidate: String,
    span: Range<usize>,
}

/// Candidate spellings: deduped case-insensitively, longest first, target first on ties.
fn make_candidates(target: &str, variants: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();
    for c in std::iter::once(target).chain(variants.iter().map(String::as_str)) {
        if !c.is_empty() && seen.insert(c.to_lowercase()) {
            out.push(c.to_string());
        }
    }
    out.sort_by(|a, b| char_len(b).cmp(&char_len(a)));
    out
}

fn caseless(literal: &str) -> Option<Regex> {
    match RegexBuilder::new(&regex::escape(literal))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(error = %err, "candidate regex failed to build");
            None
        }
    }
}

struct Normalizer<'a> {
    original: String,
    out: String,
    ranges: Vec<TermRange>,
    pre_ranges: Vec<TermRange>,
    protected: Vec<Range<usize>>,
    edits: Vec<Edit>,
    matched: BTreeMap<String, Vec<String>>,
    names: HashMap<&'a str, &'a NameGlossary>,
}

impl<'a> Normalizer<'a> {
    fn is_protected(&self, span: &Range<usize>) -> bool {
        self.protected.iter().any(|p| overlaps(p, span))
            || self.ranges.iter().any(|r| overlaps(&r.span, span))
    }

    fn record_matched(&mut self, target: &str, candidate: &str) {
        let list = self.matched.entry(target.to_string()).or_default();
        if !list.iter().any(|c| c == candidate) {
            list.push(candidate.to_string());
        }
    }

    /// First unprotected case-insensitive occurrence of `literal` at or after `from`.
    fn find_unprotected(&self, literal: &str, from: usize) -> Option<Range<usize>> {
        let re = caseless(literal)?;
        let from = from.min(self.out.len());
        let found = re
            .find_iter(&self.out[from..])
            .map(|m| from + m.start()..from + m.end())
            .find(|span| !self.is_protected(span));
        found
    }

    fn find_candidate(&self, candidates: &[String], cursor: Cursor) -> Option<Found> {
        for from in [cursor.0, 0] {
            for c in candidates {
                if let Some(span) = self.find_unprotected(c, from) {
                    return Some(Found {
                        candidate: c.clone(),
                        span,
                    });
                }
            }
        }
        None
    }

    /// Replaces `span` with `replacement`, fixes particles and records the range.
    fn substitute(
        &mut self,
        span: Range<usize>,
        replacement: &str,
        entry: GlossaryEntry,
    ) -> usize {
        if let Some(before) = map_back(span.clone(), &self.edits) {
            if self.original.get(before.clone()).is_some() {
                let range = TermRange::new(entry.clone(), before, RangeKind::Normalized);
                self.pre_ranges.push(range);
            }
        }
        let stops: Vec<usize> = self
            .ranges
            .iter()
            .map(|t| t.span.start)
            .chain(self.protected.iter().map(|p| p.start))
            .collect();
        let r = replace_with_particle_fix(&self.out, span, replacement, None, &stops);
        let delta = r.edit.delta().delta;
        let at = r.edit.old_end();
        shift_spans(self.ranges.iter_mut().map(|t| &mut t.span), at, delta);
        shift_spans(self.protected.iter_mut(), at, delta);
        self.edits.push(r.edit);
        self.ranges
            .push(TermRange::new(entry, r.span, RangeKind::Normalized));
        self.out = r.text;
        r.next
    }

    fn exact_pass(&mut self, items: &[(usize, &GlossaryEntry)], resolved: &mut HashSet<usize>) {
        let mut cursor = Cursor::default();
        for &(idx, entry) in items {
            let Some(name) = self.names.get(entry.target.as_str()).copied() else {
                continue;
            };
            let candidates = make_candidates(&name.target, &name.variants);
            let Some(found) = self.find_candidate(&candidates, cursor) else {
                debug!(target = %entry.target, "no spelling found");
                continue;
            };
            self.record_matched(&entry.target, &found.candidate);
            cursor = Cursor(self.substitute(found.span, &name.target, entry.clone()));
            resolved.insert(idx);
        }
    }

    fn fallback_pass(&mut self, items: &[(usize, &GlossaryEntry)], resolved: &mut HashSet<usize>) {
        let mut cursor = Cursor::default();
        for &(idx, entry) in items {
            if resolved.contains(&idx) {
                continue;
            }
            let Some(name) = self.names.get(entry.target.as_str()).copied() else {
                continue;
            };
            for fb in &name.fallback_terms {
                let candidates = make_candidates(&fb.target, &fb.variants);
                let Some(found) = self.find_candidate(&candidates, cursor) else {
                    continue;
                };
                self.record_matched(&entry.target, &found.candidate);
                let derived = entry.for_component(&fb.term_key, &fb.target, &fb.variants);
                cursor = Cursor(self.substitute(found.span, &fb.target, derived));
                resolved.insert(idx);
                break;
            }
        }
    }

    fn residual_pass(&mut self, remaining: &[(&'a NameGlossary, &GlossaryEntry)]) {
        // spelling -> (canonical, entry recorded for the range, target it counts towards)
        let mut map: HashMap<String, (String, GlossaryEntry, String)> = HashMap::new();
        for &(name, entry) in remaining {
            let mut add = |spelling: &str, canonical: &str, e: &GlossaryEntry| {
                if !spelling.is_empty() && !map.contains_key(spelling) {
                    let value = (canonical.to_string(), e.clone(), name.target.clone());
                    map.insert(spelling.to_string(), value);
                }
            };
            add(&name.target, &name.target, entry);
            for v in &name.variants {
                add(v, &name.target, entry);
            }
            for fb in &name.fallback_terms {
                let derived = entry.for_component(&fb.term_key, &fb.target, &fb.variants);
                add(&fb.target, &fb.target, &derived);
                for v in &fb.variants {
                    add(v, &fb.target, &derived);
                }
            }
        }
        if map.is_empty() {
            return;
        }
        let mut spellings: Vec<&String> = map.keys().collect();
        spellings.sort_by(|a, b| char_len(b).cmp(&char_len(a)).then_with(|| a.cmp(b)));
        let alternation = spellings
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let re = match Regex::new(&alternation) {
            Ok(re) => re,
            Err(err) => {
                warn!(error = %err, "residual alternation failed to build");
                return;
            }
        };
        let hits: Vec<Range<usize>> = re
            .find_iter(&self.out)
            .map(|m| m.range())
            .filter(|span| !char_before(&self.out, span.start).is_some_and(is_word_char))
            .filter(|span| !self.is_protected(span))
            .collect();
        for span in hits.into_iter().rev() {
            let found = self.out[span.clone()].to_string();
            let Some((canonical, entry, target)) = map.get(&found).cloned() else {
                continue;
            };
            self.substitute(span, &canonical, entry);
            self.record_matched(&target, &found);
        }
    }

    /// Replaces every unprotected occurrence of `spellings` (two chars or more).
    fn repeat_pass(&mut self, spellings: &[String], replacement: &str, entry: &GlossaryEntry) {
        let mut sorted: Vec<&String> = spellings.iter().filter(|s| char_len(s) > 1).collect();
        sorted.sort_by(|a, b| char_len(b).cmp(&char_len(a)));
        for spelling in sorted {
            let Some(re) = caseless(spelling) else {
                continue;
            };
            let hits: Vec<Range<usize>> = re
                .find_iter(&self.out)
                .map(|m| m.range())
                .filter(|span| !self.is_protected(span))
                .collect();
            for span in hits.into_iter().rev() {
                if self.is_protected(&span) {
                    continue;
                }
                self.substitute(span, replacement, entry.clone());
            }
        }
    }
}

/// Normalizes the unmasked term pieces of `pieces` inside `text`.
///
/// `protected` are spans of `text` (the unmasked targets) that must never be rewritten.
pub fn normalize_with_order(
    text: &str,
    pieces: &SegmentPieces,
    names: &[NameGlossary],
    protected: &[Range<usize>],
) -> NormalizeOutcome {
    if text.is_empty() || names.is_empty() {
        return NormalizeOutcome::unchanged(text);
    }
    let original = nfc(text);
    let mut state = Normalizer {
        out: original.clone(),
        original,
        ranges: Vec::new(),
        pre_ranges: Vec::new(),
        protected: protected.to_vec(),
        edits: Vec::new(),
        matched: BTreeMap::new(),
        names: names.iter().map(|n| (n.target.as_str(), n)).collect(),
    };

    let items: Vec<(usize, &GlossaryEntry)> = pieces.unmasked_entries().enumerate().collect();
    let mut resolved: HashSet<usize> = HashSet::new();
    state.exact_pass(&items, &mut resolved);
    state.fallback_pass(&items, &mut resolved);

    let resolved_targets: HashSet<&str> = items
        .iter()
        .filter(|(i, _)| resolved.contains(i))
        .map(|(_, e)| e.target.as_str())
        .collect();
    let remaining: Vec<(&NameGlossary, &GlossaryEntry)> = names
        .iter()
        .filter(|n| !resolved_targets.contains(n.target.as_str()))
        .filter_map(|n| {
            items
                .iter()
                .find(|(i, e)| e.target == n.target && !resolved.contains(i))
                .map(|&(_, e)| (n, e))
        })
        .collect();
    if !remaining.is_empty() {
        state.residual_pass(&remaining);
    }

    for name in names {
        let Some(matched) = state.matched.get(&name.target).cloned() else {
            continue;
        };
        let Some(&(_, entry)) = items.iter().find(|(_, e)| e.target == name.target) else {
            continue;
        };
        let own: Vec<String> = matched
            .iter()
            .filter(|m| **m == name.target || name.variants.contains(m))
            .cloned()
            .collect();
        state.repeat_pass(&own, &name.target, entry);
        for fb in &name.fallback_terms {
            let fb_matched: Vec<String> = matched
                .iter()
                .filter(|m| **m == fb.target || fb.variants.contains(m))
                .cloned()
                .collect();
            if !fb_matched.is_empty() {
                let derived = entry.for_component(&fb.term_key, &fb.target, &fb.variants);
                state.repeat_pass(&fb_matched, &fb.target, &derived);
            }
        }
    }

    let mut ranges = state.ranges;
    ranges.sort_by_key(|r| r.span.start);
    let mut pre_normalized_ranges = state.pre_ranges;
    pre_normalized_ranges.sort_by_key(|r| r.span.start);
    NormalizeOutcome {
        text: state.out,
        ranges,
        pre_normalized_ranges,
        deltas: state.edits.iter().map(Edit::delta).collect(),
    }
}
