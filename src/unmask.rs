use std::ops::Range;

use regex::Regex;
use tracing::{debug, warn};

use crate::ir::{shift_spans, RangeKind, ReplacementDelta, TermRange};
use crate::masking::{LockInfo, MaskedPack};
use crate::particles::replace_with_particle_fix;
use crate::textutil::{nfc, NBSP};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnmaskOutcome {
    pub text: String,
    /// Masked ranges in the returned text, sorted by position.
    pub ranges: Vec<TermRange>,
    /// One delta per substitution, in the order they were applied.
    pub deltas: Vec<ReplacementDelta>,
}

struct Unmasker<'p> {
    pack: &'p MaskedPack,
    out: String,
    ranges: Vec<TermRange>,
    deltas: Vec<ReplacementDelta>,
}

impl<'p> Unmasker<'p> {
    /// Widens a token span over the NBSP guards placed around appellations.
    fn guarded_span(&self, span: Range<usize>, lock: &LockInfo) -> Range<usize> {
        if !lock.is_appellation {
            return span;
        }
        let mut span = span;
        if self.out[..span.start].ends_with(NBSP) {
            span.start -= NBSP.len_utf8();
        }
        if self.out[span.end..].starts_with(NBSP) {
            span.end += NBSP.len_utf8();
        }
        span
    }

    /// Replaces one token occurrence and returns the offset right after the inserted target.
    fn substitute(&mut self, token: &str, span: Range<usize>) -> Option<usize> {
        let lock = self.pack.locks.get(token)?;
        let entry = self.pack.token_entries.get(token)?;
        let span = self.guarded_span(span, lock);
        let sound = Some(lock.final_sound());
        let stops: Vec<usize> = self.ranges.iter().map(|t| t.span.start).collect();
        let r = replace_with_particle_fix(&self.out, span, &lock.target, sound, &stops);
        let delta = r.edit.delta();
        let spans = self.ranges.iter_mut().map(|t| &mut t.span);
        shift_spans(spans, r.edit.old_end(), delta.delta);
        self.ranges
            .push(TermRange::new(entry.clone(), r.span, RangeKind::Masked));
        self.deltas.push(delta);
        self.out = r.text;
        Some(r.next)
    }

    fn find_from(&self, token: &str, cursor: usize) -> Option<usize> {
        self.out[cursor..]
            .find(token)
            .map(|i| cursor + i)
            .or_else(|| self.out.find(token))
    }

    fn alternation_pass(&mut self, tokens: &[&str]) {
        let mut sorted: Vec<&str> = tokens.to_vec();
        sorted.sort_by(|a, b| b.len().cmp(&a.len()));
        let pattern = sorted
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!(error = %err, "token alternation failed to build");
                return;
            }
        };
        let hits: Vec<Range<usize>> = re.find_iter(&self.out).map(|m| m.range()).collect();
        for span in hits.into_iter().rev() {
            let token = self.out[span.clone()].to_string();
            self.substitute(&token, span);
        }
    }
}

/// Restores masked targets, resolving tokens in issue order rather than text order.
pub fn unmask_with_order(text: &str, pack: &MaskedPack) -> UnmaskOutcome {
    if text.is_empty() || pack.locks.is_empty() {
        return UnmaskOutcome {
            text: text.to_string(),
            ..UnmaskOutcome::default()
        };
    }
    let mut state = Unmasker {
        pack,
        out: nfc(text),
        ranges: Vec::new(),
        deltas: Vec::new(),
    };

    let tokens = pack.tokens_in_issue_order();
    let mut cursor = 0usize;
    for &token in &tokens {
        let Some(at) = state.find_from(token, cursor) else {
            debug!(token, "token missing from translation");
            continue;
        };
        if let Some(next) = state.substitute(token, at..at + token.len()) {
            cursor = next;
        }
    }

    // Duplicated tokens, or ones the primary pass could not place.
    let remaining: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| state.out.contains(t))
        .collect();
    if !remaining.is_empty() {
        debug!(count = remaining.len(), "falling back to alternation pass");
        state.alternation_pass(&remaining);
    }

    let mut ranges = state.ranges;
    ranges.sort_by_key(|r| r.span.start);
    UnmaskOutcome {
        text: state.out,
        ranges,
        deltas: state.deltas,
    }
}
