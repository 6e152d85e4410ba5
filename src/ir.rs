use std::ops::Range;

use serde::Serialize;

use crate::glossary::GlossaryEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    Masked,
    Normalized,
}

/// A glossary entry located in some text. Spans are byte offsets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TermRange {
    pub entry: GlossaryEntry,
    pub span: Range<usize>,
    pub kind: RangeKind,
}

impl TermRange {
    pub fn new(entry: GlossaryEntry, span: Range<usize>, kind: RangeKind) -> Self {
        Self { entry, span, kind }
    }

    #[must_use]
    pub fn text<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.span.clone())
    }
}

/// Length change caused by one substitution at `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReplacementDelta {
    pub offset: usize,
    pub delta: isize,
}

/// One in-place substitution: `old_len` bytes at `offset` became `new_len` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edit {
    pub offset: usize,
    pub old_len: usize,
    pub new_len: usize,
}

impl Edit {
    #[inline]
    pub fn old_end(&self) -> usize {
        self.offset + self.old_len
    }

    #[inline]
    pub fn new_end(&self) -> usize {
        self.offset + self.new_len
    }

    #[inline]
    pub fn delta(&self) -> ReplacementDelta {
        ReplacementDelta {
            offset: self.offset,
            delta: self.new_len as isize - self.old_len as isize,
        }
    }

    /// Derives the edit from the text before and after, given that everything before `offset`
    /// is unchanged and the changed region covers at least `old_min_end`/`new_min_end`.
    pub fn between(
        old: &str,
        new: &str,
        offset: usize,
        old_min_end: usize,
        new_min_end: usize,
    ) -> Edit {
        let suffix = common_suffix_len(&old[old_min_end..], &new[new_min_end..]);
        Edit {
            offset,
            old_len: old.len() - suffix - offset,
            new_len: new.len() - suffix - offset,
        }
    }
}

fn common_suffix_len(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

#[inline]
pub fn shift_pos(pos: usize, delta: isize) -> usize {
    pos.saturating_add_signed(delta)
}

#[inline]
pub fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Shifts every span starting at or after `at`.
pub fn shift_spans<'a>(
    spans: impl IntoIterator<Item = &'a mut Range<usize>>,
    at: usize,
    delta: isize,
) {
    if delta == 0 {
        return;
    }
    for span in spans {
        if span.start >= at {
            span.start = shift_pos(span.start, delta);
            span.end = shift_pos(span.end, delta);
        }
    }
}

/// Replays a list of deltas (in the order they were applied) over ranges recorded before them.
pub fn shift_through_deltas(ranges: &[TermRange], deltas: &[ReplacementDelta]) -> Vec<TermRange> {
    let mut out = ranges.to_vec();
    for d in deltas {
        shift_spans(out.iter_mut().map(|r| &mut r.span), d.offset + 1, d.delta);
    }
    out
}

/// Maps a span of the current text back into the text as it was before `edits`.
/// Returns `None` when the span intersects a rewritten region.
pub fn map_back(span: Range<usize>, edits: &[Edit]) -> Option<Range<usize>> {
    let (mut start, mut end) = (span.start, span.end);
    for edit in edits.iter().rev() {
        if end <= edit.offset {
            continue;
        }
        if start >= edit.new_end() {
            start = start - edit.new_len + edit.old_len;
            end = end - edit.new_len + edit.old_len;
            continue;
        }
        return None;
    }
    Some(start..end)
}
