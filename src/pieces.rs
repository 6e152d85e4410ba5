use std::collections::HashSet;
use std::ops::Range;

use serde::Serialize;

use crate::glossary::GlossaryEntry;
use crate::ir::{RangeKind, TermRange};
use crate::textutil::char_len;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Piece {
    Text { span: Range<usize> },
    Term { entry: GlossaryEntry, span: Range<usize> },
}

impl Piece {
    #[must_use]
    pub fn span(&self) -> &Range<usize> {
        match self {
            Piece::Text { span } | Piece::Term { span, .. } => span,
        }
    }

    #[must_use]
    pub fn entry(&self) -> Option<&GlossaryEntry> {
        match self {
            Piece::Text { .. } => None,
            Piece::Term { entry, .. } => Some(entry),
        }
    }
}

/// A segment partitioned into literal runs and glossary matches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SegmentPieces {
    pub segment_id: String,
    pub original_text: String,
    pub pieces: Vec<Piece>,
}

impl SegmentPieces {
    pub fn whole_text(segment_id: &str, text: &str) -> Self {
        let pieces = if text.is_empty() {
            Vec::new()
        } else {
            vec![Piece::Text { span: 0..text.len() }]
        };
        Self {
            segment_id: segment_id.to_string(),
            original_text: text.to_string(),
            pieces,
        }
    }

    #[must_use]
    pub fn text_of(&self, piece: &Piece) -> &str {
        &self.original_text[piece.span().clone()]
    }

    /// Every term piece in text order.
    pub fn detected_entries(&self) -> impl Iterator<Item = &GlossaryEntry> {
        self.pieces.iter().filter_map(Piece::entry)
    }

    pub fn masked_entries(&self) -> impl Iterator<Item = &GlossaryEntry> {
        self.detected_entries().filter(|e| e.pre_mask)
    }

    pub fn unmasked_entries(&self) -> impl Iterator<Item = &GlossaryEntry> {
        self.detected_entries().filter(|e| !e.pre_mask)
    }

    /// Term spans in the original text, for highlighting the source side.
    #[must_use]
    pub fn term_ranges(&self) -> Vec<TermRange> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Term { entry, span } => {
                    let kind = if entry.pre_mask {
                        RangeKind::Masked
                    } else {
                        RangeKind::Normalized
                    };
                    Some(TermRange::new(entry.clone(), span.clone(), kind))
                }
                Piece::Text { .. } => None,
            })
            .collect()
    }
}

/// Partitions `text` by sweeping sources longest first, leftmost match, over what is still literal.
///
/// When two entries share a source, the one listed first is used.
pub fn build_segment_pieces(
    segment_id: &str,
    text: &str,
    entries: &[GlossaryEntry],
) -> SegmentPieces {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut sources: Vec<(&str, &GlossaryEntry)> = entries
        .iter()
        .filter(|e| !e.source.is_empty() && seen.insert(e.source.as_str()))
        .map(|e| (e.source.as_str(), e))
        .collect();
    sources.sort_by(|a, b| char_len(b.0).cmp(&char_len(a.0)));

    let mut out = SegmentPieces::whole_text(segment_id, text);
    for (source, entry) in sources {
        let mut next: Vec<Piece> = Vec::with_capacity(out.pieces.len());
        for piece in out.pieces {
            let span = match piece {
                Piece::Text { span } => span,
                term => {
                    next.push(term);
                    continue;
                }
            };
            let literal = &text[span.clone()];
            let mut pos = span.start;
            for (i, _) in literal.match_indices(source) {
                let start = span.start + i;
                if start > pos {
                    next.push(Piece::Text { span: pos..start });
                }
                next.push(Piece::Term {
                    entry: entry.clone(),
                    span: start..start + source.len(),
                });
                pos = start + source.len();
            }
            if pos < span.end {
                next.push(Piece::Text { span: pos..span.end });
            }
        }
        out.pieces = next;
    }
    out
}
