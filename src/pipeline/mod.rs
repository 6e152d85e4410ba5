//! Wires the glossary stages together for one snapshot.

use std::ops::Range;

use serde::Serialize;
use tracing::{debug, info};

use crate::entries::build_entries;
use crate::glossary::{GlossaryEntry, GlossarySnapshot};
use crate::ir::{shift_through_deltas, RangeKind, ReplacementDelta, TermRange};
use crate::masking::{MaskedPack, MaskingEngine, TokenSpacing};
use crate::matcher::{find_appeared_terms, SourceIndex, SourceOccurrences};
use crate::normalize::{make_name_glossaries, normalize_with_order, NameGlossary};
use crate::pieces::{build_segment_pieces, SegmentPieces};
use crate::sentinels::{decode_sentinels, encode_sentinels, repair_damaged_tokens};
use crate::unmask::unmask_with_order;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub id: String,
    pub text: String,
}

impl Segment {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    pub token_spacing: TokenSpacing,
    pub encode_sentinels: bool,
    pub normalize: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            token_spacing: TokenSpacing::Disabled,
            encode_sentinels: true,
            normalize: true,
        }
    }
}

/// Everything `restore` needs, plus the text to hand to the translator.
#[derive(Clone, Debug, Serialize)]
pub struct PreparedSegment {
    pub segment: Segment,
    pub entries: Vec<GlossaryEntry>,
    pub pieces: SegmentPieces,
    pub pack: MaskedPack,
    pub name_glossaries: Vec<NameGlossary>,
    /// Masked text, sentinel-encoded when enabled.
    pub outgoing: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestoredSegment {
    pub text: String,
    /// Term ranges in the source segment.
    pub original_ranges: Vec<TermRange>,
    /// Masked and normalized ranges in `text`, sorted by position.
    pub final_ranges: Vec<TermRange>,
    /// Normalized ranges located in the text as it was before normalization.
    pub pre_normalized_ranges: Vec<TermRange>,
    pub deltas: Vec<ReplacementDelta>,
}

pub struct GlossaryPipeline<'g> {
    snapshot: &'g GlossarySnapshot,
    index: SourceIndex,
    engine: MaskingEngine,
    options: PipelineOptions,
}

impl<'g> GlossaryPipeline<'g> {
    pub fn new(snapshot: &'g GlossarySnapshot, options: PipelineOptions) -> anyhow::Result<Self> {
        let index = SourceIndex::new(&snapshot.terms)?;
        info!(
            terms = snapshot.terms.len(),
            patterns = snapshot.patterns.len(),
            sources = index.len(),
            "glossary pipeline ready"
        );
        Ok(Self {
            snapshot,
            index,
            engine: MaskingEngine::with_spacing(options.token_spacing),
            options,
        })
    }

    #[must_use]
    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    #[must_use]
    pub fn engine(&self) -> &MaskingEngine {
        &self.engine
    }

    pub fn prepare(&mut self, segment: Segment) -> PreparedSegment {
        let occurrences = self.index.occurrences(&segment.text);
        self.prepare_with_occurrences(segment, &occurrences)
    }

    /// Same as [`prepare`](Self::prepare) with occurrence sets found elsewhere.
    pub fn prepare_with_occurrences(
        &mut self,
        segment: Segment,
        occurrences: &SourceOccurrences,
    ) -> PreparedSegment {
        let appeared = find_appeared_terms(&segment.text, &self.snapshot.terms, occurrences);
        let entries = build_entries(&segment.text, &appeared, &self.snapshot.patterns);
        let pieces = build_segment_pieces(&segment.id, &segment.text, &entries);
        let pack = self.engine.mask_from_pieces(&pieces);
        let name_glossaries = make_name_glossaries(&pieces);
        let outgoing = if self.options.encode_sentinels {
            encode_sentinels(&pack.masked)
        } else {
            pack.masked.clone()
        };
        info!(
            segment = %segment.id,
            appeared = appeared.len(),
            entries = entries.len(),
            masked = pack.locks.len(),
            names = name_glossaries.len(),
            "prepared segment"
        );
        PreparedSegment {
            segment,
            entries,
            pieces,
            pack,
            name_glossaries,
            outgoing,
        }
    }

    pub fn restore(&self, prepared: &PreparedSegment, translated: &str) -> RestoredSegment {
        restore_segment(prepared, translated, self.options.normalize)
    }
}

/// Decode, repair, unmask, then normalize one translated segment.
pub fn restore_segment(
    prepared: &PreparedSegment,
    translated: &str,
    normalize: bool,
) -> RestoredSegment {
    let pack = &prepared.pack;
    let decoded = decode_sentinels(translated);
    let repaired = repair_damaged_tokens(&decoded, &pack.issued_ids());
    if repaired != decoded {
        debug!(segment = %pack.segment_id, "repaired damaged tokens");
    }
    let unmasked = unmask_with_order(&repaired, pack);

    let original_ranges = prepared.pieces.term_ranges();
    if !normalize || prepared.name_glossaries.is_empty() {
        info!(
            segment = %pack.segment_id,
            masked = unmasked.ranges.len(),
            "restored segment"
        );
        return RestoredSegment {
            text: unmasked.text,
            original_ranges,
            final_ranges: unmasked.ranges,
            pre_normalized_ranges: Vec::new(),
            deltas: unmasked.deltas,
        };
    }

    let protected: Vec<Range<usize>> = unmasked.ranges.iter().map(|r| r.span.clone()).collect();
    let normalized = normalize_with_order(
        &unmasked.text,
        &prepared.pieces,
        &prepared.name_glossaries,
        &protected,
    );
    let mut final_ranges = shift_through_deltas(&unmasked.ranges, &normalized.deltas);
    final_ranges.extend(normalized.ranges);
    final_ranges.sort_by_key(|r| r.span.start);

    let mut deltas = unmasked.deltas;
    deltas.extend(normalized.deltas);
    info!(
        segment = %pack.segment_id,
        masked = final_ranges.iter().filter(|r| r.kind == RangeKind::Masked).count(),
        normalized = normalized.pre_normalized_ranges.len(),
        "restored segment"
    );
    RestoredSegment {
        text: normalized.text,
        original_ranges,
        final_ranges,
        pre_normalized_ranges: normalized.pre_normalized_ranges,
        deltas,
    }
}
