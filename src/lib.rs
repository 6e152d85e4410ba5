//! Glossary masking for machine translation: finds glossary terms in a segment, swaps them
//! for placeholder tokens before translation, and restores canonical targets afterwards with
//! Korean postposition agreement repaired.

pub mod config;
pub mod entries;
pub mod glossary;
pub mod ir;
pub mod masking;
pub mod matcher;
pub mod normalize;
pub mod particles;
pub mod pieces;
pub mod pipeline;
pub mod sentinels;
pub mod textutil;
pub mod unmask;

pub use glossary::{GlossaryEntry, GlossarySnapshot, Pattern, Term, TermSource};
pub use ir::{RangeKind, ReplacementDelta, TermRange};
pub use masking::{MaskedPack, MaskingEngine, TokenSpacing};
pub use pipeline::{GlossaryPipeline, PipelineOptions, PreparedSegment, RestoredSegment, Segment};
