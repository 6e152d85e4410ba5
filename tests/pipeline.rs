//! End-to-end behaviour of the glossary pipeline on small hand-written snapshots.

use glossary_mask::glossary::EntryOrigin;
use glossary_mask::pieces::Piece;
use glossary_mask::{
    GlossaryPipeline, GlossarySnapshot, PipelineOptions, RangeKind, RestoredSegment, Segment,
};

fn snapshot(raw: &str) -> GlossarySnapshot {
    GlossarySnapshot::from_json_str(raw).unwrap()
}

fn assert_targets_at_ranges(restored: &RestoredSegment) {
    for r in &restored.final_ranges {
        assert_eq!(r.text(&restored.text), Some(r.entry.target.as_str()));
    }
}

#[test]
fn appellation_round_trip_keeps_adjacency() {
    let snap = snapshot(
        r#"{"terms": [{"key": "choi", "target": "Choigangja",
            "sources": [{"text": "최강자"}], "pre_mask": true, "is_appellation": true}]}"#,
    );
    let mut pipeline = GlossaryPipeline::new(&snap, PipelineOptions::default()).unwrap();
    let prepared = pipeline.prepare(Segment::new("s1", "Hello 최강자님, welcome!"));

    let spans: Vec<_> = prepared
        .pack
        .ranges
        .iter()
        .filter(|r| r.kind == RangeKind::Masked)
        .collect();
    assert_eq!(spans.len(), 1);
    let token = spans[0].text(&prepared.pack.masked).unwrap();
    assert_eq!(prepared.pack.locks[token].target, "Choigangja");

    let restored = pipeline.restore(&prepared, &prepared.outgoing);
    assert_eq!(restored.text, "Hello Choigangja님, welcome!");
    assert_targets_at_ranges(&restored);
}

#[test]
fn gated_source_needs_its_activator() {
    let snap = snapshot(
        r#"{"terms": [
            {"key": "taro", "target": "Taro", "activators": ["ultraman"],
             "sources": [{"text": "太郎", "prohibit_standalone": true}]},
            {"key": "ultraman", "target": "Ultraman", "sources": [{"text": "ウルトラマン"}]}
        ]}"#,
    );
    let mut pipeline = GlossaryPipeline::new(&snap, PipelineOptions::default()).unwrap();
    let with = pipeline.prepare(Segment::new("s1", "ウルトラマン太郎登場!"));
    assert!(with.entries.iter().any(|e| e.source == "太郎"));
    let without = pipeline.prepare(Segment::new("s2", "太郎登場!"));
    assert!(without.entries.iter().all(|e| e.source != "太郎"));
}

const NAME_SNAPSHOT: &str = r#"{
    "terms": [
        {"key": "hong", "target": "Hong", "sources": [{"text": "홍"}],
         "components": [{"pattern": "name", "role": "family"}]},
        {"key": "gildong", "target": "Gildong", "sources": [{"text": "길동"}],
         "components": [{"pattern": "name", "role": "given"}]}
    ],
    "patterns": [
        {"name": "name", "left_role": "family", "right_role": "given",
         "source_templates": ["{L}{J}{R}"], "target_templates": ["{L} {R}"]}
    ]
}"#;

#[test]
fn pair_pattern_composes_a_name() {
    let snap = snapshot(NAME_SNAPSHOT);
    let mut pipeline = GlossaryPipeline::new(&snap, PipelineOptions::default()).unwrap();
    let prepared = pipeline.prepare(Segment::new("s1", "홍길동은 위인이다."));
    let composed = prepared
        .entries
        .iter()
        .find(|e| e.is_composed())
        .expect("composed entry");
    assert_eq!(composed.source, "홍길동");
    assert_eq!(composed.target, "Hong Gildong");
    let keys: Vec<&str> = composed.component_terms.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, ["hong", "gildong"]);

    let first = prepared.pieces.pieces[0].entry().expect("term piece");
    assert_eq!(first.target, "Hong Gildong");
}

#[test]
fn standalone_term_beats_composed_entry() {
    let mut snap = snapshot(NAME_SNAPSHOT);
    let extra = snapshot(
        r#"{"terms": [{"key": "hgd", "target": "Hong Gil-dong", "sources": [{"text": "홍길동"}]}]}"#,
    );
    snap.terms.extend(extra.terms);
    let mut pipeline = GlossaryPipeline::new(&snap, PipelineOptions::default()).unwrap();
    let prepared = pipeline.prepare(Segment::new("s1", "홍길동은 위인이다."));
    let Piece::Term { entry, .. } = &prepared.pieces.pieces[0] else {
        panic!("expected a term piece first");
    };
    assert_eq!(entry.target, "Hong Gil-dong");
    assert!(matches!(entry.origin, EntryOrigin::Standalone { .. }));
}

#[test]
fn repeated_variant_is_normalized_twice() {
    let snap = snapshot(
        r#"{"terms": [{"key": "gray", "target": "gray", "variants": ["grey"],
            "sources": [{"text": "그레이"}]}]}"#,
    );
    let mut pipeline = GlossaryPipeline::new(&snap, PipelineOptions::default()).unwrap();
    let prepared = pipeline.prepare(Segment::new("s1", "그레이와 그레이"));
    assert_eq!(prepared.outgoing, "그레이와 그레이");

    let restored = pipeline.restore(&prepared, "나는 grey와 grey를 좋아함");
    assert_eq!(restored.text, "나는 gray와 gray를 좋아함");
    let normalized: Vec<_> = restored
        .final_ranges
        .iter()
        .filter(|r| r.kind == RangeKind::Normalized)
        .collect();
    assert_eq!(normalized.len(), 2);
    for r in normalized {
        assert_eq!(r.text(&restored.text), Some("gray"));
    }
    assert_eq!(restored.pre_normalized_ranges.len(), 2);
}

#[test]
fn unknown_damaged_ids_are_left_alone() {
    let snap = snapshot(
        r#"{"terms": [{"key": "kai", "target": "카이", "sources": [{"text": "Kai"}],
            "pre_mask": true}]}"#,
    );
    let mut pipeline = GlossaryPipeline::new(&snap, PipelineOptions::default()).unwrap();
    let prepared = pipeline.prepare(Segment::new("s1", "Kai left."));
    let restored = pipeline.restore(&prepared, "__ E#1 __는 떠났다. __ E#9 __");
    assert_eq!(restored.text, "카이는 떠났다. __ E#9 __");
    assert_targets_at_ranges(&restored);
}
