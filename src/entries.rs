//! Activation and pattern composition: which glossary entries apply to a segment.

use std::collections::{BTreeSet, HashSet};

use regex::RegexSet;
use tracing::{debug, warn};

use crate::glossary::{
    deduplicate, render, select_target_template, ComponentTerm, EntryOrigin, GlossaryEntry,
    GroupId, Pattern, Term, TermSource,
};
use crate::matcher::AppearedTerm;

/// Standalone permission and activator gating.
///
/// Sources without `prohibit_standalone` are eligible outright. Gated sources need one of
/// their term's activators among those outright-eligible terms; self-activation never counts.
pub fn activate_terms<'a>(appeared: &[AppearedTerm<'a>]) -> Vec<AppearedTerm<'a>> {
    let standalone: HashSet<&str> = appeared
        .iter()
        .filter(|a| a.sources.iter().any(|s| !s.prohibit_standalone))
        .map(|a| a.key())
        .collect();

    let mut out = Vec::new();
    for a in appeared {
        let gate_open = a
            .term
            .activators
            .iter()
            .any(|k| k != &a.term.key && standalone.contains(k.as_str()));
        let sources: Vec<&TermSource> = a
            .sources
            .iter()
            .copied()
            .filter(|s| !s.prohibit_standalone || gate_open)
            .collect();
        if sources.is_empty() {
            debug!(term = %a.term.key, "gated term has no active activator");
            continue;
        }
        out.push(AppearedTerm {
            term: a.term,
            sources,
        });
    }
    out
}

/// Joiners that can actually occur in the segment; `""` always stays.
fn filter_joiners(joiners: &[String], segment: &str) -> Vec<String> {
    let mut out: Vec<String> = joiners
        .iter()
        .filter(|j| j.is_empty() || segment.contains(j.as_str()))
        .cloned()
        .collect();
    if !out.iter().any(String::is_empty) {
        out.push(String::new());
    }
    out
}

#[derive(Clone, Copy)]
struct Candidate<'t, 'a> {
    appeared: &'t AppearedTerm<'a>,
    group: Option<&'a GroupId>,
}

impl Candidate<'_, '_> {
    fn term(&self) -> &Term {
        self.appeared.term
    }
}

fn spellings(term: &Term) -> Vec<&str> {
    let mut out: Vec<&str> = vec![term.target.as_str()];
    for v in &term.variants {
        if !v.is_empty() && !out.contains(&v.as_str()) {
            out.push(v);
        }
    }
    out
}

fn render_variants(
    pattern: &Pattern,
    left: &Term,
    right: Option<&Term>,
    joiners: &[String],
    target: &str,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let left_forms = spellings(left);
    let right_forms = right.map(spellings);
    for template in &pattern.target_templates {
        for joiner in joiners {
            for l in &left_forms {
                match &right_forms {
                    None => {
                        out.insert(render(template, l, None, joiner));
                    }
                    Some(rights) => {
                        for r in rights {
                            out.insert(render(template, l, Some(r), joiner));
                            out.insert(render(template, r, Some(l), joiner));
                        }
                    }
                }
            }
        }
    }
    out.remove(target);
    out.remove("");
    out
}

fn compose_one(
    pattern: &Pattern,
    joiners: &[String],
    left: Candidate<'_, '_>,
    right: Option<Candidate<'_, '_>>,
) -> Vec<GlossaryEntry> {
    let lterm = left.term();
    let rterm = right.as_ref().map(|r| r.term());
    let template = select_target_template(&pattern.target_templates, rterm.is_some());
    let target = render(&template, &lterm.target, rterm.map(|t| t.target.as_str()), "");
    let variants = render_variants(pattern, lterm, rterm, joiners, &target);

    let mut activates: BTreeSet<String> = lterm.activates.iter().cloned().collect();
    if let Some(r) = rterm {
        activates.extend(r.activates.iter().cloned());
    }
    let origin = EntryOrigin::Composed {
        pattern: pattern.name.clone(),
        left_key: lterm.key.clone(),
        right_key: rterm.map(|t| t.key.clone()),
        need_pair_check: pattern.need_pair_check,
    };

    let right_sources: Vec<Option<&TermSource>> = match &right {
        Some(r) => r.appeared.sources.iter().map(|s| Some(*s)).collect(),
        None => vec![None],
    };

    let mut out = Vec::new();
    for joiner in joiners {
        for src_template in &pattern.source_templates {
            for ls in &left.appeared.sources {
                for rs in &right_sources {
                    let rtext = rs.map(|s| s.text.as_str());
                    let source = render(src_template, &ls.text, rtext, joiner);
                    if source.is_empty() {
                        continue;
                    }
                    let mut component_terms = vec![ComponentTerm::new(lterm, &ls.text)];
                    if let (Some(rt), Some(rs)) = (rterm, rs) {
                        component_terms.push(ComponentTerm::new(rt, &rs.text));
                    }
                    out.push(GlossaryEntry {
                        source,
                        target: target.clone(),
                        variants: variants.clone(),
                        pre_mask: pattern.pre_mask,
                        is_appellation: pattern.is_appellation,
                        prohibit_standalone: false,
                        origin: origin.clone(),
                        component_terms,
                        activator_keys: BTreeSet::new(),
                        activates_keys: activates.clone(),
                    });
                }
            }
        }
    }
    out
}

fn compose_pattern(
    segment: &str,
    eligible: &[AppearedTerm<'_>],
    pattern: &Pattern,
) -> Vec<GlossaryEntry> {
    let pair = pattern.uses_right();
    let mut lefts: Vec<Candidate<'_, '_>> = Vec::new();
    let mut rights: Vec<Candidate<'_, '_>> = Vec::new();
    let mut grouped = false;
    for appeared in eligible {
        for comp in appeared.term.components.iter().filter(|c| c.pattern == pattern.name) {
            grouped |= comp.group.is_some();
            let cand = Candidate {
                appeared,
                group: comp.group.as_ref(),
            };
            if pattern.left_role.matches(comp.role.as_ref()) {
                lefts.push(cand);
            }
            if pair && pattern.right_role.matches(comp.role.as_ref()) {
                rights.push(cand);
            }
        }
    }
    if lefts.is_empty() || (pair && rights.is_empty()) {
        return Vec::new();
    }

    let joiners = filter_joiners(&pattern.joiners, segment);
    let mut seen: HashSet<(&str, Option<&str>)> = HashSet::new();
    let mut out = Vec::new();
    if !pair {
        for left in &lefts {
            if seen.insert((left.appeared.key(), None)) {
                out.extend(compose_one(pattern, &joiners, *left, None));
            }
        }
        return out;
    }
    for left in &lefts {
        for right in &rights {
            if grouped && (left.group.is_none() || left.group != right.group) {
                continue;
            }
            if pattern.skip_pairs_if_same_term && left.appeared.key() == right.appeared.key() {
                continue;
            }
            if seen.insert((left.appeared.key(), Some(right.appeared.key()))) {
                out.extend(compose_one(pattern, &joiners, *left, Some(*right)));
            }
        }
    }
    out
}

/// Drops composed entries whose rendered source does not occur in the segment.
fn retain_present(segment: &str, entries: Vec<GlossaryEntry>) -> Vec<GlossaryEntry> {
    if entries.is_empty() {
        return entries;
    }
    let mut sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();
    let set = match RegexSet::new(sources.iter().map(|s| regex::escape(s))) {
        Ok(set) => set,
        Err(err) => {
            warn!(error = %err, "composed source set too large; falling back to substring search");
            return entries
                .into_iter()
                .filter(|e| segment.contains(e.source.as_str()))
                .collect();
        }
    };
    let present: HashSet<String> = set
        .matches(segment)
        .iter()
        .map(|i| sources[i].to_string())
        .collect();
    entries
        .into_iter()
        .filter(|e| present.contains(&e.source))
        .collect()
}

pub fn compose_entries(
    segment: &str,
    eligible: &[AppearedTerm<'_>],
    patterns: &[Pattern],
) -> Vec<GlossaryEntry> {
    let mut composed = Vec::new();
    for pattern in patterns {
        composed.extend(compose_pattern(segment, eligible, pattern));
    }
    retain_present(segment, composed)
}

/// Standalone entries first, then composed ones, merged.
pub fn build_entries(
    segment: &str,
    appeared: &[AppearedTerm<'_>],
    patterns: &[Pattern],
) -> Vec<GlossaryEntry> {
    let eligible = activate_terms(appeared);
    let mut entries: Vec<GlossaryEntry> = Vec::new();
    for a in &eligible {
        for source in &a.sources {
            entries.push(GlossaryEntry::standalone(a.term, source));
        }
    }
    let composed = compose_entries(segment, &eligible, patterns);
    debug!(standalone = entries.len(), composed = composed.len(), "built entries");
    entries.extend(composed);
    deduplicate(entries)
}
