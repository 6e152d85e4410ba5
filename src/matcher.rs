use std::collections::{HashMap, HashSet};

use anyhow::Context;
use regex::RegexSet;
use tracing::debug;

use crate::glossary::{Term, TermSource};

/// Term key → source texts known to occur in the segment.
pub type SourceOccurrences = HashMap<String, HashSet<String>>;

#[derive(Clone, Debug)]
pub struct AppearedTerm<'a> {
    pub term: &'a Term,
    pub sources: Vec<&'a TermSource>,
}

impl<'a> AppearedTerm<'a> {
    #[must_use]
    pub fn key(&self) -> &'a str {
        &self.term.key
    }
}

fn is_deactivated(term: &Term, segment: &str) -> bool {
    term.deactivation_contexts
        .iter()
        .any(|ctx| !ctx.is_empty() && segment.contains(ctx.as_str()))
}

/// Keeps, per term, the sources that occur in `segment` unless the term is deactivated there.
pub fn find_appeared_terms<'a>(
    segment: &str,
    terms: &'a [Term],
    occurrences: &SourceOccurrences,
) -> Vec<AppearedTerm<'a>> {
    let mut out = Vec::new();
    for term in terms {
        let Some(known) = occurrences.get(&term.key) else {
            continue;
        };
        let sources: Vec<&TermSource> = term
            .sources
            .iter()
            .filter(|s| !s.text.is_empty())
            .filter(|s| known.contains(&s.text) && segment.contains(s.text.as_str()))
            .collect();
        if sources.is_empty() {
            continue;
        }
        if is_deactivated(term, segment) {
            debug!(term = %term.key, "term deactivated by context");
            continue;
        }
        out.push(AppearedTerm { term, sources });
    }
    out
}

/// Bulk literal search over every source of a snapshot.
#[derive(Debug)]
pub struct SourceIndex {
    set: RegexSet,
    owners: Vec<Vec<(String, String)>>,
}

impl SourceIndex {
    pub fn new(terms: &[Term]) -> anyhow::Result<Self> {
        let mut patterns: Vec<String> = Vec::new();
        let mut owners: Vec<Vec<(String, String)>> = Vec::new();
        let mut by_text: HashMap<&str, usize> = HashMap::new();
        for term in terms {
            for source in term.sources.iter().filter(|s| !s.text.is_empty()) {
                let slot = *by_text.entry(source.text.as_str()).or_insert_with(|| {
                    patterns.push(regex::escape(&source.text));
                    owners.push(Vec::new());
                    patterns.len() - 1
                });
                owners[slot].push((term.key.clone(), source.text.clone()));
            }
        }
        let set = RegexSet::new(&patterns).context("build source index")?;
        Ok(Self { set, owners })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    #[must_use]
    pub fn occurrences(&self, segment: &str) -> SourceOccurrences {
        let mut out = SourceOccurrences::new();
        for slot in self.set.matches(segment).iter() {
            for (key, text) in &self.owners[slot] {
                out.entry(key.clone()).or_default().insert(text.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> Vec<Term> {
        vec![
            Term::new("kai", "Kai").source("카이").source("Kai"),
            Term::new("apple", "Apple").source("애플").deactivated_by("사과나무"),
            Term::new("dup", "Kai2").source("카이"),
        ]
    }

    #[test]
    fn index_reports_every_owner() {
        let terms = terms();
        let index = SourceIndex::new(&terms).unwrap();
        assert_eq!(index.len(), 3);
        let occ = index.occurrences("카이가 애플을 먹었다");
        assert_eq!(occ["kai"], HashSet::from(["카이".to_string()]));
        assert!(occ.contains_key("dup"));
        assert!(occ.contains_key("apple"));
    }

    #[test]
    fn deactivation_is_segment_global() {
        let terms = terms();
        let index = SourceIndex::new(&terms).unwrap();
        let segment = "애플과 사과나무";
        let appeared = find_appeared_terms(segment, &terms, &index.occurrences(segment));
        assert!(appeared.iter().all(|a| a.key() != "apple"));
    }

    #[test]
    fn occurrence_set_must_agree_with_text() {
        let terms = terms();
        let mut occ = SourceOccurrences::new();
        occ.insert("kai".to_string(), HashSet::from(["Kai".to_string(), "카이".to_string()]));
        let appeared = find_appeared_terms("카이", &terms, &occ);
        assert_eq!(appeared.len(), 1);
        assert_eq!(appeared[0].sources.len(), 1);
        assert_eq!(appeared[0].sources[0].text, "카이");
    }

    #[test]
    fn empty_index_matches_nothing() {
        let index = SourceIndex::new(&[]).unwrap();
        assert!(index.is_empty());
        assert!(index.occurrences("anything").is_empty());
    }
}
