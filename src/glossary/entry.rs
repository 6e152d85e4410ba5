use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::{Term, TermSource};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryOrigin {
    Standalone {
        term_key: String,
    },
    Composed {
        pattern: String,
        left_key: String,
        right_key: Option<String>,
        need_pair_check: bool,
    },
}

/// A term that contributed to an entry, with the literal source text it matched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ComponentTerm {
    pub key: String,
    pub target: String,
    pub variants: Vec<String>,
    pub source: String,
}

impl ComponentTerm {
    pub fn new(term: &Term, source: &str) -> Self {
        Self {
            key: term.key.clone(),
            target: term.target.clone(),
            variants: term.variants.clone(),
            source: source.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
    pub variants: BTreeSet<String>,
    pub pre_mask: bool,
    pub is_appellation: bool,
    pub prohibit_standalone: bool,
    pub origin: EntryOrigin,
    pub component_terms: Vec<ComponentTerm>,
    pub activator_keys: BTreeSet<String>,
    pub activates_keys: BTreeSet<String>,
}

impl GlossaryEntry {
    pub fn standalone(term: &Term, source: &TermSource) -> Self {
        Self {
            source: source.text.clone(),
            target: term.target.clone(),
            variants: term.variants.iter().filter(|v| !v.is_empty()).cloned().collect(),
            pre_mask: term.pre_mask,
            is_appellation: term.is_appellation,
            prohibit_standalone: source.prohibit_standalone,
            origin: EntryOrigin::Standalone {
                term_key: term.key.clone(),
            },
            component_terms: vec![ComponentTerm::new(term, &source.text)],
            activator_keys: term.activators.iter().cloned().collect(),
            activates_keys: term.activates.iter().cloned().collect(),
        }
    }

    /// Entry standing for one component of `self`, used when a fallback spelling was matched.
    pub fn for_component(&self, key: &str, target: &str, variants: &[String]) -> Self {
        let source = self
            .component_terms
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.source.clone())
            .unwrap_or_else(|| self.source.clone());
        Self {
            source: source.clone(),
            target: target.to_string(),
            variants: variants.iter().filter(|v| !v.is_empty()).cloned().collect(),
            pre_mask: self.pre_mask,
            is_appellation: self.is_appellation,
            prohibit_standalone: false,
            origin: EntryOrigin::Standalone {
                term_key: key.to_string(),
            },
            component_terms: vec![ComponentTerm {
                key: key.to_string(),
                target: target.to_string(),
                variants: variants.to_vec(),
                source,
            }],
            activator_keys: BTreeSet::new(),
            activates_keys: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn is_composed(&self) -> bool {
        matches!(self.origin, EntryOrigin::Composed { .. })
    }

    pub fn term_keys(&self) -> impl Iterator<Item = &str> {
        self.component_terms.iter().map(|c| c.key.as_str())
    }

    fn merge_key(&self) -> (&str, &str, bool, bool) {
        (&self.source, &self.target, self.pre_mask, self.is_appellation)
    }

    /// Folds `other` (same source, target, masking and appellation flags) into `self`.
    pub fn merge(&mut self, other: &GlossaryEntry) {
        self.variants.extend(other.variants.iter().cloned());
        self.prohibit_standalone &= other.prohibit_standalone;
        self.activator_keys.extend(other.activator_keys.iter().cloned());
        self.activates_keys.extend(other.activates_keys.iter().cloned());
        for comp in &other.component_terms {
            if !self.component_terms.iter().any(|c| c.key == comp.key) {
                self.component_terms.push(comp.clone());
            }
        }
    }
}

/// Merges logically identical entries, keeping first-seen order.
pub fn deduplicate(entries: impl IntoIterator<Item = GlossaryEntry>) -> Vec<GlossaryEntry> {
    let mut out: Vec<GlossaryEntry> = Vec::new();
    let mut index: HashMap<(String, String, bool, bool), usize> = HashMap::new();
    for entry in entries {
        let (source, target, pre_mask, appellation) = entry.merge_key();
        let key = (source.to_string(), target.to_string(), pre_mask, appellation);
        match index.get(&key) {
            Some(&i) => out[i].merge(&entry),
            None => {
                index.insert(key, out.len());
                out.push(entry);
            }
        }
    }
    out
}
