//! Read-only glossary snapshot: terms, their sources and composition patterns.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

mod entry;
mod template;

pub use entry::{deduplicate, ComponentTerm, EntryOrigin, GlossaryEntry};
pub(crate) use template::{render, select_target_template, uses_right};

macro_rules! shared_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: &str) -> Self {
                Self(Arc::from(id))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

shared_id!(RoleId);
shared_id!(GroupId);

/// Role filter of one side of a pattern. Absent or blank means any role.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum RoleFilter {
    #[default]
    Any,
    Only(RoleId),
}

impl RoleFilter {
    #[must_use]
    pub fn matches(&self, role: Option<&RoleId>) -> bool {
        match self {
            RoleFilter::Any => true,
            RoleFilter::Only(want) => role == Some(want),
        }
    }
}

impl From<Option<String>> for RoleFilter {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref().map(str::trim) {
            Some(role) if !role.is_empty() => RoleFilter::Only(RoleId::new(role)),
            _ => RoleFilter::Any,
        }
    }
}

impl From<RoleFilter> for Option<String> {
    fn from(filter: RoleFilter) -> Self {
        match filter {
            RoleFilter::Any => None,
            RoleFilter::Only(role) => Some(role.as_str().to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSource {
    pub text: String,
    #[serde(default)]
    pub prohibit_standalone: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMembership {
    pub pattern: String,
    #[serde(default)]
    pub role: Option<RoleId>,
    #[serde(default)]
    pub group: Option<GroupId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub key: String,
    pub target: String,
    #[serde(default)]
    pub variants: Vec<String>,
    pub sources: Vec<TermSource>,
    #[serde(default)]
    pub deactivation_contexts: Vec<String>,
    #[serde(default)]
    pub activators: Vec<String>,
    #[serde(default)]
    pub activates: Vec<String>,
    #[serde(default)]
    pub components: Vec<ComponentMembership>,
    #[serde(default)]
    pub is_appellation: bool,
    #[serde(default)]
    pub pre_mask: bool,
}

impl Term {
    pub fn new(key: &str, target: &str) -> Self {
        Self {
            key: key.to_string(),
            target: target.to_string(),
            variants: Vec::new(),
            sources: Vec::new(),
            deactivation_contexts: Vec::new(),
            activators: Vec::new(),
            activates: Vec::new(),
            components: Vec::new(),
            is_appellation: false,
            pre_mask: false,
        }
    }

    #[must_use]
    pub fn source(mut self, text: &str) -> Self {
        self.sources.push(TermSource {
            text: text.to_string(),
            prohibit_standalone: false,
        });
        self
    }

    #[must_use]
    pub fn gated_source(mut self, text: &str) -> Self {
        self.sources.push(TermSource {
            text: text.to_string(),
            prohibit_standalone: true,
        });
        self
    }

    #[must_use]
    pub fn variant(mut self, variant: &str) -> Self {
        self.variants.push(variant.to_string());
        self
    }

    #[must_use]
    pub fn deactivated_by(mut self, context: &str) -> Self {
        self.deactivation_contexts.push(context.to_string());
        self
    }

    #[must_use]
    pub fn activated_by(mut self, key: &str) -> Self {
        self.activators.push(key.to_string());
        self
    }

    #[must_use]
    pub fn component(mut self, pattern: &str, role: Option<&str>, group: Option<&str>) -> Self {
        self.components.push(ComponentMembership {
            pattern: pattern.to_string(),
            role: role.map(RoleId::new),
            group: group.map(GroupId::new),
        });
        self
    }

    #[must_use]
    pub fn masked(mut self, is_appellation: bool) -> Self {
        self.pre_mask = true;
        self.is_appellation = is_appellation;
        self
    }
}

fn default_joiners() -> Vec<String> {
    vec![String::new()]
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    #[serde(default)]
    pub left_role: RoleFilter,
    #[serde(default)]
    pub right_role: RoleFilter,
    pub source_templates: Vec<String>,
    #[serde(default)]
    pub target_templates: Vec<String>,
    #[serde(default = "default_joiners")]
    pub joiners: Vec<String>,
    #[serde(default = "default_true")]
    pub skip_pairs_if_same_term: bool,
    #[serde(default)]
    pub is_appellation: bool,
    #[serde(default)]
    pub pre_mask: bool,
    #[serde(default)]
    pub need_pair_check: bool,
}

impl Pattern {
    /// Pair pattern when any template references `{R}`; otherwise left-only.
    #[must_use]
    pub fn uses_right(&self) -> bool {
        self.source_templates
            .iter()
            .chain(self.target_templates.iter())
            .any(|t| uses_right(t))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossarySnapshot {
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

impl GlossarySnapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read glossary: {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parse glossary: {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let snapshot: GlossarySnapshot = serde_json::from_str(raw).context("glossary json")?;
        Ok(snapshot)
    }

    #[must_use]
    pub fn term(&self, key: &str) -> Option<&Term> {
        self.terms.iter().find(|t| t.key == key)
    }
}
