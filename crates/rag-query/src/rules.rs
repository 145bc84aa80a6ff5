//! Rule-based result pinning.
//!
//! A ruleset holds pinned rules. When every criterion of a rule matches the
//! request metadata, the rule's document ids are placed ahead of the organic
//! ranking. The JSON layout follows the search engine's query-rules payload:
//!
//! ```json
//! {
//!   "ruleset_id": "promotion-rules",
//!   "rules": [{
//!     "rule_id": "us-charger",
//!     "type": "pinned",
//!     "criteria": [
//!       {"type": "contains", "metadata": "my_query", "values": ["wireless charger"]},
//!       {"type": "exact", "metadata": "country", "values": ["us"]}
//!     ],
//!     "actions": {"ids": ["us1"]}
//!   }]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use rag_core::{RagError, Result};

/// Request metadata matched against rule criteria (key → value).
pub type MatchCriteria = BTreeMap<String, String>;

/// How a criterion compares the request value with its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionKind {
    /// Value equals one of the criterion values.
    Exact,
    /// Value contains one of the criterion values (case-insensitive).
    Contains,
    /// Value starts with one of the criterion values (case-insensitive).
    Prefix,
}

/// A single rule condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCriterion {
    /// Comparison kind.
    #[serde(rename = "type")]
    pub kind: CriterionKind,

    /// Metadata key to read from the request.
    pub metadata: String,

    /// Accepted values; any one matching is enough.
    pub values: Vec<String>,
}

impl RuleCriterion {
    /// Create a criterion.
    pub fn new(kind: CriterionKind, metadata: impl Into<String>, values: &[&str]) -> Self {
        Self {
            kind,
            metadata: metadata.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Check the criterion against request metadata.
    pub fn matches(&self, criteria: &MatchCriteria) -> bool {
        let Some(actual) = criteria.get(&self.metadata) else {
            return false;
        };

        match self.kind {
            CriterionKind::Exact => self.values.iter().any(|v| v == actual),
            CriterionKind::Contains => {
                let actual = actual.to_lowercase();
                self.values
                    .iter()
                    .any(|v| actual.contains(&v.to_lowercase()))
            }
            CriterionKind::Prefix => {
                let actual = actual.to_lowercase();
                self.values
                    .iter()
                    .any(|v| actual.starts_with(&v.to_lowercase()))
            }
        }
    }
}

/// Rule type. Only pinning is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[default]
    Pinned,
}

/// What a matching rule does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleActions {
    /// Document ids to pin, in order.
    pub ids: Vec<String>,
}

/// A rule pinning documents when all its criteria match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedRule {
    /// Rule identifier, unique within a ruleset.
    pub rule_id: String,

    /// Rule type.
    #[serde(rename = "type", default)]
    pub rule_type: RuleType,

    /// Conditions, all of which must match.
    pub criteria: Vec<RuleCriterion>,

    /// Actions applied on match.
    pub actions: RuleActions,
}

impl PinnedRule {
    /// Create a pinned rule.
    pub fn new(rule_id: impl Into<String>, criteria: Vec<RuleCriterion>, ids: &[&str]) -> Self {
        Self {
            rule_id: rule_id.into(),
            rule_type: RuleType::Pinned,
            criteria,
            actions: RuleActions {
                ids: ids.iter().map(|id| id.to_string()).collect(),
            },
        }
    }

    /// A rule matches when it has criteria and all of them match.
    pub fn matches(&self, criteria: &MatchCriteria) -> bool {
        !self.criteria.is_empty() && self.criteria.iter().all(|c| c.matches(criteria))
    }
}

/// A named set of pinned rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Ruleset identifier.
    pub ruleset_id: String,

    /// Rules, evaluated in order.
    pub rules: Vec<PinnedRule>,
}

impl Ruleset {
    /// Create a ruleset.
    pub fn new(ruleset_id: impl Into<String>, rules: Vec<PinnedRule>) -> Self {
        Self {
            ruleset_id: ruleset_id.into(),
            rules,
        }
    }

    /// Parse and validate a ruleset from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let ruleset: Self = serde_json::from_str(json)?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Reject rulesets that could never behave as written.
    pub fn validate(&self) -> Result<()> {
        if self.ruleset_id.trim().is_empty() {
            return Err(RagError::invalid_argument("ruleset_id must not be empty"));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.rule_id.trim().is_empty() {
                return Err(RagError::invalid_argument(format!(
                    "ruleset '{}' has a rule with an empty rule_id",
                    self.ruleset_id
                )));
            }
            if !seen.insert(rule.rule_id.as_str()) {
                return Err(RagError::invalid_argument(format!(
                    "duplicate rule_id '{}' in ruleset '{}'",
                    rule.rule_id, self.ruleset_id
                )));
            }
            if rule.criteria.is_empty() {
                return Err(RagError::invalid_argument(format!(
                    "rule '{}' has no criteria",
                    rule.rule_id
                )));
            }
            if rule.criteria.iter().any(|c| c.values.is_empty()) {
                return Err(RagError::invalid_argument(format!(
                    "rule '{}' has a criterion without values",
                    rule.rule_id
                )));
            }
            if rule.actions.ids.is_empty() || rule.actions.ids.iter().any(|id| id.is_empty()) {
                return Err(RagError::invalid_argument(format!(
                    "rule '{}' must pin at least one non-empty id",
                    rule.rule_id
                )));
            }
        }

        Ok(())
    }

    /// Ids pinned for the given request metadata.
    ///
    /// Matching rules contribute in rule order; an id pinned twice keeps its
    /// first position.
    pub fn pinned_ids(&self, criteria: &MatchCriteria) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut pinned = Vec::new();

        for rule in self.rules.iter().filter(|r| r.matches(criteria)) {
            debug!("Rule '{}' matched", rule.rule_id);
            for id in &rule.actions.ids {
                if seen.insert(id.as_str()) {
                    pinned.push(id.clone());
                }
            }
        }

        pinned
    }
}

/// An entry of a ranking after pins were applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedEntry {
    /// Document identifier.
    pub id: String,

    /// Organic fused score, 0.0 for pinned ids absent from the ranking.
    pub score: f64,

    /// Whether the entry was placed by a rule.
    pub pinned: bool,
}

/// Put pinned ids ahead of an organic fused ranking.
///
/// Pinned ids keep their pin order and their organic score when they have
/// one. The organic entries follow in their fused order, minus the pinned
/// ids. No organic id is dropped.
pub fn apply_pins(fused: Vec<(String, f64)>, pinned: &[String]) -> Vec<PinnedEntry> {
    if pinned.is_empty() {
        return fused
            .into_iter()
            .map(|(id, score)| PinnedEntry {
                id,
                score,
                pinned: false,
            })
            .collect();
    }

    let organic: BTreeMap<&str, f64> = fused.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    let pinned_set: HashSet<&str> = pinned.iter().map(String::as_str).collect();

    let mut entries: Vec<PinnedEntry> = Vec::with_capacity(fused.len() + pinned.len());
    for id in pinned {
        entries.push(PinnedEntry {
            id: id.clone(),
            score: organic.get(id.as_str()).copied().unwrap_or(0.0),
            pinned: true,
        });
    }

    entries.extend(
        fused
            .iter()
            .filter(|(id, _)| !pinned_set.contains(id.as_str()))
            .map(|(id, score)| PinnedEntry {
                id: id.clone(),
                score: *score,
                pinned: false,
            }),
    );

    entries
}
