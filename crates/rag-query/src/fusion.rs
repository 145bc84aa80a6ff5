//! Reciprocal Rank Fusion (RRF) for combining ranked result lists.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use serde_json::Value;
use tracing::debug;

use rag_core::{FusionConfig, RagError, Result};

/// RRF constant (commonly 60).
/// Higher values flatten the gap between top and lower ranks.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Leading entries of each list that take part in scoring.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Reciprocal Rank Fusion engine.
///
/// RRF score = Σ 1 / (k + rank) over every list an identifier appears in,
/// with `rank` 1-based and only the first `window_size` entries of each list
/// considered. Output is sorted by score descending, then identifier
/// ascending, so equal scores always resolve the same way.
///
/// The engine only holds its validated parameters and can be shared freely
/// between tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankFusionEngine {
    k: f64,
    window_size: usize,
}

impl Default for RankFusionEngine {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

impl RankFusionEngine {
    /// Create an engine, rejecting `k <= 0` (or non-finite) and `window_size == 0`.
    pub fn new(k: f64, window_size: usize) -> Result<Self> {
        if !k.is_finite() || k <= 0.0 {
            return Err(RagError::invalid_argument(format!(
                "k must be a positive number, got {}",
                k
            )));
        }
        if window_size == 0 {
            return Err(RagError::invalid_argument("window_size must be > 0"));
        }

        Ok(Self { k, window_size })
    }

    /// Create an engine from configuration.
    pub fn from_config(config: &FusionConfig) -> Result<Self> {
        Self::new(config.k, config.window_size)
    }

    /// Smoothing constant.
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Per-list scoring window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Contribution of a single 1-based rank.
    pub fn rank_score(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64)
    }

    /// Fuse ranked lists (best first) into one ranking.
    ///
    /// # Arguments
    /// * `lists` - Ranked lists of identifiers; may be empty
    ///
    /// # Returns
    /// Vector of (id, fused_score) pairs, sorted by fused score descending and
    /// then by id ascending
    pub fn fuse<I, L>(&self, lists: &[L]) -> Vec<(I, f64)>
    where
        I: Eq + Hash + Ord + Clone,
        L: AsRef<[I]>,
    {
        let mut terms: HashMap<I, Vec<f64>> = HashMap::new();

        for list in lists {
            self.accumulate(&mut terms, list.as_ref(), 1.0);
        }

        debug!(
            "Fusing {} lists (k={}, window_size={}) into {} ids",
            lists.len(),
            self.k,
            self.window_size,
            terms.len()
        );

        finish(terms)
    }

    /// Fuse ranked lists where each list's contributions are scaled by a weight.
    ///
    /// With every weight at 1.0 this is identical to [`RankFusionEngine::fuse`].
    /// Weights must be finite and strictly positive.
    pub fn fuse_weighted<I, L>(&self, lists: &[(L, f64)]) -> Result<Vec<(I, f64)>>
    where
        I: Eq + Hash + Ord + Clone,
        L: AsRef<[I]>,
    {
        for (idx, (_, weight)) in lists.iter().enumerate() {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(RagError::invalid_argument(format!(
                    "weight of list {} must be a positive number, got {}",
                    idx, weight
                )));
            }
        }

        let mut terms: HashMap<I, Vec<f64>> = HashMap::new();

        for (list, weight) in lists {
            self.accumulate(&mut terms, list.as_ref(), *weight);
        }

        debug!(
            "Fusing {} weighted lists (k={}, window_size={}) into {} ids",
            lists.len(),
            self.k,
            self.window_size,
            terms.len()
        );

        Ok(finish(terms))
    }

    fn accumulate<I>(&self, terms: &mut HashMap<I, Vec<f64>>, list: &[I], weight: f64)
    where
        I: Eq + Hash + Clone,
    {
        for (idx, id) in list.iter().take(self.window_size).enumerate() {
            let term = weight * self.rank_score(idx + 1);
            terms.entry(id.clone()).or_default().push(term);
        }
    }
}

/// Sum each id's terms in a fixed order and sort the result.
///
/// Terms are added smallest first, so the score of an id does not depend on
/// the order in which the input lists were given.
fn finish<I>(terms: HashMap<I, Vec<f64>>) -> Vec<(I, f64)>
where
    I: Ord,
{
    let mut fused: Vec<(I, f64)> = terms
        .into_iter()
        .map(|(id, mut parts)| {
            parts.sort_by(|a, b| a.total_cmp(b));
            (id, parts.iter().sum())
        })
        .collect();

    fused.sort_by(compare_fused);
    fused
}

fn compare_fused<I: Ord>(a: &(I, f64), b: &(I, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Fuse ranked lists with Reciprocal Rank Fusion.
///
/// Fails with `InvalidArgument` when `k <= 0` or `window_size == 0`, before
/// any scoring. An empty input (or only empty lists) yields an empty result.
pub fn reciprocal_rank_fusion<I, L>(lists: &[L], k: f64, window_size: usize) -> Result<Vec<(I, f64)>>
where
    I: Eq + Hash + Ord + Clone,
    L: AsRef<[I]>,
{
    let engine = RankFusionEngine::new(k, window_size)?;
    Ok(engine.fuse(lists))
}

/// Read ranked lists from untrusted JSON.
///
/// Expects an array of arrays. Entries must be non-empty strings or integers
/// (integers become their decimal string). Anything else fails the whole call
/// with `InvalidArgument` naming the offending list and position.
pub fn ranked_lists_from_json(value: &Value) -> Result<Vec<Vec<String>>> {
    let lists = value
        .as_array()
        .ok_or_else(|| RagError::invalid_argument("expected a JSON array of ranked lists"))?;

    let mut parsed = Vec::with_capacity(lists.len());

    for (list_idx, list) in lists.iter().enumerate() {
        let entries = list.as_array().ok_or_else(|| {
            RagError::invalid_argument(format!("list {} is not an array", list_idx + 1))
        })?;

        let mut ids = Vec::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            let id = match entry {
                Value::String(s) if !s.is_empty() => s.clone(),
                Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
                other => {
                    return Err(RagError::invalid_argument(format!(
                        "list {}, position {}: {} is not a valid document identifier",
                        list_idx + 1,
                        pos + 1,
                        other
                    )));
                }
            };
            ids.push(id);
        }

        parsed.push(ids);
    }

    Ok(parsed)
}
