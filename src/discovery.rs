//! Directly-follows aggregation
//!
//! Rolls event-level DF edges of one entity type up into class-level
//! `DF_C` edges between activity classes. In threshold mode a class pair
//! survives only when its frequency exceeds the absolute threshold and
//! dominates the reverse direction by the relative threshold.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::info;

use crate::config::{AggregationPolicy, BuilderConfig};
use crate::error::{EkgError, EkgResult};
use crate::gateway::{GraphGateway, Row};
use crate::model::SemanticHeader;
use crate::query::templates::{self, AggregationRequest};

/// Pruning parameters of one aggregation run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DfThresholds {
    pub df_threshold: u64,
    pub relative_df_threshold: f64,
    pub exclude_self_loops: bool,
}

impl DfThresholds {
    pub fn is_threshold_free(&self) -> bool {
        self.df_threshold == 0 && self.relative_df_threshold == 0.0
    }
}

impl Default for DfThresholds {
    fn default() -> Self {
        Self {
            df_threshold: 0,
            relative_df_threshold: 0.0,
            exclude_self_loops: true,
        }
    }
}

/// A class pair that survived pruning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassEdge<K> {
    pub from: K,
    pub to: K,
    pub count: u64,
}

/// Count observations per class pair
pub fn count_class_pairs<K, I>(pairs: I) -> FxHashMap<(K, K), u64>
where
    K: Eq + Hash,
    I: IntoIterator<Item = (K, K)>,
{
    let mut counts = FxHashMap::default();
    for pair in pairs {
        *counts.entry(pair).or_insert(0) += 1;
    }
    counts
}

/// Select the class pairs that become class-level edges, ordered by pair.
///
/// Pairs with a zero count never produce an edge. In threshold mode the
/// reverse frequency is read from the same count table.
pub fn select_class_edges<K>(counts: &FxHashMap<(K, K), u64>, thresholds: &DfThresholds) -> Vec<ClassEdge<K>>
where
    K: Copy + Eq + Hash + Ord,
{
    let threshold_free = thresholds.is_threshold_free();
    let mut edges: Vec<ClassEdge<K>> = counts
        .iter()
        .filter_map(|(&(from, to), &count)| {
            if count == 0 || (thresholds.exclude_self_loops && from == to) {
                return None;
            }
            if !threshold_free {
                if count <= thresholds.df_threshold {
                    return None;
                }
                let reverse = counts.get(&(to, from)).copied().unwrap_or(0);
                if count as f64 * thresholds.relative_df_threshold <= reverse as f64 {
                    return None;
                }
            }
            Some(ClassEdge { from, to, count })
        })
        .collect();
    edges.sort_by(|a, b| (a.from, a.to).cmp(&(b.from, b.to)));
    edges
}

/// Runs class-level aggregation through a gateway
pub struct DfAggregator<G: GraphGateway> {
    header: Arc<SemanticHeader>,
    gateway: Arc<G>,
    config: BuilderConfig,
}

impl<G: GraphGateway> DfAggregator<G> {
    pub fn new(header: Arc<SemanticHeader>, gateway: Arc<G>, config: BuilderConfig) -> Self {
        Self { header, gateway, config }
    }

    /// Aggregate DF edges of `entity_type` with the configured write policy.
    /// Returns one row `{from_id, to_id, count}` per class-level edge kept.
    pub async fn aggregate(&self, entity_type: &str, request: &AggregationRequest) -> EkgResult<Vec<Row>> {
        self.aggregate_with_policy(entity_type, request, self.config.aggregation_policy)
            .await
    }

    pub async fn aggregate_with_policy(
        &self,
        entity_type: &str,
        request: &AggregationRequest,
        policy: AggregationPolicy,
    ) -> EkgResult<Vec<Row>> {
        let entity = self
            .header
            .df_entity(entity_type)
            .ok_or_else(|| EkgError::config(format!("unknown entity type '{}'", entity_type)))?;
        if request.relative_df_threshold < 0.0 || request.relative_df_threshold.is_nan() {
            return Err(EkgError::config("relative_df_threshold must be a non-negative number"));
        }

        let statement = templates::aggregate_df_with_policy(&entity, request, &self.config, policy);
        let rows = self.gateway.execute(&statement).await?;
        info!(
            "DF_C edges for ({}) aggregated: {} class pairs (df_threshold={}, relative_df_threshold={})",
            entity_type,
            rows.len(),
            request.df_threshold,
            request.relative_df_threshold
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_counts() -> FxHashMap<(&'static str, &'static str), u64> {
        let mut pairs = vec![("A", "B"); 3];
        pairs.push(("B", "A"));
        pairs.push(("B", "B"));
        count_class_pairs(pairs)
    }

    #[test]
    fn test_threshold_free_keeps_every_pair() {
        let edges = select_class_edges(&resource_counts(), &DfThresholds::default());
        assert_eq!(
            edges,
            vec![
                ClassEdge { from: "A", to: "B", count: 3 },
                ClassEdge { from: "B", to: "A", count: 1 },
            ]
        );
    }

    #[test]
    fn test_self_loops_can_be_kept() {
        let thresholds = DfThresholds { exclude_self_loops: false, ..Default::default() };
        let edges = select_class_edges(&resource_counts(), &thresholds);
        assert_eq!(edges.len(), 3);
        assert!(edges.contains(&ClassEdge { from: "B", to: "B", count: 1 }));
    }

    #[test]
    fn test_directional_filter() {
        let thresholds = DfThresholds {
            df_threshold: 2,
            relative_df_threshold: 2.0,
            exclude_self_loops: true,
        };
        let edges = select_class_edges(&resource_counts(), &thresholds);
        assert_eq!(edges, vec![ClassEdge { from: "A", to: "B", count: 3 }]);
    }

    #[test]
    fn test_ratio_must_dominate_reverse() {
        let mut pairs = vec![("A", "B"); 4];
        pairs.extend(vec![("B", "A"); 3]);
        let counts = count_class_pairs(pairs);

        let strict = DfThresholds { df_threshold: 1, relative_df_threshold: 0.5, exclude_self_loops: true };
        // 4 * 0.5 = 2 is not above 3; 3 * 0.5 = 1.5 is not above 4
        assert!(select_class_edges(&counts, &strict).is_empty());

        let loose = DfThresholds { relative_df_threshold: 1.0, ..strict };
        assert_eq!(select_class_edges(&counts, &loose), vec![ClassEdge { from: "A", to: "B", count: 4 }]);
    }

    #[test]
    fn test_zero_relative_threshold_keeps_nothing() {
        let thresholds = DfThresholds { df_threshold: 1, relative_df_threshold: 0.0, exclude_self_loops: true };
        assert!(select_class_edges(&resource_counts(), &thresholds).is_empty());
    }

    #[test]
    fn test_zero_counts_never_produce_edges() {
        let mut counts = FxHashMap::default();
        counts.insert((1u64, 2u64), 0);
        assert!(select_class_edges(&counts, &DfThresholds::default()).is_empty());
    }

    #[test]
    fn test_threshold_monotonicity() {
        let mut pairs = Vec::new();
        for (i, n) in [(0u64, 7u64), (1, 5), (2, 3), (3, 1)] {
            for _ in 0..n {
                pairs.push((i, i + 1));
            }
            pairs.push((i + 1, i));
        }
        let counts = count_class_pairs(pairs);

        let mut previous = usize::MAX;
        for df_threshold in 0..9 {
            let thresholds = DfThresholds { df_threshold, relative_df_threshold: 1.0, exclude_self_loops: true };
            let kept = select_class_edges(&counts, &thresholds).len();
            assert!(kept <= previous, "threshold {} kept {} > {}", df_threshold, kept, previous);
            previous = kept;
        }
        assert_eq!(previous, 0);
    }
}
