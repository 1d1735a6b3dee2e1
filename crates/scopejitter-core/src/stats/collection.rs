//! Running offset collection for one sweep value
//!
//! Loops contribute independently; contributions only meet here, and the
//! collection is consumed once by aggregation when the loops finish.

use serde::{Deserialize, Serialize};

use super::distribution::{aggregate_with, AggregateConfig, FittedDistribution, OffsetSummary};
use crate::error::Result;
use crate::signal::reconcile::ReconcileStats;

/// Offsets accumulated over the capture loops of one sweep value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OffsetCollection {
    offsets: Vec<f64>,
    /// Offsets contributed by each loop, in loop order
    loop_sizes: Vec<usize>,
    reconcile: ReconcileStats,
}

impl OffsetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one loop's offsets and its reconciliation tally
    pub fn add_loop(&mut self, offsets: &[f64], stats: &ReconcileStats) {
        self.offsets.extend_from_slice(offsets);
        self.loop_sizes.push(offsets.len());
        self.reconcile.merge(stats);
        tracing::trace!(
            loop_offsets = offsets.len(),
            total = self.offsets.len(),
            "offsets_collected"
        );
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    pub fn loops(&self) -> usize {
        self.loop_sizes.len()
    }

    pub fn loop_sizes(&self) -> &[usize] {
        &self.loop_sizes
    }

    /// Reconciliation tally across every loop
    pub fn reconcile_stats(&self) -> &ReconcileStats {
        &self.reconcile
    }

    pub fn summary(&self, deskew: f64) -> Option<OffsetSummary> {
        OffsetSummary::from_offsets(&self.offsets, deskew)
    }

    /// Consume the collection into a fitted distribution
    pub fn aggregate(self, config: &AggregateConfig) -> Result<FittedDistribution> {
        aggregate_with(&self.offsets, config)
    }
}

impl FromIterator<f64> for OffsetCollection {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let offsets: Vec<f64> = iter.into_iter().collect();
        let mut collection = Self::new();
        collection.add_loop(&offsets, &ReconcileStats::default());
        collection
    }
}
