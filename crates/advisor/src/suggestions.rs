//! Ranked suggestion aggregation with progressive partial reveal.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::Score;

/// One ranked engine suggestion, enriched with human-readable notation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisLine {
    pub rank: u32,
    pub depth: Option<u32>,
    pub score: Score,
    /// Principal variation as coordinate moves.
    pub pv: Vec<String>,
    /// Translated notation of the first move (raw coordinates when the
    /// rules engine rejected the replay).
    pub san: String,
    /// Translated notation of the opening plies of the variation.
    pub line: String,
}

/// Rank-ordered view of the best-known lines for one analysis batch.
/// Replaced wholesale, never partially mutated by a consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSnapshot {
    pub lines: Vec<AnalysisLine>,
    /// Maximum search depth seen across lines in this batch.
    pub search_depth: Option<u32>,
    pub generated_at: Option<DateTime<Utc>>,
}

/// Mapping from rank to the best-known line for that slot.
///
/// `reset` must run once per newly issued analysis request, before the
/// first record of the new batch is applied; stale ranks from the previous
/// position would otherwise leak into the new snapshot.
#[derive(Debug, Default)]
pub struct SuggestionSet {
    by_rank: BTreeMap<u32, AnalysisLine>,
    search_depth: Option<u32>,
    updated_at: Option<DateTime<Utc>>,
}

impl SuggestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all state for a new analysis batch.
    pub fn reset(&mut self) {
        self.by_rank.clear();
        self.search_depth = None;
        self.updated_at = None;
    }

    /// Insert or replace the line for its rank.
    pub fn apply(&mut self, line: AnalysisLine) {
        self.search_depth = self.search_depth.max(line.depth);
        self.by_rank.insert(line.rank, line);
        self.updated_at = Some(Utc::now());
    }

    /// Rank-ordered snapshot; partial batches are exposed immediately.
    pub fn snapshot(&self) -> AnalysisSnapshot {
        AnalysisSnapshot {
            lines: self.by_rank.values().cloned().collect(),
            search_depth: self.search_depth,
            generated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(rank: u32, depth: Option<u32>, uci: &str) -> AnalysisLine {
        AnalysisLine {
            rank,
            depth,
            score: Score::Centipawns(10),
            pv: vec![uci.to_string()],
            san: uci.to_string(),
            line: uci.to_string(),
        }
    }

    #[test]
    fn test_snapshot_sorted_by_rank() {
        let mut set = SuggestionSet::new();
        set.apply(line(2, Some(10), "d2d4"));
        set.apply(line(1, Some(10), "e2e4"));
        let snapshot = set.snapshot();
        let ranks: Vec<u32> = snapshot.lines.iter().map(|l| l.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn test_reapply_replaces_rank() {
        let mut set = SuggestionSet::new();
        set.apply(line(1, Some(8), "e2e4"));
        set.apply(line(1, Some(12), "d2d4"));
        let snapshot = set.snapshot();
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].pv, vec!["d2d4"]);
    }

    #[test]
    fn test_partial_batch_exposed_immediately() {
        let mut set = SuggestionSet::new();
        set.apply(line(1, Some(6), "e2e4"));
        let snapshot = set.snapshot();
        assert_eq!(snapshot.lines.len(), 1);
        assert!(snapshot.generated_at.is_some());
    }

    #[test]
    fn test_search_depth_is_batch_maximum() {
        let mut set = SuggestionSet::new();
        set.apply(line(1, Some(14), "e2e4"));
        set.apply(line(2, Some(11), "d2d4"));
        set.apply(line(3, None, "c2c4"));
        assert_eq!(set.snapshot().search_depth, Some(14));
    }

    #[test]
    fn test_reset_clears_previous_batch() {
        let mut set = SuggestionSet::new();
        set.apply(line(1, Some(14), "e2e4"));
        set.apply(line(2, Some(14), "d2d4"));
        set.reset();
        let snapshot = set.snapshot();
        assert!(snapshot.lines.is_empty());
        assert_eq!(snapshot.search_depth, None);
        assert_eq!(snapshot.generated_at, None);
    }
}
