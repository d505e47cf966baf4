//! Reciprocal rank fusion over ranked passage lists

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::retrieval::Passage;

/// Default RRF constant
pub const DEFAULT_FUSION_K: u32 = 60;

/// A fused passage with its accumulated score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedPassage {
    pub passage: Passage,

    /// Sum of `1 / (rank + k)` over every list the passage appears in
    pub score: f64,

    /// 1-indexed rank per input list, `None` where absent
    pub ranks: Vec<Option<usize>>,
}

/// RRF parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankFusion {
    /// Constant k (typically 60)
    pub k: u32,
}

impl Default for RankFusion {
    fn default() -> Self {
        Self {
            k: DEFAULT_FUSION_K,
        }
    }
}

impl RankFusion {
    pub fn new(k: u32) -> Self {
        Self { k: k.max(1) }
    }

    /// Fuse ranked lists into one list, best first.
    ///
    /// Passages are identified by content hash, so the same text found by
    /// several query variants collapses to one entry holding the first copy
    /// seen. Equal scores keep first-seen order.
    pub fn fuse(&self, lists: &[Vec<Passage>]) -> Vec<FusedPassage> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut fused: Vec<FusedPassage> = Vec::new();

        for (list_idx, list) in lists.iter().enumerate() {
            for (position, passage) in list.iter().enumerate() {
                let rank = position + 1;
                let contribution = 1.0 / (rank as f64 + f64::from(self.k));
                let key = passage.content_key();

                let slot = match index.get(&key) {
                    Some(&slot) => slot,
                    None => {
                        index.insert(key, fused.len());
                        fused.push(FusedPassage {
                            passage: passage.clone(),
                            score: 0.0,
                            ranks: vec![None; lists.len()],
                        });
                        fused.len() - 1
                    }
                };

                let entry = &mut fused[slot];
                // A list repeating the same text only counts its best rank
                if entry.ranks[list_idx].is_none() {
                    entry.ranks[list_idx] = Some(rank);
                    entry.score += contribution;
                }
            }
        }

        // Stable sort keeps first-seen order for ties
        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        fused
    }

    /// Fuse and return passages carrying their fused score
    pub fn fuse_passages(&self, lists: &[Vec<Passage>], limit: usize) -> Vec<Passage> {
        self.fuse(lists)
            .into_iter()
            .take(limit)
            .map(|f| {
                let score = f.score as f32;
                f.passage.with_score(score)
            })
            .collect()
    }
}

/// Fuse with the given constant
pub fn reciprocal_rank_fusion(lists: &[Vec<Passage>], k: u32) -> Vec<FusedPassage> {
    RankFusion::new(k).fuse(lists)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(content: &str) -> Passage {
        Passage::new(content, format!("src-{}", content))
    }

    fn contents(fused: &[FusedPassage]) -> Vec<&str> {
        fused.iter().map(|f| f.passage.content.as_str()).collect()
    }

    #[test]
    fn test_tie_keeps_first_seen_order() {
        let lists = vec![
            vec![p("A"), p("B"), p("C")],
            vec![p("B"), p("A"), p("D")],
        ];

        let fused = reciprocal_rank_fusion(&lists, 60);

        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert_eq!(fused[0].score, fused[1].score);
        assert!((fused[0].score - expected).abs() < 1e-12);
        assert_eq!(contents(&fused), vec!["A", "B", "C", "D"]);
        assert_eq!(fused[0].ranks, vec![Some(1), Some(2)]);
        assert_eq!(fused[3].ranks, vec![None, Some(3)]);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let lists = vec![
            vec![p("x"), p("y"), p("z")],
            vec![p("z"), p("w")],
            vec![p("y"), p("x")],
        ];
        let fusion = RankFusion::default();

        let first = fusion.fuse(&lists);
        for _ in 0..10 {
            assert_eq!(fusion.fuse(&lists), first);
        }
    }

    #[test]
    fn test_passage_in_more_lists_ranks_higher() {
        let lists = vec![vec![p("solo"), p("shared")], vec![p("shared")]];

        let fused = RankFusion::new(60).fuse(&lists);

        assert_eq!(contents(&fused), vec!["shared", "solo"]);
        assert!((fused[0].score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn test_identity_is_content_not_source() {
        let lists = vec![
            vec![Passage::new("same", "doc-1")],
            vec![Passage::new("same", "doc-2")],
        ];

        let fused = RankFusion::default().fuse(&lists);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].passage.source_id, "doc-1");
    }

    #[test]
    fn test_fuse_passages_truncates_and_sets_score() {
        let lists = vec![vec![p("a"), p("b"), p("c")]];

        let passages = RankFusion::new(60).fuse_passages(&lists, 2);

        assert_eq!(passages.len(), 2);
        assert!((passages[0].score - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert!(RankFusion::default().fuse(&[]).is_empty());
        assert!(RankFusion::default().fuse(&[vec![], vec![]]).is_empty());
    }
}
