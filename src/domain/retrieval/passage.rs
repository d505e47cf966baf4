//! Passage and context types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A retrieved unit of context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text
    pub content: String,

    /// Opaque handle to the originating document or chunk
    pub source_id: String,

    /// Similarity or fusion score, higher is better once normalized
    #[serde(default)]
    pub score: f32,
}

impl Passage {
    /// Create a new passage
    pub fn new(content: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_id: source_id.into(),
            score: 0.0,
        }
    }

    /// Set the score
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Stable identity derived from the content
    pub fn content_key(&self) -> String {
        content_key(&self.content)
    }
}

/// Hex SHA-256 of a passage body
pub fn content_key(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// How a retrieval backend orders its raw scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOrder {
    /// Similarities: larger values rank first
    #[default]
    HigherIsBetter,
    /// Distances: smaller values rank first
    LowerIsBetter,
}

/// Normalize raw backend scores so that better passages sort first.
///
/// Distances are mapped to `1 / (1 + d)`. The sort is stable, so a backend
/// that already returns ranked results with equal scores keeps its order.
pub fn normalize_ranking(mut passages: Vec<Passage>, order: ScoreOrder) -> Vec<Passage> {
    if order == ScoreOrder::LowerIsBetter {
        for passage in &mut passages {
            passage.score = 1.0 / (1.0 + passage.score.max(0.0));
        }
    }

    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    passages
}

/// Ordered passages; insertion order is rank order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    passages: Vec<Passage>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context, dropping passages whose content was already seen
    pub fn from_passages(passages: Vec<Passage>) -> Self {
        let mut context = Self::new();
        context.merge(passages);
        context
    }

    /// Append a passage unless one with the same content is present.
    /// Returns whether it was added.
    pub fn push_unique(&mut self, passage: Passage) -> bool {
        if self.contains(&passage.content) {
            return false;
        }
        self.passages.push(passage);
        true
    }

    /// Append passages in order, suppressing duplicates. Returns the number added.
    pub fn merge(&mut self, passages: impl IntoIterator<Item = Passage>) -> usize {
        passages
            .into_iter()
            .filter(|p| !p.content.is_empty())
            .map(|p| self.push_unique(p))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, content: &str) -> bool {
        self.passages.iter().any(|p| p.content == content)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    pub fn into_passages(self) -> Vec<Passage> {
        self.passages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Passage> {
        self.passages.iter()
    }

    /// Keep only the first `len` passages
    pub fn truncate(&mut self, len: usize) {
        self.passages.truncate(len);
    }

    /// Total characters of passage content
    pub fn content_len(&self) -> usize {
        self.passages.iter().map(|p| p.content.len()).sum()
    }

    /// Join passage contents with a separator
    pub fn join(&self, separator: &str) -> String {
        self.passages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl From<Vec<Passage>> for Context {
    fn from(passages: Vec<Passage>) -> Self {
        Self::from_passages(passages)
    }
}

impl<'a> IntoIterator for &'a Context {
    type Item = &'a Passage;
    type IntoIter = std::slice::Iter<'a, Passage>;

    fn into_iter(self) -> Self::IntoIter {
        self.passages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_suppresses_duplicate_content() {
        let mut context = Context::from_passages(vec![
            Passage::new("alpha", "doc-1"),
            Passage::new("beta", "doc-2"),
        ]);

        let added = context.merge(vec![
            Passage::new("beta", "doc-9"),
            Passage::new("gamma", "doc-3"),
        ]);

        assert_eq!(added, 1);
        assert_eq!(context.len(), 3);
        assert_eq!(context.passages()[1].source_id, "doc-2");
        assert_eq!(context.join("|"), "alpha|beta|gamma");
    }

    #[test]
    fn test_content_key_is_stable() {
        let a = Passage::new("same text", "a");
        let b = Passage::new("same text", "b");
        assert_eq!(a.content_key(), b.content_key());
        assert_eq!(a.content_key().len(), 64);
    }

    #[test]
    fn test_normalize_distances_sorts_nearest_first() {
        let passages = vec![
            Passage::new("far", "1").with_score(3.0),
            Passage::new("near", "2").with_score(0.0),
            Passage::new("mid", "3").with_score(1.0),
        ];

        let ranked = normalize_ranking(passages, ScoreOrder::LowerIsBetter);

        let order: Vec<_> = ranked.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(order, vec!["near", "mid", "far"]);
        assert!((ranked[0].score - 1.0).abs() < f32::EPSILON);
        assert!((ranked[1].score - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalize_keeps_backend_order_on_ties() {
        let passages = vec![Passage::new("first", "1"), Passage::new("second", "2")];
        let ranked = normalize_ranking(passages, ScoreOrder::HigherIsBetter);
        assert_eq!(ranked[0].content, "first");
    }
}
