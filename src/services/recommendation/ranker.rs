use std::collections::HashMap;

use crate::models::{BookId, UserId};

use super::index::IndexMap;
use super::matrix::InteractionMatrix;
use super::similarity::SimilarityMatrix;

/// A book's aggregated score from neighbor contributions
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub book_id: BookId,
    pub score: f64,
}

/// Ranks books for a target user from their nearest neighbors
#[derive(Debug, Clone, Copy)]
pub struct CandidateRanker {
    neighbor_count: usize,
    limit: usize,
}

impl CandidateRanker {
    pub fn new(neighbor_count: usize, limit: usize) -> Self {
        Self {
            neighbor_count,
            limit,
        }
    }

    /// The `neighbor_count` users most similar to `target`, excluding `target`.
    ///
    /// Only users positively correlated with `target` qualify. Ordered by
    /// descending similarity, ties by ascending user index.
    pub fn nearest_neighbors(&self, target: usize, similarity: &SimilarityMatrix) -> Vec<usize> {
        let Some(row) = similarity.row(target) else {
            return Vec::new();
        };
        let mut neighbors: Vec<usize> = (0..row.len())
            .filter(|&i| i != target && row[i] > 0.0)
            .collect();

        neighbors.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then_with(|| a.cmp(&b)));
        neighbors.truncate(self.neighbor_count);
        neighbors
    }

    /// Sums neighbor weights per book and returns the best `limit` books.
    ///
    /// A target without a position in `users` yields no candidates.
    pub fn rank(
        &self,
        target: Option<usize>,
        similarity: &SimilarityMatrix,
        matrix: &InteractionMatrix,
        users: &IndexMap<UserId>,
    ) -> Vec<CandidateScore> {
        let Some(target) = target else {
            return Vec::new();
        };

        let neighbors = self.nearest_neighbors(target, similarity);
        let mut scores: HashMap<&BookId, f64> = HashMap::new();

        for &neighbor in &neighbors {
            let Some(row) = users.id(neighbor).and_then(|user_id| matrix.row(user_id)) else {
                continue;
            };
            for (book_id, &weight) in row {
                if weight > 0.0 {
                    *scores.entry(book_id).or_insert(0.0) += weight;
                }
            }
        }

        let mut candidates: Vec<CandidateScore> = scores
            .into_iter()
            .map(|(book_id, score)| CandidateScore {
                book_id: book_id.clone(),
                score,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.book_id.cmp(&b.book_id))
        });
        candidates.truncate(self.limit);

        tracing::debug!(
            neighbors = neighbors.len(),
            candidates = candidates.len(),
            "Candidates ranked"
        );

        candidates
    }
}
