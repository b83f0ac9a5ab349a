use crate::models::{BookId, UserId};

use super::index::IndexMap;
use super::matrix::InteractionMatrix;

/// Sum of squared deviations at or below which a vector counts as constant
const VARIANCE_EPSILON: f64 = 1e-12;

/// Square, symmetric user × user correlation matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    /// Number of users on each side
    pub fn size(&self) -> usize {
        self.size
    }

    /// Similarity of users `i` and `j`, `None` if either index is out of range
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if j >= self.size {
            return None;
        }
        self.row(i).map(|row| row[j])
    }

    pub fn row(&self, i: usize) -> Option<&[f64]> {
        if i >= self.size {
            return None;
        }
        self.values.get(i * self.size..(i + 1) * self.size)
    }

    fn set_symmetric(&mut self, i: usize, j: usize, value: f64) {
        self.values[i * self.size + j] = value;
        self.values[j * self.size + i] = value;
    }
}

/// A row shifted to zero mean, with the norm of the shifted vector
struct CenteredRow {
    deviations: Vec<f64>,
    norm: f64,
}

impl CenteredRow {
    fn new(row: &[f64]) -> Self {
        if row.is_empty() {
            return Self {
                deviations: Vec::new(),
                norm: 0.0,
            };
        }

        let mean = row.iter().sum::<f64>() / row.len() as f64;
        let deviations: Vec<f64> = row.iter().map(|value| value - mean).collect();
        let sum_squares: f64 = deviations.iter().map(|d| d * d).sum();

        let norm = if sum_squares <= VARIANCE_EPSILON {
            0.0
        } else {
            sum_squares.sqrt()
        };

        Self { deviations, norm }
    }

    fn is_degenerate(&self) -> bool {
        self.norm == 0.0
    }

    fn correlation(&self, other: &CenteredRow) -> f64 {
        if self.is_degenerate() || other.is_degenerate() {
            return 0.0;
        }

        let covariance: f64 = self
            .deviations
            .iter()
            .zip(&other.deviations)
            .map(|(a, b)| a * b)
            .sum();

        let value = covariance / (self.norm * other.norm);
        if value.is_finite() {
            value.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Pearson correlation of two equally long vectors.
///
/// Returns exactly 0.0 when either vector has zero variance, where the
/// coefficient is otherwise undefined.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len(), "vectors must share one item space");
    CenteredRow::new(x).correlation(&CenteredRow::new(y))
}

/// Computes user–user similarity over the interaction matrix
pub struct SimilarityEngine;

impl SimilarityEngine {
    /// Correlates every pair of indexed users over the shared book space.
    ///
    /// Each pair is computed once and mirrored. The diagonal is 1.0 for users
    /// with variance and 0.0 for degenerate ones; ranking never reads it.
    pub fn compute(
        matrix: &InteractionMatrix,
        users: &IndexMap<UserId>,
        books: &IndexMap<BookId>,
    ) -> SimilarityMatrix {
        let rows: Vec<CenteredRow> = matrix
            .dense_rows(users, books)
            .iter()
            .map(|row| CenteredRow::new(row))
            .collect();

        let mut similarity = SimilarityMatrix::zeros(rows.len());
        let mut degenerate = 0usize;

        for (i, row) in rows.iter().enumerate() {
            if row.is_degenerate() {
                degenerate += 1;
            } else {
                similarity.set_symmetric(i, i, 1.0);
            }

            for (j, other) in rows.iter().enumerate().skip(i + 1) {
                similarity.set_symmetric(i, j, row.correlation(other));
            }
        }

        tracing::debug!(
            users = rows.len(),
            books = books.len(),
            degenerate_users = degenerate,
            "Similarity matrix computed"
        );

        similarity
    }
}
