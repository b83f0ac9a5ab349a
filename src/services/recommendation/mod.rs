//! Collaborative-filtering recommendation engine.
//!
//! Raw behavior flows one way through the pipeline: activity records are
//! folded into an [`InteractionMatrix`], users are correlated into a
//! [`SimilarityMatrix`], the target's neighbors are aggregated into ranked
//! candidates, and the [`FallbackSupplier`] pads whatever is missing.
//! Every structure is built per call and dropped with it.

pub mod fallback;
pub mod index;
pub mod matrix;
pub mod orchestrator;
pub mod ranker;
pub mod similarity;

pub use fallback::{
    Affinity, BestSelling, FallbackStrategy, FallbackSupplier, FavoriteAffinity, RecentlyOrdered,
    UserProfile,
};
pub use index::IndexMap;
pub use matrix::{InteractionMatrix, InteractionMatrixBuilder, InteractionRecord, UserActivity};
pub use orchestrator::{RecommendationOrchestrator, RecommendationSettings};
pub use ranker::{CandidateRanker, CandidateScore};
pub use similarity::{pearson, SimilarityEngine, SimilarityMatrix};
