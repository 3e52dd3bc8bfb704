//! Reciprocal Rank Fusion for combining dense and lexical result lists.

use std::collections::HashMap;

/// RRF constant: `score += 1 / (k + rank)` with 1-based ranks.
pub const RRF_K: f32 = 60.0;

/// A candidate carried through fusion: the chunk id and, when known,
/// its cosine distance to the query (used for tie-breaking).
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f32,
    pub distance: Option<f32>,
}

/// Apply Reciprocal Rank Fusion to a dense and a lexical ranking.
///
/// `dense` is ordered by ascending cosine distance, `lexical` by the
/// full-text rank. Output is ordered by descending fused score; ties
/// break by ascending cosine distance, then id lexicographic.
/// Candidates only present in the lexical list carry no distance until
/// the caller backfills one.
pub fn reciprocal_rank_fusion(
    dense: &[(String, f32)],
    lexical: &[String],
) -> Vec<FusedCandidate> {
    let mut scores: HashMap<&str, f32> = HashMap::new();
    let mut distances: HashMap<&str, f32> = HashMap::new();

    for (rank, (id, distance)) in dense.iter().enumerate() {
        *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
        distances.insert(id.as_str(), *distance);
    }
    for (rank, id) in lexical.iter().enumerate() {
        *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
    }

    let mut fused: Vec<FusedCandidate> = scores
        .into_iter()
        .map(|(id, score)| FusedCandidate {
            id: id.to_string(),
            score,
            distance: distances.get(id).copied(),
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| match (a.distance, b.distance) {
                (Some(da), Some(db)) => da.total_cmp(&db),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    fused
}
