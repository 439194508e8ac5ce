//! Probe-to-gallery matching.
//!
//! One rule decides a match: `best score >= threshold`. Equality at the
//! threshold is a match. Ties between equal scores resolve to the
//! first-encountered entry — callers hand over the gallery ordered by
//! ascending identity id, so the tie-break is deterministic (lowest id
//! wins), not incidental.

use crate::types::{Embedding, EnrolledFace, MatchCandidate};

/// Compare a probe embedding against every gallery entry and return the
/// best candidate.
///
/// Constant-time traversal: always iterates the full gallery, no early
/// exit, so timing does not leak gallery size or match position.
/// Reported similarity is clamped to [0, 1]; an empty gallery yields a
/// non-match at 0.0.
pub fn best_candidate(
    probe: &Embedding,
    gallery: &[EnrolledFace],
    threshold: f32,
    model: &str,
) -> MatchCandidate {
    let mut best_sim = f32::NEG_INFINITY;
    let mut best_idx: Option<usize> = None;

    for (i, face) in gallery.iter().enumerate() {
        let sim = probe.similarity(&face.embedding);
        // Strict `>`: the first entry with the highest score wins.
        if sim > best_sim {
            best_sim = sim;
            best_idx = Some(i);
        }
    }

    match best_idx {
        Some(idx) => MatchCandidate {
            identity_id: Some(gallery[idx].identity_id),
            similarity: best_sim.clamp(0.0, 1.0),
            matched: best_sim >= threshold,
            model: model.to_string(),
        },
        None => MatchCandidate::no_match(model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding {
            values,
            model_version: None,
        }
    }

    fn enrolled(identity_id: i64, values: Vec<f32>) -> EnrolledFace {
        EnrolledFace {
            identity_id,
            embedding: emb(values),
        }
    }

    #[test]
    fn test_best_entry_wins_even_when_last() {
        let probe = emb(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            enrolled(1, vec![0.0, 1.0, 0.0]),
            enrolled(2, vec![0.0, 0.0, 1.0]),
            enrolled(3, vec![1.0, 0.0, 0.0]),
        ];

        let result = best_candidate(&probe, &gallery, 0.5, "primary");
        assert!(result.matched);
        assert_eq!(result.identity_id, Some(3));
        assert!((result.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_score_equal_to_threshold_matches() {
        // Probe at 45 degrees from the enrolled vector: cosine = 1/sqrt(2).
        let probe = emb(vec![1.0, 1.0]);
        let gallery = vec![enrolled(7, vec![1.0, 0.0])];
        let sim = probe.similarity(&gallery[0].embedding);

        let result = best_candidate(&probe, &gallery, sim, "primary");
        assert!(result.matched, "boundary score must match");
        assert_eq!(result.identity_id, Some(7));
    }

    #[test]
    fn test_score_below_threshold_is_no_match() {
        let probe = emb(vec![1.0, 1.0]);
        let gallery = vec![enrolled(7, vec![1.0, 0.0])];
        let sim = probe.similarity(&gallery[0].embedding);

        let result = best_candidate(&probe, &gallery, sim + 1e-4, "primary");
        assert!(!result.matched);
        // Best similarity is still reported for diagnostics.
        assert!((result.similarity - sim).abs() < 1e-6);
        assert_eq!(result.identity_id, Some(7));
    }

    #[test]
    fn test_tie_breaks_to_first_entry() {
        // Two identical enrolled vectors; gallery ordered by identity id.
        let probe = emb(vec![1.0, 0.0]);
        let gallery = vec![
            enrolled(10, vec![1.0, 0.0]),
            enrolled(20, vec![1.0, 0.0]),
        ];

        let result = best_candidate(&probe, &gallery, 0.5, "primary");
        assert!(result.matched);
        assert_eq!(result.identity_id, Some(10));
    }

    #[test]
    fn test_empty_gallery() {
        let probe = emb(vec![1.0, 0.0]);
        let result = best_candidate(&probe, &[], 0.5, "primary");
        assert!(!result.matched);
        assert_eq!(result.identity_id, None);
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_negative_cosine_clamped_to_zero() {
        let probe = emb(vec![1.0, 0.0]);
        let gallery = vec![enrolled(1, vec![-1.0, 0.0])];

        let result = best_candidate(&probe, &gallery, 0.5, "primary");
        assert!(!result.matched);
        assert_eq!(result.similarity, 0.0);
    }
}
