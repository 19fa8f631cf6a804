//! Identity matching

use crate::user::EnrolledEmbedding;
use perception::HeadPose;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// A user recognised above the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMatch {
    pub user_id: Uuid,
    pub user_code: String,
    pub similarity: f32,
}

/// Cosine similarity of two unit-norm vectors (plain dot product)
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Linear scan over every known embedding.
///
/// Returns the owner of the most similar embedding if that similarity
/// reaches `threshold`, together with the best similarity seen, which is
/// reported even when nothing matches. With no query or no candidates the
/// result is `(None, 0.0)`. Ties go to the first candidate. Candidates whose
/// dimension differs from the query are skipped.
pub fn find_match(
    query: Option<&[f32]>,
    known: &[EnrolledEmbedding],
    threshold: f32,
) -> (Option<IdentityMatch>, f32) {
    let Some(query) = query else {
        return (None, 0.0);
    };

    let mut best: Option<(&EnrolledEmbedding, f32)> = None;
    for candidate in known {
        if candidate.vector.len() != query.len() {
            warn!(
                "Skipping embedding of {} with dimension {} (query has {})",
                candidate.user_code,
                candidate.vector.len(),
                query.len()
            );
            continue;
        }
        let sim = similarity(query, &candidate.vector);
        if best.map_or(true, |(_, best_sim)| sim > best_sim) {
            best = Some((candidate, sim));
        }
    }

    let Some((candidate, best_similarity)) = best else {
        return (None, 0.0);
    };
    debug!(
        "Best candidate {} with similarity {:.3}",
        candidate.user_code, best_similarity
    );

    let matched = (best_similarity >= threshold).then(|| IdentityMatch {
        user_id: candidate.user_id,
        user_code: candidate.user_code.clone(),
        similarity: best_similarity,
    });
    (matched, best_similarity)
}

/// True if `pose` is at least `min_distance` degrees away from every
/// already captured pose
pub fn is_novel_pose(pose: &HeadPose, captured: &[HeadPose], min_distance: f32) -> bool {
    captured.iter().all(|p| pose.distance(p) >= min_distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn enrolled(code: &str, vector: Vec<f32>) -> EnrolledEmbedding {
        EnrolledEmbedding {
            user_id: Uuid::new_v4(),
            user_code: code.to_string(),
            vector,
            pose: None,
        }
    }

    #[test]
    fn test_match_above_threshold() {
        let known = vec![
            enrolled("USUARIO_0001", vec![1.0, 0.0]),
            enrolled("USUARIO_0002", vec![0.0, 1.0]),
        ];
        let (m, best) = find_match(Some(&[0.6, 0.8][..]), &known, 0.45);
        let m = m.unwrap();
        assert_eq!(m.user_code, "USUARIO_0002");
        assert!((best - 0.8).abs() < 1e-6);
        assert_eq!(m.similarity, best);
    }

    #[test]
    fn test_near_miss_reports_best() {
        let known = vec![enrolled("USUARIO_0001", vec![1.0, 0.0])];
        let (m, best) = find_match(Some(&[0.3, 0.954][..]), &known, 0.45);
        assert!(m.is_none());
        assert!((best - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_no_query_or_no_candidates() {
        let known = vec![enrolled("USUARIO_0001", vec![1.0, 0.0])];
        assert_eq!(find_match(None, &known, 0.45), (None, 0.0));
        assert_eq!(find_match(Some(&[1.0, 0.0][..]), &[], 0.45), (None, 0.0));
    }

    #[test]
    fn test_first_candidate_wins_tie() {
        let known = vec![
            enrolled("USUARIO_0001", vec![1.0, 0.0]),
            enrolled("USUARIO_0002", vec![1.0, 0.0]),
        ];
        let (m, _) = find_match(Some(&[1.0, 0.0][..]), &known, 0.45);
        assert_eq!(m.unwrap().user_code, "USUARIO_0001");
    }

    #[test]
    fn test_skips_other_dimensions() {
        let known = vec![
            enrolled("USUARIO_0001", vec![1.0, 0.0, 0.0]),
            enrolled("USUARIO_0002", vec![1.0, 0.0]),
        ];
        let (m, _) = find_match(Some(&[1.0, 0.0][..]), &known, 0.45);
        assert_eq!(m.unwrap().user_code, "USUARIO_0002");
    }

    #[test]
    fn test_pose_novelty() {
        let captured = vec![HeadPose::new(0.0, 0.0, 0.0)];
        assert!(is_novel_pose(&HeadPose::new(0.0, 20.0, 0.0), &captured, 15.0));
        assert!(!is_novel_pose(&HeadPose::new(5.0, 5.0, 0.0), &captured, 15.0));
        assert!(is_novel_pose(&HeadPose::new(5.0, 5.0, 0.0), &[], 15.0));
    }

    fn unit_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-1.0f32..1.0, dim).prop_filter_map("zero vector", |mut v| {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-3 {
                return None;
            }
            v.iter_mut().for_each(|x| *x /= norm);
            Some(v)
        })
    }

    proptest! {
        #[test]
        fn prop_reports_true_maximum(
            query in unit_vector(8),
            candidates in prop::collection::vec(unit_vector(8), 1..20),
            threshold in 0.01f32..1.0,
        ) {
            let known: Vec<EnrolledEmbedding> = candidates
                .into_iter()
                .enumerate()
                .map(|(i, v)| enrolled(&format!("USUARIO_{:04}", i), v))
                .collect();
            let (m, best) = find_match(Some(query.as_slice()), &known, threshold);

            let expected = known
                .iter()
                .map(|k| similarity(&query, &k.vector))
                .fold(f32::NEG_INFINITY, f32::max);
            prop_assert_eq!(best, expected);
            prop_assert_eq!(m.is_none(), best < threshold);
        }
    }
}
