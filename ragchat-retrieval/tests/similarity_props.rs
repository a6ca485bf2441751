//! Property tests for cosine similarity.

use ragchat_retrieval::{RagError, cosine_similarity};
use proptest::prelude::*;

const TOLERANCE: f32 = 1e-4;

/// Vectors with at least one component far enough from zero that the
/// magnitude does not underflow.
fn arb_nonzero_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-10.0f32..10.0f32, dim)
        .prop_filter("non-zero vector", |v| v.iter().any(|x| x.abs() > 0.01))
}

fn arb_pair() -> impl Strategy<Value = (Vec<f32>, Vec<f32>)> {
    (1usize..32).prop_flat_map(|dim| (arb_nonzero_vector(dim), arb_nonzero_vector(dim)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn vector_is_identical_to_itself(v in (1usize..32).prop_flat_map(arb_nonzero_vector)) {
        let sim = cosine_similarity(&v, &v).unwrap();
        prop_assert!((sim - 1.0).abs() < TOLERANCE, "sim(v, v) = {sim}");
    }

    #[test]
    fn vector_is_opposite_to_its_negation(v in (1usize..32).prop_flat_map(arb_nonzero_vector)) {
        let negated: Vec<f32> = v.iter().map(|x| -x).collect();
        let sim = cosine_similarity(&v, &negated).unwrap();
        prop_assert!((sim + 1.0).abs() < TOLERANCE, "sim(v, -v) = {sim}");
    }

    #[test]
    fn similarity_is_symmetric((a, b) in arb_pair()) {
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        prop_assert_eq!(ab, ba);
        prop_assert!((-1.0..=1.0).contains(&ab));
    }

    #[test]
    fn zero_vector_scores_zero(v in (1usize..32).prop_flat_map(arb_nonzero_vector)) {
        let zero = vec![0.0; v.len()];
        prop_assert_eq!(cosine_similarity(&zero, &v).unwrap(), 0.0);
        prop_assert_eq!(cosine_similarity(&v, &zero).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_lengths_always_fail(
        a in proptest::collection::vec(-1.0f32..1.0, 1..16),
        extra in 1usize..8,
    ) {
        let b = vec![0.5; a.len() + extra];
        let is_mismatch = matches!(
            cosine_similarity(&a, &b),
            Err(RagError::DimensionMismatch { .. })
        );
        prop_assert!(is_mismatch);
    }
}

#[test]
fn empty_vectors_are_a_dimension_mismatch() {
    assert!(matches!(cosine_similarity(&[], &[]), Err(RagError::DimensionMismatch { .. })));
}
