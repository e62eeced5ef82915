//! Score aggregation math used by the Task Commit-Reveal Engine (§4.6).
//!
//! All of this is pure: given the `MathData` rounds every verifier reveals
//! for an epoch, compute each prover's mean score, each verifier's
//! deviation from that mean, and a `validator_score` normalized against the
//! worst deviation seen. Also holds the Jaccard comparison the Consensus
//! Loop uses to decide whether to attest.

use std::collections::{HashMap, HashSet};

use subnet_core::domain::{ConsensusScores, MathData, SubnetNodeConsensusData, SCORE_FIXED_POINT_SCALE};
use subnet_core::types::PeerId;

/// Guards the normalization division from a degenerate all-zero-error case.
pub const SCORE_EPSILON: f64 = 1e-8;

/// Average score each prover received, across every verifier's reveal.
pub fn peer_means(rounds_by_verifier: &HashMap<PeerId, Vec<MathData>>) -> HashMap<PeerId, f64> {
    let mut sums: HashMap<PeerId, (f64, usize)> = HashMap::new();
    for rounds in rounds_by_verifier.values() {
        for round in rounds {
            let entry = sums.entry(round.peer_id.clone()).or_insert((0.0, 0));
            entry.0 += round.score;
            entry.1 += 1;
        }
    }
    sums.into_iter().map(|(peer, (sum, count))| (peer, if count == 0 { 0.0 } else { sum / count as f64 })).collect()
}

/// Sum of squared deviations of each verifier's individual scores from the
/// prover-wide consensus mean, per verifier.
pub fn validator_errors(
    rounds_by_verifier: &HashMap<PeerId, Vec<MathData>>,
    peer_means: &HashMap<PeerId, f64>,
) -> HashMap<PeerId, f64> {
    rounds_by_verifier
        .iter()
        .map(|(verifier, rounds)| {
            let error: f64 = rounds
                .iter()
                .map(|round| {
                    let mean = peer_means.get(&round.peer_id).copied().unwrap_or(round.score);
                    (round.score - mean).powi(2)
                })
                .sum();
            (verifier.clone(), error)
        })
        .collect()
}

/// Normalize each verifier's error against the worst error observed:
/// `validator_score = max(1 - error / (max_error + eps), 0)`.
pub fn normalize_validator_scores(errors: &HashMap<PeerId, f64>) -> HashMap<PeerId, f64> {
    let max_error = errors.values().cloned().fold(0.0_f64, f64::max);
    errors
        .iter()
        .map(|(verifier, error)| {
            let score = (1.0 - error / (max_error + SCORE_EPSILON)).max(0.0);
            (verifier.clone(), score)
        })
        .collect()
}

/// Truncating fixed-point conversion, `score × 10^18`.
pub fn to_fixed_point(score: f64) -> i128 {
    (score * SCORE_FIXED_POINT_SCALE) as i128
}

/// `|A ∩ B| / |A ∪ B|` over frozen `(subnet_node_id, score)` tuples. Both
/// sides empty normalizes to `1.0` (§9 open-question resolution) rather
/// than the degenerate `100.0` the source material returns, so the
/// `== 1.0` attestation gate stays meaningful.
pub fn compare_consensus_data(a: &[SubnetNodeConsensusData], b: &[SubnetNodeConsensusData]) -> f64 {
    let set_a: HashSet<(u32, u128)> = a.iter().map(|d| (d.subnet_node_id, d.score)).collect();
    let set_b: HashSet<(u32, u128)> = b.iter().map(|d| (d.subnet_node_id, d.score)).collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Combine the math-scored and reveal-scored streams per subnet_node_id
/// using integer division (`sum // len`), matching `average_consensus_scores`
/// in the original implementation.
pub fn average_consensus_scores(streams: &[HashMap<u32, i128>]) -> HashMap<u32, i128> {
    let mut sums: HashMap<u32, (i128, i128)> = HashMap::new();
    for stream in streams {
        for (&subnet_node_id, &score) in stream {
            let entry = sums.entry(subnet_node_id).or_insert((0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }
    sums.into_iter().map(|(id, (sum, count))| (id, if count == 0 { 0 } else { sum / count })).collect()
}

/// Reduce peer-keyed scores down to the set of on-chain `Included`-or-higher
/// nodes for the epoch, producing both the in-subnet `ConsensusScores`
/// helper shape and the on-chain `SubnetNodeConsensusData` shape.
pub fn filter_and_format_scores(
    scores_by_peer: &HashMap<PeerId, f64>,
    peer_to_subnet_node_id: &HashMap<PeerId, u32>,
) -> (Vec<ConsensusScores>, Vec<SubnetNodeConsensusData>) {
    let mut consensus_scores = Vec::new();
    let mut on_chain = Vec::new();
    for (peer, &score) in scores_by_peer {
        if let Some(&subnet_node_id) = peer_to_subnet_node_id.get(peer) {
            consensus_scores.push(ConsensusScores::from_float(peer.clone(), score));
            on_chain.push(SubnetNodeConsensusData { subnet_node_id, score: to_fixed_point(score).max(0) as u128 });
        }
    }
    (consensus_scores, on_chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(verifier: &str, peer: &str, score: f64) -> (PeerId, MathData) {
        (
            PeerId::new(verifier),
            MathData { peer_id: PeerId::new(peer), equation: "1+1".into(), answer: 2, peer_answer: 2, score },
        )
    }

    #[test]
    fn identical_scores_across_verifiers_yield_exact_mean() {
        let mut rounds: HashMap<PeerId, Vec<MathData>> = HashMap::new();
        for v in ["v1", "v2", "v3"] {
            let (verifier, data) = round(v, "prover", 1.0);
            rounds.entry(verifier).or_default().push(data);
        }
        let means = peer_means(&rounds);
        assert_eq!(means[&PeerId::new("prover")], 1.0);

        let errors = validator_errors(&rounds, &means);
        let scores = normalize_validator_scores(&errors);
        for v in ["v1", "v2", "v3"] {
            assert!((scores[&PeerId::new(v)] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn outlier_verifier_scores_lower_than_honest_majority() {
        let mut rounds: HashMap<PeerId, Vec<MathData>> = HashMap::new();
        for v in ["v1", "v2"] {
            let (verifier, data) = round(v, "prover", 1.0);
            rounds.entry(verifier).or_default().push(data);
        }
        let (outlier, data) = round("v3", "prover", 0.0);
        rounds.entry(outlier).or_default().push(data);

        let means = peer_means(&rounds);
        let errors = validator_errors(&rounds, &means);
        let scores = normalize_validator_scores(&errors);

        assert!(scores[&PeerId::new("v3")] < scores[&PeerId::new("v1")]);
        assert!(scores[&PeerId::new("v1")] > 0.9);
    }

    #[test]
    fn jaccard_identical_sets_is_one() {
        let data = vec![SubnetNodeConsensusData { subnet_node_id: 1, score: 10u128.pow(18) }];
        assert_eq!(compare_consensus_data(&data, &data), 1.0);
    }

    #[test]
    fn jaccard_empty_normalizes_to_one_not_one_hundred() {
        assert_eq!(compare_consensus_data(&[], &[]), 1.0);
    }

    #[test]
    fn jaccard_subset_is_fractional() {
        let a = vec![
            SubnetNodeConsensusData { subnet_node_id: 1, score: 10u128.pow(18) },
            SubnetNodeConsensusData { subnet_node_id: 6, score: 10u128.pow(18) },
        ];
        let b = vec![SubnetNodeConsensusData { subnet_node_id: 1, score: 10u128.pow(18) }];
        assert_eq!(compare_consensus_data(&a, &b), 0.5);
    }

    #[test]
    fn average_consensus_scores_uses_integer_division() {
        let mut s1 = HashMap::new();
        s1.insert(1u32, 3i128);
        let mut s2 = HashMap::new();
        s2.insert(1u32, 4i128);
        let avg = average_consensus_scores(&[s1, s2]);
        assert_eq!(avg[&1], 3); // (3+4)/2 integer division == 3
    }
}
