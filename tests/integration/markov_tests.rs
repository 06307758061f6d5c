//! End-to-end hidden-Markov generation and decoding tests.

use beliefnet::{HiddenMarkov, MarkovConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// The reference two-state model: sticky transitions and moderately
/// separated two-dimensional Gaussian emissions.
fn reference_config() -> MarkovConfig {
    MarkovConfig {
        num_states: 2,
        num_observed: 2,
        state_names: Some(vec!["alpha".into(), "beta".into()]),
        observed_names: Some(vec!["x".into(), "y".into()]),
        init_prob: vec![1.0, 0.0],
        tran_prob: vec![vec![0.9, 0.1], vec![0.1, 0.9]],
        mu: vec![vec![1.0, -1.0], vec![-1.0, 1.0]],
        sigma: vec![
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        ],
    }
}

#[test]
fn generation_is_exactly_reproducible_across_runs() {
    let hmm = HiddenMarkov::new(reference_config()).expect("model");

    let (states_a, obs_a) = hmm.generate(100, &mut StdRng::seed_from_u64(2024));
    let (states_b, obs_b) = hmm.generate(100, &mut StdRng::seed_from_u64(2024));
    assert_eq!(states_a.len(), 100);
    assert_eq!(states_a, states_b);
    assert_eq!(obs_a, obs_b);

    // The deterministic initial distribution always starts in state 0.
    assert_eq!(states_a[0], 0);
    // A different seed should give a different draw.
    let (states_c, _) = hmm.generate(100, &mut StdRng::seed_from_u64(2025));
    assert_ne!(states_a, states_c);
}

#[test]
fn viterbi_accuracy_is_high_on_the_reference_model() {
    let hmm = HiddenMarkov::new(reference_config()).expect("model");
    let mut rng = StdRng::seed_from_u64(2024);
    let (states, observations) = hmm.generate(100, &mut rng);

    let decoded = hmm.viterbi(&observations).expect("decode");
    assert_eq!(decoded.len(), states.len());
    let correct = decoded
        .iter()
        .zip(&states)
        .filter(|(a, b)| a == b)
        .count();
    let accuracy = correct as f64 / states.len() as f64;
    assert!(
        accuracy > 0.9,
        "viterbi accuracy {accuracy} too low for well-separated emissions"
    );
}

#[test]
fn viterbi_path_dominates_every_rival_decoding() {
    let hmm = HiddenMarkov::new(reference_config()).expect("model");
    let mut rng = StdRng::seed_from_u64(7);
    let (states, observations) = hmm.generate(200, &mut rng);

    let naive = hmm.infer(&observations).expect("naive");
    let optimal = hmm.viterbi(&observations).expect("viterbi");

    let optimal_score = hmm
        .sequence_log_probability(&optimal, &observations)
        .expect("score");
    for rival in [&naive, &states] {
        let rival_score = hmm
            .sequence_log_probability(rival, &observations)
            .expect("score");
        assert!(
            optimal_score >= rival_score - 1e-9,
            "viterbi path scored {optimal_score}, rival {rival_score}"
        );
    }
}

#[test]
fn posterior_argmax_agrees_with_viterbi_on_clean_sequences() {
    // Widely separated emissions make every decoder agree.
    let mut config = reference_config();
    config.mu = vec![vec![8.0, -8.0], vec![-8.0, 8.0]];
    let hmm = HiddenMarkov::new(config).expect("model");
    let mut rng = StdRng::seed_from_u64(99);
    let (states, observations) = hmm.generate(80, &mut rng);

    let decoded = hmm.viterbi(&observations).expect("viterbi");
    let posteriors = hmm.posteriors(&observations).expect("posteriors");
    let from_posteriors: Vec<usize> = posteriors
        .iter()
        .map(|row| if row[1] > row[0] { 1 } else { 0 })
        .collect();

    assert_eq!(decoded, states);
    assert_eq!(from_posteriors, states);
}

#[test]
fn log_likelihood_is_stable_over_long_sequences() {
    let hmm = HiddenMarkov::new(reference_config()).expect("model");
    let mut rng = StdRng::seed_from_u64(5);
    let (_, observations) = hmm.generate(2000, &mut rng);

    // Probability-space forward would underflow far before 2000 steps; the
    // scaled pass must stay finite.
    let ll = hmm.log_likelihood(&observations).expect("log-likelihood");
    assert!(ll.is_finite());
    assert!(ll < 0.0);
}

#[test]
fn named_states_round_trip_through_the_model() {
    let hmm = HiddenMarkov::new(reference_config()).expect("model");
    assert_eq!(hmm.state_names()[0].as_ref(), "alpha");
    assert_eq!(hmm.observed_names()[1].as_ref(), "y");
    assert_eq!(hmm.num_states(), 2);
    assert_eq!(hmm.num_observed(), 2);
}
