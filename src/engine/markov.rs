//! Hidden Markov layer with Gaussian emissions.
//!
//! A [`HiddenMarkov`] is a validated parameter bundle: initial-state
//! distribution, row-stochastic transition matrix and per-state Gaussian
//! emission parameters. It is conceptually a chain-structured factor graph
//! but implemented over direct numeric arrays. All operations are pure reads
//! of the configured parameters: `generate` samples sequences, `infer` is a
//! deliberately naive per-timestep baseline, `viterbi` decodes the single
//! most probable path in log space, and `posteriors` gives exact per-step
//! state marginals via scaled forward-backward.

use std::sync::Arc;

use rand::Rng;
use rand_distr::StandardNormal;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::errors::InferenceError;
use crate::engine::numeric::CholeskyFactor;

/// Tolerance when checking that probability vectors sum to one.
const STOCHASTIC_TOLERANCE: f64 = 1e-6;

/// Recognized Markov options. Shape constraints are validated by
/// [`HiddenMarkov::new`]:
///
/// - `init_prob`: length `num_states`, sums to one
/// - `tran_prob`: `num_states x num_states`, each row sums to one
/// - `mu`: `num_states x num_observed` emission means
/// - `sigma`: per-state `num_observed x num_observed` symmetric
///   positive-definite emission covariance
/// - `state_names` / `observed_names`: optional labels, defaulted when
///   omitted
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkovConfig {
    pub num_states: usize,
    pub num_observed: usize,
    pub state_names: Option<Vec<String>>,
    pub observed_names: Option<Vec<String>>,
    pub init_prob: Vec<f64>,
    pub tran_prob: Vec<Vec<f64>>,
    pub mu: Vec<Vec<f64>>,
    pub sigma: Vec<Vec<Vec<f64>>>,
}

/// A configured hidden Markov model.
#[derive(Debug)]
pub struct HiddenMarkov {
    num_states: usize,
    num_observed: usize,
    state_names: Vec<Arc<str>>,
    observed_names: Vec<Arc<str>>,
    init_prob: Vec<f64>,
    tran_prob: Vec<Vec<f64>>,
    mu: Vec<Vec<f64>>,
    /// Per-state Cholesky factor of the emission covariance.
    chol: Vec<CholeskyFactor>,
}

fn check_distribution(name: &str, probs: &[f64], len: usize) -> Result<(), InferenceError> {
    if probs.len() != len {
        return Err(InferenceError::ShapeMismatch(format!(
            "{} has length {}, expected {}",
            name,
            probs.len(),
            len
        )));
    }
    if probs.iter().any(|p| *p < 0.0 || !p.is_finite()) {
        return Err(InferenceError::ShapeMismatch(format!(
            "{} contains a negative or non-finite entry",
            name
        )));
    }
    let total: f64 = probs.iter().sum();
    if (total - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(InferenceError::ShapeMismatch(format!(
            "{} sums to {}, expected 1",
            name, total
        )));
    }
    Ok(())
}

impl HiddenMarkov {
    /// Validates the configuration and fixes the model parameters.
    pub fn new(config: MarkovConfig) -> Result<Self, InferenceError> {
        let MarkovConfig {
            num_states,
            num_observed,
            state_names,
            observed_names,
            init_prob,
            tran_prob,
            mu,
            sigma,
        } = config;

        if num_states == 0 || num_observed == 0 {
            return Err(InferenceError::ShapeMismatch(
                "num_states and num_observed must be positive".into(),
            ));
        }
        check_distribution("init_prob", &init_prob, num_states)?;
        if tran_prob.len() != num_states {
            return Err(InferenceError::ShapeMismatch(format!(
                "tran_prob has {} rows, expected {}",
                tran_prob.len(),
                num_states
            )));
        }
        for (state, row) in tran_prob.iter().enumerate() {
            check_distribution(&format!("tran_prob row {}", state), row, num_states)?;
        }
        if mu.len() != num_states || mu.iter().any(|row| row.len() != num_observed) {
            return Err(InferenceError::ShapeMismatch(format!(
                "mu must be {} x {}",
                num_states, num_observed
            )));
        }
        if sigma.len() != num_states {
            return Err(InferenceError::ShapeMismatch(format!(
                "sigma has {} matrices, expected {}",
                sigma.len(),
                num_states
            )));
        }
        let mut chol = Vec::with_capacity(num_states);
        for (state, matrix) in sigma.iter().enumerate() {
            if matrix.len() != num_observed {
                return Err(InferenceError::ShapeMismatch(format!(
                    "sigma for state {} must be {} x {}",
                    state, num_observed, num_observed
                )));
            }
            let factor = CholeskyFactor::new(matrix).ok_or_else(|| {
                InferenceError::ShapeMismatch(format!(
                    "sigma for state {} is not symmetric positive definite",
                    state
                ))
            })?;
            chol.push(factor);
        }

        let state_names = Self::resolve_names(state_names, num_states, "s")?;
        let observed_names = Self::resolve_names(observed_names, num_observed, "y")?;

        Ok(Self {
            num_states,
            num_observed,
            state_names,
            observed_names,
            init_prob,
            tran_prob,
            mu,
            chol,
        })
    }

    fn resolve_names(
        names: Option<Vec<String>>,
        len: usize,
        prefix: &str,
    ) -> Result<Vec<Arc<str>>, InferenceError> {
        match names {
            Some(names) if names.len() != len => Err(InferenceError::ShapeMismatch(format!(
                "{} names given, expected {}",
                names.len(),
                len
            ))),
            Some(names) => Ok(names.into_iter().map(Arc::from).collect()),
            None => Ok((0..len)
                .map(|i| Arc::from(format!("{}{}", prefix, i)))
                .collect()),
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_observed(&self) -> usize {
        self.num_observed
    }

    pub fn state_names(&self) -> &[Arc<str>] {
        &self.state_names
    }

    pub fn observed_names(&self) -> &[Arc<str>] {
        &self.observed_names
    }

    fn validate_observations(&self, observations: &[Vec<f64>]) -> Result<(), InferenceError> {
        for (t, row) in observations.iter().enumerate() {
            if row.len() != self.num_observed {
                return Err(InferenceError::ShapeMismatch(format!(
                    "observation {} has {} components, expected {}",
                    t,
                    row.len(),
                    self.num_observed
                )));
            }
        }
        Ok(())
    }

    fn emission_log_density(&self, state: usize, observation: &[f64]) -> f64 {
        let diff: Vec<f64> = observation
            .iter()
            .zip(&self.mu[state])
            .map(|(o, m)| o - m)
            .collect();
        self.chol[state].log_density(&diff)
    }

    fn best_emission_state(&self, observation: &[f64]) -> usize {
        let mut best = 0_usize;
        let mut best_score = self.emission_log_density(0, observation);
        for state in 1..self.num_states {
            let score = self.emission_log_density(state, observation);
            if score > best_score {
                best = state;
                best_score = score;
            }
        }
        best
    }

    /// Samples a hidden-state sequence and its observations.
    ///
    /// State 1 is drawn from the initial distribution, every later state
    /// from the previous state's transition row, and each observation from
    /// the corresponding state's Gaussian. The supplied generator is the
    /// only source of non-determinism; seed it for reproducibility.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        num_samples: usize,
        rng: &mut R,
    ) -> (Vec<usize>, Vec<Vec<f64>>) {
        let mut states: Vec<usize> = Vec::with_capacity(num_samples);
        let mut observations = Vec::with_capacity(num_samples);
        for t in 0..num_samples {
            let state = if t == 0 {
                sample_categorical(rng, &self.init_prob)
            } else {
                sample_categorical(rng, &self.tran_prob[states[t - 1]])
            };
            states.push(state);

            let z: Vec<f64> = (0..self.num_observed)
                .map(|_| rng.sample(StandardNormal))
                .collect();
            let noise = self.chol[state].correlate(&z);
            let observation = self.mu[state]
                .iter()
                .zip(&noise)
                .map(|(mean, e)| mean + e)
                .collect();
            observations.push(observation);
        }
        (states, observations)
    }

    /// Naive per-timestep decoding: each step independently takes the state
    /// with the highest emission likelihood, ignoring transition structure
    /// entirely. A deliberately weak baseline to contrast with [`viterbi`];
    /// it is not an HMM-correct decoder.
    ///
    /// [`viterbi`]: HiddenMarkov::viterbi
    pub fn infer(&self, observations: &[Vec<f64>]) -> Result<Vec<usize>, InferenceError> {
        self.validate_observations(observations)?;
        #[cfg(feature = "parallel")]
        let states: Vec<usize> = observations
            .par_iter()
            .map(|obs| self.best_emission_state(obs))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let states: Vec<usize> = observations
            .iter()
            .map(|obs| self.best_emission_state(obs))
            .collect();
        Ok(states)
    }

    /// Decodes the single most probable state path given the observations.
    ///
    /// Standard log-space dynamic program: `score[t][s]` is the highest
    /// log-probability of any length-`t` path ending in state `s`, with the
    /// argmax predecessor recorded for backtracking. Ties break toward the
    /// lowest-indexed state.
    pub fn viterbi(&self, observations: &[Vec<f64>]) -> Result<Vec<usize>, InferenceError> {
        self.validate_observations(observations)?;
        let steps = observations.len();
        if steps == 0 {
            return Ok(Vec::new());
        }

        let n = self.num_states;
        let mut score = vec![vec![f64::NEG_INFINITY; n]; steps];
        let mut backpointer = vec![vec![0_usize; n]; steps];

        for s in 0..n {
            score[0][s] = self.init_prob[s].ln() + self.emission_log_density(s, &observations[0]);
        }

        for t in 1..steps {
            for s in 0..n {
                let mut best_prev = 0_usize;
                let mut best_score = f64::NEG_INFINITY;
                for prev in 0..n {
                    let candidate = score[t - 1][prev] + self.tran_prob[prev][s].ln();
                    // Strict comparison keeps the first-encountered argmax.
                    if candidate > best_score {
                        best_score = candidate;
                        best_prev = prev;
                    }
                }
                score[t][s] = best_score + self.emission_log_density(s, &observations[t]);
                backpointer[t][s] = best_prev;
            }
        }

        let mut best_final = 0_usize;
        for s in 1..n {
            if score[steps - 1][s] > score[steps - 1][best_final] {
                best_final = s;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            steps,
            final_state = best_final,
            log_probability = score[steps - 1][best_final],
            "viterbi decode complete"
        );

        let mut path = vec![0_usize; steps];
        path[steps - 1] = best_final;
        for t in (1..steps).rev() {
            path[t - 1] = backpointer[t][path[t]];
        }
        Ok(path)
    }

    /// Joint log-probability of a specific state path together with the
    /// observation sequence. Useful for comparing candidate decodings.
    pub fn sequence_log_probability(
        &self,
        states: &[usize],
        observations: &[Vec<f64>],
    ) -> Result<f64, InferenceError> {
        self.validate_observations(observations)?;
        if states.len() != observations.len() {
            return Err(InferenceError::ShapeMismatch(format!(
                "{} states for {} observations",
                states.len(),
                observations.len()
            )));
        }
        if let Some(bad) = states.iter().find(|s| **s >= self.num_states) {
            return Err(InferenceError::ShapeMismatch(format!(
                "state index {} out of range for {} states",
                bad, self.num_states
            )));
        }
        if states.is_empty() {
            return Ok(0.0);
        }

        let mut log_probability =
            self.init_prob[states[0]].ln() + self.emission_log_density(states[0], &observations[0]);
        for t in 1..states.len() {
            log_probability += self.tran_prob[states[t - 1]][states[t]].ln()
                + self.emission_log_density(states[t], &observations[t]);
        }
        Ok(log_probability)
    }

    /// Exact per-timestep state posteriors via scaled forward-backward.
    pub fn posteriors(&self, observations: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, InferenceError> {
        self.validate_observations(observations)?;
        let steps = observations.len();
        if steps == 0 {
            return Ok(Vec::new());
        }
        let (alpha, emissions, _) = self.forward_scaled(observations)?;

        let n = self.num_states;
        let mut beta = vec![vec![1.0; n]; steps];
        for t in (0..steps - 1).rev() {
            for i in 0..n {
                let mut sum = 0.0;
                for j in 0..n {
                    sum += self.tran_prob[i][j] * emissions[t + 1][j] * beta[t + 1][j];
                }
                beta[t][i] = sum;
            }
            let scale: f64 = beta[t].iter().sum();
            if scale <= 0.0 || !scale.is_finite() {
                return Err(InferenceError::DegenerateTable(format!(
                    "vanishing backward mass at step {}",
                    t
                )));
            }
            for v in &mut beta[t] {
                *v /= scale;
            }
        }

        let mut posteriors = vec![vec![0.0; n]; steps];
        for t in 0..steps {
            let mut sum = 0.0;
            for s in 0..n {
                posteriors[t][s] = alpha[t][s] * beta[t][s];
                sum += posteriors[t][s];
            }
            if sum <= 0.0 || !sum.is_finite() {
                return Err(InferenceError::DegenerateTable(format!(
                    "vanishing posterior mass at step {}",
                    t
                )));
            }
            for v in &mut posteriors[t] {
                *v /= sum;
            }
        }
        Ok(posteriors)
    }

    /// Log-likelihood of the observation sequence under the model, from the
    /// forward pass.
    pub fn log_likelihood(&self, observations: &[Vec<f64>]) -> Result<f64, InferenceError> {
        self.validate_observations(observations)?;
        if observations.is_empty() {
            return Ok(0.0);
        }
        let (_, _, log_likelihood) = self.forward_scaled(observations)?;
        Ok(log_likelihood)
    }

    /// Scaled forward pass. Returns per-step normalized forward
    /// distributions, the rescaled emission weights reused by the backward
    /// pass, and the sequence log-likelihood.
    #[allow(clippy::type_complexity)]
    fn forward_scaled(
        &self,
        observations: &[Vec<f64>],
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>, f64), InferenceError> {
        let steps = observations.len();
        let n = self.num_states;

        // Rescale each step's emission densities by their maximum so the
        // recursion stays in a safe floating range; the shifts are added
        // back into the log-likelihood.
        let mut emissions = vec![vec![0.0; n]; steps];
        let mut shifts = vec![0.0; steps];
        for t in 0..steps {
            let log_densities: Vec<f64> = (0..n)
                .map(|s| self.emission_log_density(s, &observations[t]))
                .collect();
            let shift = log_densities
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            shifts[t] = shift;
            for s in 0..n {
                emissions[t][s] = (log_densities[s] - shift).exp();
            }
        }

        let mut alpha = vec![vec![0.0; n]; steps];
        let mut log_likelihood = 0.0;
        for s in 0..n {
            alpha[0][s] = self.init_prob[s] * emissions[0][s];
        }
        for t in 0..steps {
            if t > 0 {
                for j in 0..n {
                    let mut sum = 0.0;
                    for i in 0..n {
                        sum += alpha[t - 1][i] * self.tran_prob[i][j];
                    }
                    alpha[t][j] = sum * emissions[t][j];
                }
            }
            let scale: f64 = alpha[t].iter().sum();
            if scale <= 0.0 || !scale.is_finite() {
                return Err(InferenceError::DegenerateTable(format!(
                    "vanishing forward mass at step {}",
                    t
                )));
            }
            for v in &mut alpha[t] {
                *v /= scale;
            }
            log_likelihood += scale.ln() + shifts[t];
        }
        Ok((alpha, emissions, log_likelihood))
    }
}

fn sample_categorical<R: Rng + ?Sized>(rng: &mut R, probs: &[f64]) -> usize {
    let mut draw: f64 = rng.random();
    for (idx, p) in probs.iter().enumerate() {
        if draw < *p {
            return idx;
        }
        draw -= p;
    }
    probs.len() - 1
}
