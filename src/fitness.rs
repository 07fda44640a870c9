//! The coherence scoring function.
//!
//! The closed-form expression is kept behind a stable signature; gating
//! logic depends only on the returned scalar, never on the formula's shape.
//! The observer phase is the single documented source of nondeterminism:
//! it is drawn exactly once per [`FitnessEvaluator::score`] call, so two
//! calls with identical declared inputs may legitimately differ through it.
//! No other side effects, no I/O.

use rand::Rng;

use crate::error::OracleError;

/// Golden ratio, the formula's coupling base.
pub const GOLDEN_RATIO: f64 = 1.618033988749895;
/// Dark-energy coupling coefficient.
pub const ALPHA_DARK: f64 = 0.4;
/// Action scale of the coherence term.
pub const ACTION_SCALE: f64 = 1e-34;
/// Boltzmann constant, J/K.
pub const BOLTZMANN_K: f64 = 1.380649e-23;
/// Observed-to-reference dark energy density ratio.
const DARK_DENSITY_RATIO: f64 = 0.9e-26 / 1e-26;
/// Floor applied to the vacuum temperature to keep the quotient finite.
const VACUUM_TEMP_FLOOR_K: f64 = 1e-30;

/// Declared inputs of one scoring call.
#[derive(Debug, Clone, PartialEq)]
pub struct CoherenceInputs {
    /// Local density contrast.
    pub density_contrast: f64,
    /// Vacuum temperature in Kelvin; floored at `1e-30` inside the formula.
    pub vacuum_temp_k: f64,
    /// Flux delta driving the coupling term.
    pub flux_delta: f64,
    /// Geometric scale of the oscillatory term.
    pub scale: f64,
    /// Observer density contribution added to the local contrast.
    pub observer_density: f64,
}

impl Default for CoherenceInputs {
    /// The reference operating point the oracle scores every cycle at.
    fn default() -> Self {
        Self {
            density_contrast: 1e-10,
            vacuum_temp_k: 1e-10,
            flux_delta: 0.5,
            scale: 1.0,
            observer_density: 0.1,
        }
    }
}

impl CoherenceInputs {
    fn all_finite(&self) -> bool {
        self.density_contrast.is_finite()
            && self.vacuum_temp_k.is_finite()
            && self.flux_delta.is_finite()
            && self.scale.is_finite()
            && self.scale != 0.0
            && self.observer_density.is_finite()
    }
}

/// Wraps the scoring formula. Stateless; safe to share.
#[derive(Debug, Clone, Default)]
pub struct FitnessEvaluator;

impl FitnessEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Score `inputs`, drawing the observer phase once for this call.
    ///
    /// # Errors
    /// `OracleError::Evaluator` when an input is non-finite, the scale is
    /// zero, or the formula itself produces a non-finite value.
    pub fn score(&self, inputs: &CoherenceInputs) -> Result<f64, OracleError> {
        let observer_phase = rand::thread_rng().gen_range(0.0..std::f64::consts::TAU);
        self.score_with_observer(inputs, observer_phase)
    }

    /// The deterministic core: score `inputs` at a fixed observer phase.
    ///
    /// Exposed so gate-boundary behavior can be tested without the random
    /// term.
    pub fn score_with_observer(
        &self,
        inputs: &CoherenceInputs,
        observer_phase: f64,
    ) -> Result<f64, OracleError> {
        if !inputs.all_finite() || !observer_phase.is_finite() {
            return Err(OracleError::Evaluator(format!(
                "non-finite inputs: {inputs:?}, phase {observer_phase}"
            )));
        }

        let coupling = GOLDEN_RATIO * std::f64::consts::PI * inputs.flux_delta;
        let contrast = inputs.density_contrast + inputs.observer_density;
        let thermal = BOLTZMANN_K * inputs.vacuum_temp_k.max(VACUUM_TEMP_FLOOR_K);

        let coherence_term = 1.0 + coupling * contrast * ACTION_SCALE / thermal;
        let dark_term = 1.0 + ALPHA_DARK * DARK_DENSITY_RATIO;
        let oscillation = 1.0
            + (2.0 * GOLDEN_RATIO * std::f64::consts::PI / inputs.scale + observer_phase).cos();

        let score = coherence_term * dark_term * oscillation;
        if !score.is_finite() {
            return Err(OracleError::Evaluator(format!(
                "score diverged for inputs {inputs:?}"
            )));
        }
        Ok(score)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
