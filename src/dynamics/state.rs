use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{NesError, NesResult};

// ---------------------------------------------------------------------------
// Physical constants of the sectional model
// ---------------------------------------------------------------------------

pub const RHO_AIR: f64 = 1.225;         // kg/m^3
pub const MAIN_MASS: f64 = 7.32;        // kg
pub const REF_LENGTH: f64 = 0.0532;     // m, D (amplitude normalization)
pub const SECTION_WIDTH: f64 = 0.7117;  // m, B

// ---------------------------------------------------------------------------
// State vector layout
// ---------------------------------------------------------------------------

/// Index map of the state vector for `absorbers` energy sinks:
///
/// `[t, y, r_1..r_N, ẏ, ṙ_1..ṙ_N]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    absorbers: usize,
}

impl StateLayout {
    pub const TIME: usize = 0;
    pub const MAIN_DISPLACEMENT: usize = 1;

    pub const fn new(absorbers: usize) -> Self {
        Self { absorbers }
    }

    pub const fn absorbers(&self) -> usize {
        self.absorbers
    }

    pub const fn dimension(&self) -> usize {
        3 + 2 * self.absorbers
    }

    /// Displacement index of absorber `i` (0-based).
    pub const fn absorber_displacement(&self, i: usize) -> usize {
        2 + i
    }

    pub const fn main_velocity(&self) -> usize {
        self.absorbers + 2
    }

    /// Velocity index of absorber `i` (0-based).
    pub const fn absorber_velocity(&self, i: usize) -> usize {
        self.absorbers + 3 + i
    }

    /// All displacements set to `displacement`, velocities and time zero.
    pub fn initial_state(&self, displacement: f64) -> DVector<f64> {
        let mut state = DVector::zeros(self.dimension());
        for i in Self::MAIN_DISPLACEMENT..self.main_velocity() {
            state[i] = displacement;
        }
        state
    }
}

// ---------------------------------------------------------------------------
// Time settings
// ---------------------------------------------------------------------------

/// Time settings in normalized units (tao = f_n · t).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub tao_step: f64,
    pub total_tao: f64,
    pub settling_tao: f64,   // statistics start here
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tao_step: 0.001,
            total_tao: 500.0,
            settling_tao: 250.0,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> NesResult<()> {
        if !(self.tao_step.is_finite() && self.tao_step > 0.0) {
            return Err(NesError::validation(format!(
                "tao step must be positive, got {}",
                self.tao_step
            )));
        }
        if !(self.total_tao.is_finite() && self.total_tao >= 0.0) {
            return Err(NesError::validation(format!(
                "total tao must be non-negative, got {}",
                self.total_tao
            )));
        }
        if !(self.settling_tao.is_finite() && self.settling_tao >= 0.0) {
            return Err(NesError::validation(format!(
                "settling tao must be non-negative, got {}",
                self.settling_tao
            )));
        }
        Ok(())
    }

    /// Physical time grid for natural frequency `f_n` (Hz).
    pub fn to_physical(&self, f_n: f64) -> TimeGrid {
        TimeGrid {
            dt: self.tao_step / f_n,
            total_time: self.total_tao / f_n,
            settling_time: self.settling_tao / f_n,
        }
    }
}

/// Time settings in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeGrid {
    pub dt: f64,
    pub total_time: f64,
    pub settling_time: f64,
}

impl TimeGrid {
    /// Step count, truncated.
    pub fn num_steps(&self) -> usize {
        (self.total_time / self.dt) as usize
    }
}
