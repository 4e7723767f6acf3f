use std::f64::consts::PI;

use crate::dynamics::state::{MAIN_MASS, REF_LENGTH, RHO_AIR, SECTION_WIDTH};
use crate::error::{NesError, NesResult};
use crate::physics::aerodynamics::AeroFactors;
use crate::physics::wind::ReducedVelocity;

// ---------------------------------------------------------------------------
// Vibration modes of the full bridge mapped onto the sectional model
// ---------------------------------------------------------------------------

const BASE_FREQUENCY: f64 = 1.117;  // Hz

/// Natural frequency (Hz) of mode 1, 2 or 3.
pub fn mode_frequency(mode: u8) -> NesResult<f64> {
    match mode {
        1 => Ok(0.1705 / 0.2325 * BASE_FREQUENCY),
        2 => Ok(BASE_FREQUENCY),
        3 => Ok(0.3687 / 0.2325 * BASE_FREQUENCY),
        _ => Err(NesError::configuration(format!("Unsupported mode {mode}"))),
    }
}

// ---------------------------------------------------------------------------
// Main (wind-excited) structure
// ---------------------------------------------------------------------------

/// Single-DOF sectional model of the main structure.
#[derive(Debug, Clone)]
pub struct MainStructure {
    u_star: f64,
    wind: ReducedVelocity,
    damping_ratio: f64,
    natural_frequency: f64,  // Hz
    real_frequency: f64,     // Hz, frequency under wind
    stiffness: f64,          // N/m
    damping: f64,            // N·s/m
}

impl MainStructure {
    pub fn new(u_star: f64, natural_frequency: f64, damping_ratio: f64) -> NesResult<Self> {
        check_frequency(natural_frequency)?;
        check_ratio("structural damping ratio", damping_ratio)?;
        let wind = ReducedVelocity::classify(u_star)?;
        let mut s = Self {
            u_star,
            wind,
            damping_ratio,
            natural_frequency,
            real_frequency: 0.0,
            stiffness: 0.0,
            damping: 0.0,
        };
        s.refresh_real_frequency();
        s.refresh_dynamics();
        Ok(s)
    }

    pub fn set_natural_frequency(&mut self, f_n: f64) -> NesResult<()> {
        check_frequency(f_n)?;
        self.natural_frequency = f_n;
        self.refresh_real_frequency();
        self.refresh_dynamics();
        Ok(())
    }

    pub fn set_mode(&mut self, mode: u8) -> NesResult<()> {
        self.set_natural_frequency(mode_frequency(mode)?)
    }

    pub fn set_reduced_velocity(&mut self, u_star: f64) -> NesResult<()> {
        self.wind = ReducedVelocity::classify(u_star)?;
        self.u_star = u_star;
        self.refresh_real_frequency();
        Ok(())
    }

    pub fn set_damping_ratio(&mut self, ratio: f64) -> NesResult<()> {
        check_ratio("structural damping ratio", ratio)?;
        self.damping_ratio = ratio;
        self.refresh_dynamics();
        Ok(())
    }

    fn refresh_real_frequency(&mut self) {
        self.real_frequency = self.natural_frequency * self.wind.frequency_factor();
    }

    fn refresh_dynamics(&mut self) {
        let omega_n = 2.0 * PI * self.natural_frequency;
        self.stiffness = MAIN_MASS * omega_n * omega_n;
        self.damping = 2.0 * self.damping_ratio * (self.stiffness * MAIN_MASS).sqrt();
    }

    /// Self-excited force constants at the current wind condition.
    pub fn aero_factors(&self) -> AeroFactors {
        AeroFactors::new(RHO_AIR, SECTION_WIDTH, REF_LENGTH, self.real_frequency)
    }

    pub fn mass(&self) -> f64 {
        MAIN_MASS
    }

    pub fn u_star(&self) -> f64 {
        self.u_star
    }

    pub fn wind(&self) -> ReducedVelocity {
        self.wind
    }

    pub fn damping_ratio(&self) -> f64 {
        self.damping_ratio
    }

    pub fn natural_frequency(&self) -> f64 {
        self.natural_frequency
    }

    pub fn real_frequency(&self) -> f64 {
        self.real_frequency
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }
}

pub(crate) fn check_ratio(name: &str, value: f64) -> NesResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(NesError::validation(format!("{name} must be non-negative, got {value}")))
    }
}

pub(crate) fn check_frequency(f: f64) -> NesResult<()> {
    if f.is_finite() && f > 0.0 {
        Ok(())
    } else {
        Err(NesError::validation(format!("frequency must be positive, got {f}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_structure_parameters() {
        let s = MainStructure::new(1.7, 1.117, 0.003).unwrap();
        let k = 7.32 * (2.0 * PI * 1.117_f64).powi(2);
        assert!((s.stiffness() - k).abs() < 1e-9);
        assert!((s.damping() - 2.0 * 0.003 * (k * 7.32).sqrt()).abs() < 1e-12);
        assert!((s.real_frequency() - 1.117 * 0.973_652_933).abs() < 1e-12);
    }

    #[test]
    fn wind_change_updates_real_frequency_only() {
        let mut s = MainStructure::new(1.7, 1.117, 0.003).unwrap();
        let k = s.stiffness();
        s.set_reduced_velocity(1.6).unwrap();
        assert!((s.real_frequency() - 1.117 * 0.968_468_691).abs() < 1e-12);
        assert_eq!(s.stiffness(), k);
    }

    #[test]
    fn unsupported_velocity_leaves_structure_untouched() {
        let mut s = MainStructure::new(1.7, 1.117, 0.003).unwrap();
        assert!(matches!(s.set_reduced_velocity(1.75), Err(NesError::Configuration(_))));
        assert_eq!(s.u_star(), 1.7);
    }

    #[test]
    fn modes() {
        assert!((mode_frequency(2).unwrap() - 1.117).abs() < 1e-15);
        assert!(mode_frequency(1).unwrap() < 1.117);
        assert!(mode_frequency(3).unwrap() > 1.117);
        assert!(matches!(mode_frequency(0), Err(NesError::Configuration(_))));
        assert!(matches!(mode_frequency(4), Err(NesError::Configuration(_))));
    }

    #[test]
    fn negative_damping_rejected() {
        let mut s = MainStructure::new(1.8, 1.0, 0.003).unwrap();
        assert!(matches!(s.set_damping_ratio(-0.1), Err(NesError::Validation(_))));
    }
}
