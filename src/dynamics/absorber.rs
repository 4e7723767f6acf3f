use std::f64::consts::PI;

use crate::dynamics::structure::{check_frequency, check_ratio};
use crate::error::NesResult;

// ---------------------------------------------------------------------------
// Design reference for absorber stiffness / damping ratios
// ---------------------------------------------------------------------------

/// Linear oscillator the absorber ratios are measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesignReference {
    frequency: f64,      // Hz
    damping_ratio: f64,
    stiffness: f64,      // N/m
    damping: f64,        // N·s/m
}

impl DesignReference {
    pub fn new(frequency: f64, damping_ratio: f64, main_mass: f64) -> NesResult<Self> {
        check_frequency(frequency)?;
        check_ratio("design damping ratio", damping_ratio)?;
        let omega = 2.0 * PI * frequency;
        let stiffness = main_mass * omega * omega;
        Ok(Self {
            frequency,
            damping_ratio,
            stiffness,
            damping: 2.0 * damping_ratio * (stiffness * main_mass).sqrt(),
        })
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn damping_ratio(&self) -> f64 {
        self.damping_ratio
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }
}

// ---------------------------------------------------------------------------
// Nonlinear energy sink
// ---------------------------------------------------------------------------

/// Cubic-stiffness absorber attached to the main structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Absorber {
    mass_ratio: f64,
    stiffness_ratio: f64,
    damping_ratio: f64,
    mass: f64,       // kg
    stiffness: f64,  // N/m^3
    damping: f64,    // N·s/m
    inv_mass: f64,
}

impl Default for Absorber {
    fn default() -> Self {
        Self {
            mass_ratio: 0.01,
            stiffness_ratio: 1.0,
            damping_ratio: 1.0,
            mass: 0.0,
            stiffness: 0.0,
            damping: 0.0,
            inv_mass: 0.0,
        }
    }
}

impl Absorber {
    pub fn set_mass_ratio(&mut self, ratio: f64, main_mass: f64) -> NesResult<()> {
        check_ratio("absorber mass ratio", ratio)?;
        self.mass_ratio = ratio;
        self.refresh_mass(main_mass);
        Ok(())
    }

    pub fn set_stiffness_ratio(
        &mut self,
        ratio: f64,
        design: &DesignReference,
        ref_length: f64,
    ) -> NesResult<()> {
        check_ratio("absorber stiffness ratio", ratio)?;
        self.stiffness_ratio = ratio;
        self.stiffness = design.stiffness() * ratio / (ref_length * ref_length);
        Ok(())
    }

    pub fn set_damping_ratio(&mut self, ratio: f64, design: &DesignReference) -> NesResult<()> {
        check_ratio("absorber damping ratio", ratio)?;
        self.damping_ratio = ratio;
        self.damping = design.damping() * ratio;
        Ok(())
    }

    /// Recompute every absolute value from the ratios.
    pub fn refresh(&mut self, main_mass: f64, design: &DesignReference, ref_length: f64) {
        self.refresh_mass(main_mass);
        self.stiffness = design.stiffness() * self.stiffness_ratio / (ref_length * ref_length);
        self.damping = design.damping() * self.damping_ratio;
    }

    fn refresh_mass(&mut self, main_mass: f64) {
        self.mass = main_mass * self.mass_ratio;
        self.inv_mass = 1.0 / self.mass;
    }

    /// Force the absorber exerts back on the main structure, given the
    /// relative displacement and velocity (main minus absorber).
    pub fn coupling_force(&self, rel_disp: f64, rel_vel: f64) -> f64 {
        self.damping * rel_vel + self.stiffness * rel_disp * rel_disp * rel_disp
    }

    pub fn mass_ratio(&self) -> f64 {
        self.mass_ratio
    }

    pub fn stiffness_ratio(&self) -> f64 {
        self.stiffness_ratio
    }

    pub fn damping_ratio(&self) -> f64 {
        self.damping_ratio
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }
}
