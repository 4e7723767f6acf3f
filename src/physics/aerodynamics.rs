use std::f64::consts::PI;

use crate::physics::coefficients::AeroTable;

/// Pre-multiplied constants of the self-excited lift for one wind condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AeroFactors {
    pub velocity: f64,      // multiplies H1* · ẏ
    pub displacement: f64,  // multiplies H4* · y
    pub inv_omega: f64,     // 1 / (2π f_real)
    pub inv_length: f64,    // 1 / D
}

impl AeroFactors {
    /// Factors from fluid density, section width `b`, reference length `d`
    /// and the wind-loaded frequency `f_real` (Hz).
    pub fn new(rho: f64, b: f64, d: f64, f_real: f64) -> Self {
        Self {
            velocity: PI * rho * b * b * f_real,
            displacement: 2.0 * PI * PI * rho * b * b * b * f_real * f_real / d,
            inv_omega: 1.0 / (2.0 * PI * f_real),
            inv_length: 1.0 / d,
        }
    }

    /// Instantaneous amplitude of the motion, normalized by D.
    pub fn amplitude(&self, y: f64, y_dot: f64) -> f64 {
        let v = y_dot * self.inv_omega;
        (y * y + v * v).sqrt() * self.inv_length
    }
}

/// Self-excited lift on the main structure (N).
///
/// The coefficients depend on the current amplitude, which closes the loop
/// between response level and aerodynamic damping.
pub fn self_excited_force(y: f64, y_dot: f64, factors: &AeroFactors, table: &AeroTable) -> f64 {
    let (h1, h4) = table.lookup(factors.amplitude(y, y_dot));
    factors.velocity * h1 * y_dot + factors.displacement * h4 * y
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: f64 = 0.0532;

    fn factors() -> AeroFactors {
        AeroFactors::new(1.225, 0.7117, D, 1.117 * 0.973_652_933)
    }

    #[test]
    fn amplitude_of_pure_displacement() {
        let f = factors();
        assert!((f.amplitude(0.05 * D, 0.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn amplitude_combines_velocity() {
        let f = factors();
        let omega = 1.0 / f.inv_omega;
        let a = f.amplitude(0.03 * D, 0.04 * D * omega);
        assert!((a - 0.05).abs() < 1e-12);
    }

    #[test]
    fn no_force_at_rest() {
        let table = AeroTable::builtin(1.7).unwrap();
        assert_eq!(self_excited_force(0.0, 0.0, &factors(), &table), 0.0);
    }

    #[test]
    fn small_amplitude_force_feeds_motion() {
        // H1* > 0 at small amplitude: negative aerodynamic damping
        let table = AeroTable::builtin(1.7).unwrap();
        let f = self_excited_force(0.0, 0.01, &factors(), &table);
        assert!(f > 0.0);
    }
}
