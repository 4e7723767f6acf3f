use crate::error::{NesError, NesResult};

// ---------------------------------------------------------------------------
// Calibrated reduced wind velocities
// ---------------------------------------------------------------------------

/// Absolute tolerance used to classify a reduced velocity.
pub const U_STAR_TOL: f64 = 1e-10;

/// The three reduced wind velocities the aerodynamic model is calibrated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReducedVelocity {
    U16,
    U17,
    U18,
}

impl ReducedVelocity {
    pub const ALL: [ReducedVelocity; 3] = [Self::U16, Self::U17, Self::U18];

    /// Classify `u` within [`U_STAR_TOL`]; anything else is a configuration error.
    pub fn classify(u: f64) -> NesResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| (c.value() - u).abs() < U_STAR_TOL)
            .ok_or_else(|| NesError::configuration(format!("Unsupported U* {u}")))
    }

    pub const fn value(self) -> f64 {
        match self {
            Self::U16 => 1.6,
            Self::U17 => 1.7,
            Self::U18 => 1.8,
        }
    }

    /// Ratio of the wind-loaded oscillation frequency to the natural frequency.
    pub const fn frequency_factor(self) -> f64 {
        match self {
            Self::U16 => 0.968_468_691,
            Self::U17 => 0.973_652_933,
            Self::U18 => 0.979_006_853,
        }
    }

    /// Built-in (A*, H1*, H4*) calibration points, 13 per velocity.
    pub fn builtin_points(self) -> &'static [(f64, f64, f64)] {
        match self {
            Self::U16 => &U16_POINTS,
            Self::U17 => &U17_POINTS,
            Self::U18 => &U18_POINTS,
        }
    }
}

const U16_POINTS: [(f64, f64, f64); 13] = [
    (0.01, 1.012_549_4, 0.093_775_9),
    (0.02, 1.079_948_6, 0.109_545_8),
    (0.03, 1.031_061_8, 0.124_697_1),
    (0.04, 0.915_905_7, 0.132_262_4),
    (0.05, 0.791_070_5, 0.132_779_1),
    (0.06, 0.654_112, 0.129_245_6),
    (0.07, 0.498_017_9, 0.124_523_2),
    (0.08, 0.330_533_2, 0.120_232_9),
    (0.09, 0.163_200_2, 0.116_968_5),
    (0.10, 0.009_726_3, 0.115_751_4),
    (0.11, -0.110_012_7, 0.115_397_9),
    (0.12, -0.197_355_8, 0.114_526_7),
    (0.13, -0.264_220_2, 0.113_029_5),
];

const U17_POINTS: [(f64, f64, f64); 13] = [
    (0.01, 0.624_235_9, 0.058_273_5),
    (0.02, 0.725_967_4, 0.063_613_5),
    (0.03, 0.779_219_9, 0.069_890_4),
    (0.04, 0.788_562_2, 0.076_962),
    (0.05, 0.758_660_8, 0.082_601_2),
    (0.06, 0.694_497_9, 0.086_198_4),
    (0.07, 0.600_009_7, 0.088_354_8),
    (0.08, 0.481_920_5, 0.090_168_5),
    (0.09, 0.350_662_4, 0.092_304),
    (0.10, 0.218_869_3, 0.095_071_1),
    (0.11, 0.097_305_7, 0.098_606_7),
    (0.12, -0.004_061_6, 0.101_880_6),
    (0.13, -0.084_132_8, 0.103_962_7),
];

const U18_POINTS: [(f64, f64, f64); 13] = [
    (0.01, 0.299_620_6, 0.043_606),
    (0.02, 0.360_441_7, 0.044_043_2),
    (0.03, 0.421_599_7, 0.045_334_5),
    (0.04, 0.463_981_8, 0.048_198_1),
    (0.05, 0.482_679_5, 0.051_966_1),
    (0.06, 0.476_994_7, 0.055_649_9),
    (0.07, 0.448_587_3, 0.059_045_1),
    (0.08, 0.398_975_8, 0.062_367_3),
    (0.09, 0.332_252, 0.065_979),
    (0.10, 0.254_570_8, 0.070_166_8),
    (0.11, 0.173_125_1, 0.075_051_5),
    (0.12, 0.094_067_2, 0.080_576_8),
    (0.13, 0.023_175_5, 0.086_052_4),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_tolerates_rounding() {
        assert_eq!(ReducedVelocity::classify(1.6 + 1e-11).unwrap(), ReducedVelocity::U16);
        assert_eq!(ReducedVelocity::classify(1.7).unwrap(), ReducedVelocity::U17);
        assert_eq!(ReducedVelocity::classify(1.8 - 5e-11).unwrap(), ReducedVelocity::U18);
    }

    #[test]
    fn classify_rejects_other_values() {
        let err = ReducedVelocity::classify(1.65).unwrap_err();
        assert!(matches!(err, NesError::Configuration(_)));
        assert!(ReducedVelocity::classify(1.6 + 1e-6).is_err());
    }

    #[test]
    fn builtin_tables_are_sorted() {
        for class in ReducedVelocity::ALL {
            let pts = class.builtin_points();
            assert_eq!(pts.len(), 13);
            assert!(pts.windows(2).all(|w| w[0].0 < w[1].0));
        }
    }
}
