pub mod aerodynamics;
pub mod coefficients;
pub mod wind;

pub use aerodynamics::{self_excited_force, AeroFactors};
pub use coefficients::{AeroTable, CoefficientPoint};
pub use wind::ReducedVelocity;
