//! Coupled structure / energy-sink model.

pub mod absorber;
pub mod model;
pub mod state;
pub mod structure;

pub use absorber::{Absorber, DesignReference};
pub use model::{Equation, NesModel};
pub use state::{SimConfig, StateLayout, TimeGrid};
pub use structure::{mode_frequency, MainStructure};
