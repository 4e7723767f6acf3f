pub mod engine;
pub mod grid;

pub use engine::{for_each_config, SweepConfig, SweepEngine};
pub use grid::{Parameter, SweepGrid};
