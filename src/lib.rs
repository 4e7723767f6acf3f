pub mod config;
pub mod dynamics;
pub mod error;
pub mod io;
pub mod physics;
pub mod sim;
pub mod sweep;

pub use error::{NesError, NesResult};

// Flat re-exports for the common entry points
pub mod prelude {
    pub use crate::config::RunConfig;
    pub use crate::dynamics::NesModel;
    pub use crate::error::{NesError, NesResult};
    pub use crate::sim::{evaluate, run, BatchMode, DisplacementResult, Objective};
    pub use crate::sweep::{SweepEngine, SweepGrid};
}
