pub mod integrator;
pub mod reduction;
pub mod runner;

pub use integrator::{rk4_step, FunctionSet, OdeSystem, Rk4};
pub use reduction::{
    aggregate_9_to_3, aggregate_groups, windowed_max, windowed_rms, DisplacementResult, Objective,
};
pub use runner::{
    evaluate, run, run_batch, run_config_1m3u, run_config_3m3u, run_sampled, run_to_file,
    run_with, BatchMode,
};
