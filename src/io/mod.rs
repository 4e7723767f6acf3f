pub mod json;
pub mod results;
pub mod trajectory;

pub use json::{write_summary, write_summary_file, RunSummary};
pub use trajectory::{write_state, write_trajectory};
