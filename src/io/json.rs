use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::dynamics::model::NesModel;
use crate::sim::reduction::{DisplacementResult, Objective};
use crate::sim::runner::BatchMode;

/// Absorber ratios as configured for the run.
#[derive(Debug, Clone, Serialize)]
pub struct AbsorberSummary {
    pub mass_ratio: f64,
    pub stiffness_ratio: f64,
    pub damping_ratio: f64,
}

/// Parameters and results of one `run` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub natural_frequency: f64,
    pub reduced_velocity: f64,
    pub damping_ratio: f64,
    pub design_frequency: f64,
    pub design_damping_ratio: f64,
    pub tao_step: f64,
    pub total_tao: f64,
    pub settling_tao: f64,
    pub initial_a_star: f64,
    pub absorbers: Vec<AbsorberSummary>,
    pub batch: BatchMode,
    pub objective: Objective,
    pub runs: Vec<DisplacementResult>,
    pub result: DisplacementResult,
    pub wall_time_s: f64,
}

impl RunSummary {
    pub fn new(
        model: &NesModel,
        batch: BatchMode,
        objective: Objective,
        runs: Vec<DisplacementResult>,
        result: DisplacementResult,
        wall_time_s: f64,
    ) -> Self {
        let s = model.structure();
        let time = model.time();
        Self {
            natural_frequency: s.natural_frequency(),
            reduced_velocity: s.u_star(),
            damping_ratio: s.damping_ratio(),
            design_frequency: model.design().frequency(),
            design_damping_ratio: model.design().damping_ratio(),
            tao_step: time.tao_step,
            total_tao: time.total_tao,
            settling_tao: time.settling_tao,
            initial_a_star: model.initial_a_star(),
            absorbers: model
                .absorbers()
                .iter()
                .map(|a| AbsorberSummary {
                    mass_ratio: a.mass_ratio(),
                    stiffness_ratio: a.stiffness_ratio(),
                    damping_ratio: a.damping_ratio(),
                })
                .collect(),
            batch,
            objective,
            runs,
            result,
            wall_time_s,
        }
    }
}

/// Write the run summary as pretty-printed JSON.
pub fn write_summary<W: Write>(writer: &mut W, summary: &RunSummary) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, summary)?;
    writeln!(writer)
}

/// Write the run summary JSON to a file.
pub fn write_summary_file(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_summary(&mut out, summary)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        let model = NesModel::new(2).unwrap();
        let runs = vec![DisplacementResult { rms: 0.1, peak: 0.2 }; 3];
        RunSummary::new(
            &model,
            BatchMode::OneModeThreeWinds,
            Objective::MaxAvg,
            runs,
            DisplacementResult { rms: 0.1, peak: 0.2 },
            1.5,
        )
    }

    #[test]
    fn json_has_parameters_and_results() {
        let mut buf = Vec::new();
        write_summary(&mut buf, &summary()).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["batch"], "1m3u");
        assert_eq!(v["objective"], "max-avg");
        assert_eq!(v["absorbers"].as_array().unwrap().len(), 2);
        assert_eq!(v["runs"].as_array().unwrap().len(), 3);
        assert_eq!(v["result"]["peak"], 0.2);
        assert_eq!(v["reduced_velocity"], 1.7);
    }

    #[test]
    fn summary_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        write_summary_file(&path, &summary()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"wall_time_s\": 1.5"));
    }
}
