use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dynamics::model::NesModel;
use crate::dynamics::state::REF_LENGTH;
use crate::error::{NesError, NesResult};
use crate::io::trajectory::write_state;
use crate::physics::wind::ReducedVelocity;
use crate::sim::integrator::Rk4;
use crate::sim::reduction::{windowed_max, windowed_rms, DisplacementResult, Objective};

// ---------------------------------------------------------------------------
// Single run
// ---------------------------------------------------------------------------

/// Integrate one trajectory and reduce the main displacement over the
/// settling window.
pub fn run(model: &NesModel) -> NesResult<DisplacementResult> {
    run_with(model, None)
}

/// Like [`run`], also writing every state (initial included) to `trajectory`.
pub fn run_with(
    model: &NesModel,
    mut trajectory: Option<&mut dyn Write>,
) -> NesResult<DisplacementResult> {
    run_observed(model, |s| {
        if let Some(sink) = trajectory.as_deref_mut() {
            write_state(sink, s)?;
        }
        Ok(())
    })
}

/// One run that also keeps every `every`-th state, the initial state
/// included.
pub fn run_sampled(
    model: &NesModel,
    every: usize,
) -> NesResult<(DisplacementResult, Vec<DVector<f64>>)> {
    let every = every.max(1);
    let mut samples = Vec::with_capacity(model.time_grid().num_steps() / every + 1);
    let mut i = 0usize;
    let result = run_observed(model, |s| {
        if i % every == 0 {
            samples.push(s.clone());
        }
        i += 1;
        Ok(())
    })?;
    Ok((result, samples))
}

fn run_observed<F>(model: &NesModel, mut observe: F) -> NesResult<DisplacementResult>
where
    F: FnMut(&DVector<f64>) -> NesResult<()>,
{
    check_masses(model)?;
    let grid = model.time_grid();
    let steps = grid.num_steps();
    debug!(
        f_n = model.structure().natural_frequency(),
        u_star = model.structure().u_star(),
        absorbers = model.absorber_count(),
        steps,
        "run"
    );

    let rk = Rk4::new(model, grid.dt, steps)?;
    let mut state = model.initial_state();
    let mut rows: Vec<[f64; 2]> = Vec::with_capacity(steps + 1);
    rk.integrate_with(&mut state, |s| {
        rows.push([s[0], s[1]]);
        observe(s)
    })?;

    Ok(DisplacementResult {
        rms: windowed_rms(&rows, 1, grid.settling_time) / REF_LENGTH,
        peak: windowed_max(&rows, 1, grid.settling_time) / REF_LENGTH,
    })
}

fn check_masses(model: &NesModel) -> NesResult<()> {
    match model.absorbers().iter().position(|a| !(a.mass() > 0.0)) {
        Some(i) => Err(NesError::validation(format!(
            "Absorber {} has no mass and cannot be integrated",
            i + 1
        ))),
        None => Ok(()),
    }
}

/// Run with the trajectory written to `path`.
pub fn run_to_file(model: &NesModel, path: &Path) -> NesResult<DisplacementResult> {
    let mut out = BufWriter::new(File::create(path)?);
    let result = run_with(model, Some(&mut out))?;
    out.flush()?;
    Ok(result)
}

// ---------------------------------------------------------------------------
// Batches over modes and wind speeds
// ---------------------------------------------------------------------------

/// Which set of runs evaluates one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchMode {
    /// The model as configured.
    #[serde(rename = "single")]
    Single,
    /// U* 1.6, 1.7, 1.8 at the current natural frequency.
    #[serde(rename = "1m3u")]
    OneModeThreeWinds,
    /// Modes 1..3, each at U* 1.6, 1.7, 1.8.
    #[default]
    #[serde(rename = "3m3u")]
    ThreeModesThreeWinds,
}

impl BatchMode {
    pub fn run_count(self) -> usize {
        match self {
            Self::Single => 1,
            Self::OneModeThreeWinds => 3,
            Self::ThreeModesThreeWinds => 9,
        }
    }

    /// Runs per mode, the grouping the max-avg objective uses.
    pub fn group_size(self) -> usize {
        match self {
            Self::Single => 1,
            Self::OneModeThreeWinds | Self::ThreeModesThreeWinds => ReducedVelocity::ALL.len(),
        }
    }
}

impl FromStr for BatchMode {
    type Err = NesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "1" => Ok(Self::Single),
            "1m3u" => Ok(Self::OneModeThreeWinds),
            "3m3u" => Ok(Self::ThreeModesThreeWinds),
            other => Err(NesError::configuration(format!("Unknown batch mode '{other}'"))),
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::OneModeThreeWinds => "1m3u",
            Self::ThreeModesThreeWinds => "3m3u",
        })
    }
}

/// Run `body`, then put the model's natural frequency and U* back.
fn restoring<F>(model: &mut NesModel, body: F) -> NesResult<Vec<DisplacementResult>>
where
    F: FnOnce(&mut NesModel) -> NesResult<Vec<DisplacementResult>>,
{
    let f_n = model.structure().natural_frequency();
    let u_star = model.structure().u_star();
    let outcome = body(model);
    let restored = model
        .set_main_natural_frequency(f_n)
        .and_then(|()| model.set_reduced_velocity(u_star));
    // the batch error wins over a restore error
    let results = outcome?;
    restored?;
    Ok(results)
}

fn run_winds(model: &mut NesModel, results: &mut Vec<DisplacementResult>) -> NesResult<()> {
    for wind in ReducedVelocity::ALL {
        model.set_reduced_velocity(wind.value())?;
        results.push(run(model)?);
    }
    Ok(())
}

fn check_count(results: &[DisplacementResult], expected: usize) -> NesResult<()> {
    if results.len() != expected {
        return Err(NesError::consistency(format!(
            "Batch produced {} results, expected {expected}",
            results.len()
        )));
    }
    Ok(())
}

/// Nine runs: modes 1..3 (outer) × U* 1.6, 1.7, 1.8 (inner).
pub fn run_config_3m3u(model: &mut NesModel) -> NesResult<Vec<DisplacementResult>> {
    let results = restoring(model, |m| {
        let mut results = Vec::with_capacity(9);
        for mode in 1..=3 {
            m.set_mode(mode)?;
            run_winds(m, &mut results)?;
        }
        Ok(results)
    })?;
    check_count(&results, 9)?;
    info!(runs = results.len(), "3m3u batch done");
    Ok(results)
}

/// Three runs at the current natural frequency: U* 1.6, 1.7, 1.8.
pub fn run_config_1m3u(model: &mut NesModel) -> NesResult<Vec<DisplacementResult>> {
    let results = restoring(model, |m| {
        let mut results = Vec::with_capacity(3);
        run_winds(m, &mut results)?;
        Ok(results)
    })?;
    check_count(&results, 3)?;
    info!(runs = results.len(), "1m3u batch done");
    Ok(results)
}

pub fn run_batch(model: &mut NesModel, mode: BatchMode) -> NesResult<Vec<DisplacementResult>> {
    match mode {
        BatchMode::Single => Ok(vec![run(model)?]),
        BatchMode::OneModeThreeWinds => run_config_1m3u(model),
        BatchMode::ThreeModesThreeWinds => run_config_3m3u(model),
    }
}

/// Run a batch and reduce it to one result.
pub fn evaluate(
    model: &mut NesModel,
    mode: BatchMode,
    objective: Objective,
) -> NesResult<DisplacementResult> {
    let results = run_batch(model, mode)?;
    objective.reduce(&results, mode.group_size())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn one_absorber() -> NesModel {
        let mut m = NesModel::new(1).unwrap();
        m.set_absorber_mass_ratio(1, 0.01).unwrap();
        m.set_absorber_stiffness_ratio(1, 0.55).unwrap();
        m.set_absorber_damping_ratio(1, 0.65).unwrap();
        m.set_initial_a_star(0.01).unwrap();
        m
    }

    fn short(mut m: NesModel) -> NesModel {
        m.set_tao_step(0.01).unwrap();
        m.set_total_tao(20.0).unwrap();
        m.set_settling_tao(10.0).unwrap();
        m
    }

    #[test]
    fn full_run_is_finite_and_bounded() {
        let m = one_absorber();
        let r = run(&m).unwrap();
        assert!(r.rms.is_finite() && r.peak.is_finite());
        assert!(r.rms > 0.0, "rms = {}", r.rms);
        assert!(r.rms < r.peak, "rms {} peak {}", r.rms, r.peak);
        assert!(r.peak < 10.0, "diverged: peak {}", r.peak);
    }

    #[test]
    fn run_is_deterministic() {
        let m = short(one_absorber());
        assert_eq!(run(&m).unwrap(), run(&m).unwrap());
    }

    #[test]
    fn trajectory_has_one_line_per_callback() {
        let m = short(one_absorber());
        let mut buf = Vec::new();
        run_with(&m, Some(&mut buf)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), m.time_grid().num_steps() + 1);
        let first: Vec<f64> = lines[0].split('\t').filter(|t| !t.is_empty()).map(|t| t.parse().unwrap()).collect();
        assert_eq!(first.len(), m.layout().dimension());
        assert!((first[1] - 0.01 * REF_LENGTH).abs() < 1e-12);
    }

    #[test]
    fn trajectory_file_matches_buffer() {
        let m = short(one_absorber());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traj.txt");
        let a = run_to_file(&m, &path).unwrap();
        let mut buf = Vec::new();
        let b = run_with(&m, Some(&mut buf)).unwrap();
        assert_eq!(a, b);
        assert_eq!(std::fs::read(&path).unwrap(), buf);
    }

    #[test]
    fn sampled_trajectory_matches_run() {
        let m = short(one_absorber());
        let (result, samples) = run_sampled(&m, 10).unwrap();
        assert_eq!(result, run(&m).unwrap());
        assert_eq!(samples.len(), m.time_grid().num_steps() / 10 + 1);
        let mut buf = Vec::new();
        run_with(&m, Some(&mut buf)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let line = text.lines().nth(10).unwrap();
        let y: f64 = line.split('\t').nth(1).unwrap().parse().unwrap();
        assert!((samples[1][1] - y).abs() <= 1e-10 * y.abs().max(1e-12));
    }

    #[test]
    fn massless_absorber_is_rejected() {
        let mut m = short(one_absorber());
        m.set_absorber_mass_ratio(1, 0.0).unwrap();
        assert!(matches!(run(&m), Err(NesError::Validation(_))));
    }

    #[test]
    fn no_absorbers_still_runs() {
        let m = short(NesModel::new(0).unwrap());
        let r = run(&m).unwrap();
        assert!(r.rms > 0.0 && r.rms.is_finite());
    }

    #[test]
    fn batches_have_fixed_size_and_restore_model() {
        let mut m = short(one_absorber());
        m.set_main_natural_frequency(1.3).unwrap();
        m.set_reduced_velocity(1.8).unwrap();
        assert_eq!(run_config_1m3u(&mut m).unwrap().len(), 3);
        assert_eq!(run_config_3m3u(&mut m).unwrap().len(), 9);
        assert_eq!(m.structure().natural_frequency(), 1.3);
        assert_eq!(m.structure().u_star(), 1.8);
    }

    #[test]
    fn failed_batch_restores_model_and_keeps_error() {
        let mut m = short(one_absorber());
        m.set_main_natural_frequency(1.3).unwrap();
        m.set_reduced_velocity(1.8).unwrap();
        m.set_absorber_mass_ratio(1, 0.0).unwrap();

        assert!(matches!(run_config_3m3u(&mut m), Err(NesError::Validation(_))));
        assert!(matches!(run_config_1m3u(&mut m), Err(NesError::Validation(_))));
        assert_eq!(m.structure().natural_frequency(), 1.3);
        assert_eq!(m.structure().u_star(), 1.8);

        let err = restoring(&mut m, |_| Err(NesError::consistency("batch failed")));
        assert!(matches!(err, Err(NesError::Consistency(_))));
    }

    #[test]
    fn one_mode_batch_varies_wind() {
        let mut m = short(one_absorber());
        let results = run_config_1m3u(&mut m).unwrap();
        assert!(results[0] != results[1] && results[1] != results[2]);
    }

    #[test]
    fn evaluate_single_equals_run() {
        let mut m = short(one_absorber());
        let direct = run(&m).unwrap();
        let eval = evaluate(&mut m, BatchMode::Single, Objective::MaxAvg).unwrap();
        assert_eq!(direct, eval);
    }

    #[test]
    fn batch_mode_names() {
        assert_eq!("3m3u".parse::<BatchMode>().unwrap(), BatchMode::ThreeModesThreeWinds);
        assert_eq!(BatchMode::OneModeThreeWinds.to_string(), "1m3u");
        assert!("2m2u".parse::<BatchMode>().is_err());
        assert_eq!(BatchMode::ThreeModesThreeWinds.run_count(), 9);
    }
}
