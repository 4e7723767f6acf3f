use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dynamics::model::{
    NesModel, DEFAULT_DAMPING_RATIO, DEFAULT_INITIAL_A_STAR, DEFAULT_NATURAL_FREQUENCY,
    DEFAULT_REDUCED_VELOCITY,
};
use crate::dynamics::state::SimConfig;
use crate::dynamics::structure::mode_frequency;
use crate::error::{NesError, NesResult};
use crate::physics::wind::ReducedVelocity;
use crate::sim::reduction::Objective;
use crate::sim::runner::BatchMode;

// ---------------------------------------------------------------------------
// TOML run description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsorberConfig {
    pub mass_ratio: f64,
    pub stiffness_ratio: f64,
    pub damping_ratio: f64,
}

impl Default for AbsorberConfig {
    fn default() -> Self {
        Self {
            mass_ratio: 0.01,
            stiffness_ratio: 1.0,
            damping_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub natural_frequency: f64,
    pub reduced_velocity: f64,
    pub damping_ratio: f64,
    /// Bridge mode 1..3; overrides `natural_frequency` when set.
    pub mode: Option<u8>,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            natural_frequency: DEFAULT_NATURAL_FREQUENCY,
            reduced_velocity: DEFAULT_REDUCED_VELOCITY,
            damping_ratio: DEFAULT_DAMPING_RATIO,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignConfig {
    pub frequency: f64,
    pub damping_ratio: f64,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_NATURAL_FREQUENCY,
            damping_ratio: DEFAULT_DAMPING_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub total_mass_ratio: f64,
    pub grid: Option<PathBuf>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            total_mass_ratio: 0.01,
            grid: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub absorbers: Vec<AbsorberConfig>,
    pub structure: StructureConfig,
    pub design: DesignConfig,
    pub time: SimConfig,
    pub initial_a_star: f64,
    pub aero_table: Option<PathBuf>,
    pub batch: BatchMode,
    pub objective: Objective,
    pub sweep: SweepSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            absorbers: vec![AbsorberConfig::default()],
            structure: StructureConfig::default(),
            design: DesignConfig::default(),
            time: SimConfig::default(),
            initial_a_star: DEFAULT_INITIAL_A_STAR,
            aero_table: None,
            batch: BatchMode::Single,
            objective: Objective::default(),
            sweep: SweepSettings::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> NesResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            NesError::configuration(format!("Can not read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> NesResult<Self> {
        toml::from_str(text).map_err(|e| NesError::configuration(format!("Invalid config: {e}")))
    }

    pub fn validate(&self) -> NesResult<()> {
        for (i, a) in self.absorbers.iter().enumerate() {
            for (name, v) in [
                ("mass_ratio", a.mass_ratio),
                ("stiffness_ratio", a.stiffness_ratio),
                ("damping_ratio", a.damping_ratio),
            ] {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(NesError::validation(format!(
                        "absorber {} {name} must be non-negative, got {v}",
                        i + 1
                    )));
                }
            }
        }

        let s = &self.structure;
        ReducedVelocity::classify(s.reduced_velocity)?;
        if let Some(mode) = s.mode {
            mode_frequency(mode)?;
        }
        for (name, v) in [
            ("structure.natural_frequency", s.natural_frequency),
            ("design.frequency", self.design.frequency),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(NesError::validation(format!("{name} must be positive, got {v}")));
            }
        }
        for (name, v) in [
            ("structure.damping_ratio", s.damping_ratio),
            ("design.damping_ratio", self.design.damping_ratio),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(NesError::validation(format!("{name} must be non-negative, got {v}")));
            }
        }

        self.time.validate()?;
        if !self.initial_a_star.is_finite() {
            return Err(NesError::validation("initial_a_star must be finite"));
        }
        let total = self.sweep.total_mass_ratio;
        if !(total.is_finite() && total > 0.0) {
            return Err(NesError::validation(format!(
                "sweep.total_mass_ratio must be positive, got {total}"
            )));
        }
        Ok(())
    }

    /// Validate, then build a model with every setting applied.
    pub fn build_model(&self) -> NesResult<NesModel> {
        self.validate()?;
        let mut model = NesModel::new(self.absorbers.len())?;

        let s = &self.structure;
        model.set_reduced_velocity(s.reduced_velocity)?;
        if let Some(path) = &self.aero_table {
            model.set_aero_table_file(Some(path.as_path()))?;
        }
        match s.mode {
            Some(mode) => model.set_mode(mode)?,
            None => model.set_main_natural_frequency(s.natural_frequency)?,
        }
        model.set_main_damping_ratio(s.damping_ratio)?;

        model.set_design_frequency(self.design.frequency)?;
        model.set_design_damping_ratio(self.design.damping_ratio)?;

        for (i, a) in self.absorbers.iter().enumerate() {
            model.set_absorber_mass_ratio(i + 1, a.mass_ratio)?;
            model.set_absorber_stiffness_ratio(i + 1, a.stiffness_ratio)?;
            model.set_absorber_damping_ratio(i + 1, a.damping_ratio)?;
        }

        model.set_tao_step(self.time.tao_step)?;
        model.set_total_tao(self.time.total_tao)?;
        model.set_settling_tao(self.time.settling_tao)?;
        model.set_initial_a_star(self.initial_a_star)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = RunConfig::from_toml("").unwrap();
        assert_eq!(cfg, RunConfig::default());
        let m = cfg.build_model().unwrap();
        assert_eq!(m.absorber_count(), 1);
        assert_eq!(m.structure().u_star(), 1.7);
    }

    #[test]
    fn full_file() {
        let text = r#"
            initial_a_star = 0.01
            batch = "1m3u"
            objective = "max"

            [[absorbers]]
            mass_ratio = 0.005
            stiffness_ratio = 0.55
            damping_ratio = 0.65

            [[absorbers]]
            mass_ratio = 0.015

            [structure]
            reduced_velocity = 1.8
            mode = 3

            [time]
            total_tao = 100.0

            [sweep]
            total_mass_ratio = 0.02
        "#;
        let cfg = RunConfig::from_toml(text).unwrap();
        assert_eq!(cfg.batch, BatchMode::OneModeThreeWinds);
        assert_eq!(cfg.objective, Objective::Max);
        assert_eq!(cfg.absorbers[1].stiffness_ratio, 1.0);
        assert_eq!(cfg.time.tao_step, 0.001);

        let m = cfg.build_model().unwrap();
        assert_eq!(m.absorber_count(), 2);
        assert_eq!(m.absorbers()[0].stiffness_ratio(), 0.55);
        assert_eq!(m.structure().natural_frequency(), mode_frequency(3).unwrap());
        assert_eq!(m.structure().u_star(), 1.8);
        assert_eq!(m.time().total_tao, 100.0);
        assert_eq!(m.initial_a_star(), 0.01);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cfg = RunConfig::from_toml("[structure]\nreduced_velocity = 1.65\n").unwrap();
        assert!(matches!(cfg.validate(), Err(NesError::Configuration(_))));

        let cfg = RunConfig::from_toml("[[absorbers]]\nmass_ratio = -0.01\n").unwrap();
        assert!(matches!(cfg.validate(), Err(NesError::Validation(_))));

        let cfg = RunConfig::from_toml("[time]\ntao_step = 0.0\n").unwrap();
        assert!(matches!(cfg.build_model(), Err(NesError::Validation(_))));
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            RunConfig::from_toml("absorbers = 3"),
            Err(NesError::Configuration(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[design]\nfrequency = 1.2").unwrap();
        let cfg = RunConfig::load(file.path()).unwrap();
        assert_eq!(cfg.design.frequency, 1.2);
        assert!(RunConfig::load(Path::new("/nonexistent/nes.toml")).is_err());
    }
}
