use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use nalgebra::DVector;

use crate::dynamics::absorber::{Absorber, DesignReference};
use crate::dynamics::state::{SimConfig, StateLayout, TimeGrid, MAIN_MASS, REF_LENGTH};
use crate::dynamics::structure::MainStructure;
use crate::error::{NesError, NesResult};
use crate::physics::aerodynamics::{self_excited_force, AeroFactors};
use crate::physics::coefficients::AeroTable;
use crate::physics::wind::ReducedVelocity;
use crate::sim::integrator::{DerivativeFn, FunctionSet, OdeSystem};

pub const DEFAULT_NATURAL_FREQUENCY: f64 = 1.117;  // Hz
pub const DEFAULT_REDUCED_VELOCITY: f64 = 1.7;
pub const DEFAULT_DAMPING_RATIO: f64 = 0.003;
pub const DEFAULT_INITIAL_A_STAR: f64 = 0.06;

// ---------------------------------------------------------------------------
// Equation kinds, one per state dimension
// ---------------------------------------------------------------------------

/// What the derivative of a given state dimension is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equation {
    /// dt/dt = 1
    Time,
    /// Derivative is the state entry at the given index (a velocity).
    Displacement(usize),
    MainAcceleration,
    /// Acceleration of absorber `i` (0-based).
    AbsorberAcceleration(usize),
}

// ---------------------------------------------------------------------------
// Coupled structure + absorbers
// ---------------------------------------------------------------------------

/// Main structure, N energy sinks and everything derived from them.
///
/// The absorber count is fixed at construction. Every mutator recomputes
/// only what depends on the changed value; derivatives read the current
/// parameters, so a change is visible to the next integration run.
#[derive(Debug, Clone)]
pub struct NesModel {
    layout: StateLayout,
    structure: MainStructure,
    design: DesignReference,
    absorbers: Vec<Absorber>,
    time: SimConfig,
    grid: TimeGrid,
    initial_a_star: f64,
    table_file: Option<PathBuf>,
    table: AeroTable,
    aero: AeroFactors,
}

impl NesModel {
    pub fn new(absorbers: usize) -> NesResult<Self> {
        let structure = MainStructure::new(
            DEFAULT_REDUCED_VELOCITY,
            DEFAULT_NATURAL_FREQUENCY,
            DEFAULT_DAMPING_RATIO,
        )?;
        let design = DesignReference::new(
            DEFAULT_NATURAL_FREQUENCY,
            DEFAULT_DAMPING_RATIO,
            MAIN_MASS,
        )?;
        let absorbers = (0..absorbers)
            .map(|_| {
                let mut a = Absorber::default();
                a.refresh(MAIN_MASS, &design, REF_LENGTH);
                a
            })
            .collect::<Vec<_>>();
        let time = SimConfig::default();
        let table = AeroTable::builtin(structure.u_star())?;
        Ok(Self {
            layout: StateLayout::new(absorbers.len()),
            grid: time.to_physical(structure.natural_frequency()),
            aero: structure.aero_factors(),
            structure,
            design,
            absorbers,
            time,
            initial_a_star: DEFAULT_INITIAL_A_STAR,
            table_file: None,
            table,
        })
    }

    // -- main structure ----------------------------------------------------

    pub fn set_main_natural_frequency(&mut self, f_n: f64) -> NesResult<()> {
        self.structure.set_natural_frequency(f_n)?;
        self.aero = self.structure.aero_factors();
        self.grid = self.time.to_physical(f_n);
        Ok(())
    }

    /// Natural frequency of bridge mode 1, 2 or 3.
    pub fn set_mode(&mut self, mode: u8) -> NesResult<()> {
        let f_n = crate::dynamics::structure::mode_frequency(mode)?;
        self.set_main_natural_frequency(f_n)
    }

    /// Change U* and rebuild the coefficient table. On failure the model is
    /// left unchanged.
    pub fn set_reduced_velocity(&mut self, u_star: f64) -> NesResult<()> {
        ReducedVelocity::classify(u_star)?;
        let table = AeroTable::load(u_star, self.table_file.as_deref())?;
        self.structure.set_reduced_velocity(u_star)?;
        self.table = table;
        self.aero = self.structure.aero_factors();
        Ok(())
    }

    pub fn set_main_damping_ratio(&mut self, ratio: f64) -> NesResult<()> {
        self.structure.set_damping_ratio(ratio)
    }

    /// Read coefficient tables from `path` from now on (`None` for the
    /// built-in ones). The table for the current U* is rebuilt immediately.
    pub fn set_aero_table_file(&mut self, path: Option<&Path>) -> NesResult<()> {
        let table = AeroTable::load(self.structure.u_star(), path)?;
        self.table = table;
        self.table_file = path.map(Path::to_path_buf);
        Ok(())
    }

    // -- design reference --------------------------------------------------

    pub fn set_design_frequency(&mut self, f_d: f64) -> NesResult<()> {
        self.design = DesignReference::new(f_d, self.design.damping_ratio(), MAIN_MASS)?;
        self.refresh_absorbers();
        Ok(())
    }

    pub fn set_design_damping_ratio(&mut self, ratio: f64) -> NesResult<()> {
        self.design = DesignReference::new(self.design.frequency(), ratio, MAIN_MASS)?;
        self.refresh_absorbers();
        Ok(())
    }

    fn refresh_absorbers(&mut self) {
        for a in &mut self.absorbers {
            a.refresh(MAIN_MASS, &self.design, REF_LENGTH);
        }
    }

    // -- absorbers (1-based index) -----------------------------------------

    fn absorber_mut(&mut self, index: usize) -> NesResult<&mut Absorber> {
        let n = self.absorbers.len();
        if index == 0 || index > n {
            return Err(NesError::validation(format!(
                "Absorber index {index} out of range 1..={n}"
            )));
        }
        Ok(&mut self.absorbers[index - 1])
    }

    pub fn set_absorber_mass_ratio(&mut self, index: usize, ratio: f64) -> NesResult<()> {
        self.absorber_mut(index)?.set_mass_ratio(ratio, MAIN_MASS)
    }

    pub fn set_absorber_stiffness_ratio(&mut self, index: usize, ratio: f64) -> NesResult<()> {
        let design = self.design;
        self.absorber_mut(index)?.set_stiffness_ratio(ratio, &design, REF_LENGTH)
    }

    pub fn set_absorber_damping_ratio(&mut self, index: usize, ratio: f64) -> NesResult<()> {
        let design = self.design;
        self.absorber_mut(index)?.set_damping_ratio(ratio, &design)
    }

    // -- time --------------------------------------------------------------

    fn set_time(&mut self, time: SimConfig) -> NesResult<()> {
        time.validate()?;
        self.time = time;
        self.grid = time.to_physical(self.structure.natural_frequency());
        Ok(())
    }

    pub fn set_tao_step(&mut self, tao: f64) -> NesResult<()> {
        self.set_time(SimConfig { tao_step: tao, ..self.time })
    }

    pub fn set_total_tao(&mut self, tao: f64) -> NesResult<()> {
        self.set_time(SimConfig { total_tao: tao, ..self.time })
    }

    pub fn set_settling_tao(&mut self, tao: f64) -> NesResult<()> {
        self.set_time(SimConfig { settling_tao: tao, ..self.time })
    }

    pub fn set_initial_a_star(&mut self, a_star: f64) -> NesResult<()> {
        if !a_star.is_finite() {
            return Err(NesError::validation(format!("initial A* must be finite, got {a_star}")));
        }
        self.initial_a_star = a_star;
        Ok(())
    }

    // -- accessors ---------------------------------------------------------

    pub fn layout(&self) -> StateLayout {
        self.layout
    }

    pub fn absorber_count(&self) -> usize {
        self.absorbers.len()
    }

    pub fn structure(&self) -> &MainStructure {
        &self.structure
    }

    pub fn design(&self) -> &DesignReference {
        &self.design
    }

    pub fn absorbers(&self) -> &[Absorber] {
        &self.absorbers
    }

    pub fn time(&self) -> SimConfig {
        self.time
    }

    pub fn time_grid(&self) -> TimeGrid {
        self.grid
    }

    pub fn initial_a_star(&self) -> f64 {
        self.initial_a_star
    }

    pub fn table(&self) -> &AeroTable {
        &self.table
    }

    pub fn table_file(&self) -> Option<&Path> {
        self.table_file.as_deref()
    }

    pub fn aero_factors(&self) -> &AeroFactors {
        &self.aero
    }

    /// Start of every run: all displacements at initial A*·D, at rest.
    pub fn initial_state(&self) -> DVector<f64> {
        self.layout.initial_state(self.initial_a_star * REF_LENGTH)
    }

    // -- equations of motion -----------------------------------------------

    /// Equation kind of every state dimension, in state order.
    pub fn equations(&self) -> Vec<Equation> {
        let n = self.layout.absorbers();
        let mut eqs = Vec::with_capacity(self.layout.dimension());
        eqs.push(Equation::Time);
        eqs.push(Equation::Displacement(self.layout.main_velocity()));
        eqs.extend((0..n).map(|i| Equation::Displacement(self.layout.absorber_velocity(i))));
        eqs.push(Equation::MainAcceleration);
        eqs.extend((0..n).map(Equation::AbsorberAcceleration));
        eqs
    }

    /// Derivative of a single equation at `state`.
    pub fn evaluate(&self, equation: Equation, state: &DVector<f64>) -> f64 {
        match equation {
            Equation::Time => 1.0,
            Equation::Displacement(velocity) => state[velocity],
            Equation::MainAcceleration => self.main_acceleration(state),
            Equation::AbsorberAcceleration(i) => {
                self.coupling_force(i, state) * self.absorbers[i].inv_mass()
            }
        }
    }

    /// Force absorber `i` exerts on the main structure at `state`.
    fn coupling_force(&self, i: usize, state: &DVector<f64>) -> f64 {
        let l = self.layout;
        let y = state[StateLayout::MAIN_DISPLACEMENT];
        let v = state[l.main_velocity()];
        self.absorbers[i].coupling_force(
            y - state[l.absorber_displacement(i)],
            v - state[l.absorber_velocity(i)],
        )
    }

    fn main_acceleration(&self, state: &DVector<f64>) -> f64 {
        let coupling: f64 = (0..self.absorbers.len()).map(|i| self.coupling_force(i, state)).sum();
        self.main_acceleration_with(state, coupling)
    }

    fn main_acceleration_with(&self, state: &DVector<f64>, coupling: f64) -> f64 {
        let y = state[StateLayout::MAIN_DISPLACEMENT];
        let v = state[self.layout.main_velocity()];
        let aero = self_excited_force(y, v, &self.aero, &self.table);
        let s = &self.structure;
        (aero - s.damping() * v - s.stiffness() * y - coupling) / s.mass()
    }

    /// Per-dimension function set over a snapshot of the current parameters.
    /// A later mutation needs a new set.
    pub fn function_set(&self) -> FunctionSet {
        let snapshot = Rc::new(self.clone());
        let funcs = self
            .equations()
            .into_iter()
            .map(|eq| {
                let model = Rc::clone(&snapshot);
                Box::new(move |state: &DVector<f64>| model.evaluate(eq, state)) as DerivativeFn
            })
            .collect();
        FunctionSet::new(funcs)
    }
}

impl OdeSystem for NesModel {
    fn dimension(&self) -> usize {
        self.layout.dimension()
    }

    fn derivatives(&self, state: &DVector<f64>, out: &mut DVector<f64>) {
        let l = self.layout;
        out[StateLayout::TIME] = 1.0;
        out[StateLayout::MAIN_DISPLACEMENT] = state[l.main_velocity()];

        let mut coupling = 0.0;
        for (i, a) in self.absorbers.iter().enumerate() {
            out[l.absorber_displacement(i)] = state[l.absorber_velocity(i)];
            let f = self.coupling_force(i, state);
            coupling += f;
            out[l.absorber_velocity(i)] = f * a.inv_mass();
        }
        out[l.main_velocity()] = self.main_acceleration_with(state, coupling);
    }
}

// ---------------------------------------------------------------------------
// Parameter report
// ---------------------------------------------------------------------------

impl fmt::Display for NesModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.structure;
        let g = &self.grid;
        writeln!(f, "Main structure")?;
        writeln!(f, "  mass            {:.4} kg", s.mass())?;
        writeln!(f, "  f_n             {:.6} Hz", s.natural_frequency())?;
        writeln!(f, "  U*              {:.2}", s.u_star())?;
        writeln!(f, "  f_real          {:.6} Hz", s.real_frequency())?;
        writeln!(f, "  damping ratio   {}", s.damping_ratio())?;
        writeln!(f, "  k               {:.6e} N/m", s.stiffness())?;
        writeln!(f, "  c               {:.6e} N·s/m", s.damping())?;
        writeln!(f, "Design reference")?;
        writeln!(f, "  f_design        {:.6} Hz", self.design.frequency())?;
        writeln!(f, "  damping ratio   {}", self.design.damping_ratio())?;
        writeln!(f, "  k_design        {:.6e} N/m", self.design.stiffness())?;
        writeln!(f, "  c_design        {:.6e} N·s/m", self.design.damping())?;
        for (i, a) in self.absorbers.iter().enumerate() {
            writeln!(f, "Absorber {}", i + 1)?;
            writeln!(f, "  mr {}  kr {}  cr {}", a.mass_ratio(), a.stiffness_ratio(), a.damping_ratio())?;
            writeln!(f, "  m {:.6e} kg  k {:.6e} N/m^3  c {:.6e} N·s/m", a.mass(), a.stiffness(), a.damping())?;
        }
        writeln!(f, "Time")?;
        writeln!(
            f,
            "  tao step {}  total {}  settling {}",
            self.time.tao_step, self.time.total_tao, self.time.settling_tao
        )?;
        writeln!(
            f,
            "  dt {:.6e} s  total {:.4} s  settling {:.4} s  steps {}",
            g.dt,
            g.total_time,
            g.settling_time,
            g.num_steps()
        )?;
        writeln!(f, "Initial A*        {}", self.initial_a_star)?;
        match &self.table_file {
            Some(p) => write!(f, "Aero table        {}", p.display()),
            None => write!(f, "Aero table        built-in"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_state(n: usize) -> DVector<f64> {
        DVector::from_fn(3 + 2 * n, |i, _| 0.001 * (i as f64 + 1.0) * if i % 2 == 0 { 1.0 } else { -1.0 })
    }

    #[test]
    fn equation_count_matches_dimension() {
        for n in 0..5 {
            let m = NesModel::new(n).unwrap();
            assert_eq!(m.equations().len(), 3 + 2 * n);
            assert_eq!(m.function_set().len(), 3 + 2 * n);
            assert_eq!(m.dimension(), 3 + 2 * n);
        }
    }

    #[test]
    fn equation_layout_for_two_absorbers() {
        let m = NesModel::new(2).unwrap();
        assert_eq!(
            m.equations(),
            vec![
                Equation::Time,
                Equation::Displacement(4),
                Equation::Displacement(5),
                Equation::Displacement(6),
                Equation::MainAcceleration,
                Equation::AbsorberAcceleration(0),
                Equation::AbsorberAcceleration(1),
            ]
        );
    }

    #[test]
    fn one_pass_matches_per_equation() {
        let mut m = NesModel::new(3).unwrap();
        m.set_absorber_stiffness_ratio(2, 0.55).unwrap();
        m.set_absorber_damping_ratio(3, 0.65).unwrap();
        let state = sample_state(3);
        let mut out = DVector::zeros(m.dimension());
        m.derivatives(&state, &mut out);
        let set = m.function_set();
        for i in 0..m.dimension() {
            let single = set.eval(i, &state);
            assert!((out[i] - single).abs() <= 1e-12 * single.abs().max(1.0), "dim {i}");
        }
    }

    #[test]
    fn absorber_reaction_balances_main() {
        // Zero aero and structure forces: momentum exchanged between bodies cancels.
        let mut m = NesModel::new(2).unwrap();
        m.set_main_damping_ratio(0.0).unwrap();
        let l = m.layout();
        let mut state = DVector::zeros(l.dimension());
        state[l.absorber_displacement(0)] = 0.002;
        state[l.absorber_velocity(1)] = -0.01;
        let mut out = DVector::zeros(l.dimension());
        m.derivatives(&state, &mut out);
        let main = out[l.main_velocity()] * m.structure().mass();
        let sinks: f64 = (0..2).map(|i| out[l.absorber_velocity(i)] * m.absorbers()[i].mass()).sum();
        assert!((main + sinks).abs() < 1e-12);
    }

    #[test]
    fn index_out_of_range() {
        let mut m = NesModel::new(2).unwrap();
        assert!(matches!(m.set_absorber_mass_ratio(0, 0.01), Err(NesError::Validation(_))));
        assert!(matches!(m.set_absorber_mass_ratio(3, 0.01), Err(NesError::Validation(_))));
        assert!(m.set_absorber_mass_ratio(2, 0.01).is_ok());
    }

    #[test]
    fn negative_ratio_rejected() {
        let mut m = NesModel::new(1).unwrap();
        assert!(matches!(m.set_absorber_damping_ratio(1, -0.5), Err(NesError::Validation(_))));
    }

    #[test]
    fn natural_frequency_rescales_time() {
        let mut m = NesModel::new(1).unwrap();
        m.set_main_natural_frequency(2.0).unwrap();
        let g = m.time_grid();
        assert!((g.dt - 0.0005).abs() < 1e-15);
        assert!((g.total_time - 250.0).abs() < 1e-9);
        assert!((g.settling_time - 125.0).abs() < 1e-9);
    }

    #[test]
    fn design_change_refreshes_absorbers() {
        let mut m = NesModel::new(2).unwrap();
        let k0 = m.absorbers()[1].stiffness();
        m.set_design_frequency(2.0 * 1.117).unwrap();
        assert!((m.absorbers()[1].stiffness() / k0 - 4.0).abs() < 1e-9);
    }

    #[test]
    fn reduced_velocity_with_tolerance() {
        let mut m = NesModel::new(1).unwrap();
        m.set_reduced_velocity(1.6 + 1e-11).unwrap();
        assert_eq!(m.structure().wind(), ReducedVelocity::U16);
        assert_eq!(m.table().points()[0].a_star, AeroTable::builtin(1.6).unwrap().points()[0].a_star);
    }

    #[test]
    fn unsupported_reduced_velocity_keeps_model() {
        let mut m = NesModel::new(1).unwrap();
        assert!(matches!(m.set_reduced_velocity(2.0), Err(NesError::Configuration(_))));
        assert_eq!(m.structure().u_star(), 1.7);
    }

    #[test]
    fn unsupported_mode() {
        let mut m = NesModel::new(1).unwrap();
        assert!(matches!(m.set_mode(5), Err(NesError::Configuration(_))));
        m.set_mode(3).unwrap();
        assert!(m.structure().natural_frequency() > 1.117);
    }

    #[test]
    fn table_file_is_used_for_velocity_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0 1.8 1.0 2.0").unwrap();
        writeln!(file, "0.1 1.8 3.0 4.0").unwrap();
        writeln!(file, "0.0 1.7 5.0 6.0").unwrap();
        writeln!(file, "0.1 1.7 7.0 8.0").unwrap();
        let mut m = NesModel::new(1).unwrap();
        m.set_aero_table_file(Some(file.path())).unwrap();
        assert_eq!(m.table().lookup(0.05), (6.0, 7.0));
        m.set_reduced_velocity(1.8).unwrap();
        assert_eq!(m.table().lookup(0.05), (2.0, 3.0));
        // 1.6 is a supported class but missing from the file
        assert!(m.set_reduced_velocity(1.6).is_err());
        assert_eq!(m.structure().u_star(), 1.8);
    }

    #[test]
    fn report_lists_absorbers() {
        let m = NesModel::new(2).unwrap();
        let text = m.to_string();
        assert!(text.contains("Absorber 1"));
        assert!(text.contains("Absorber 2"));
        assert!(text.contains("built-in"));
    }
}
