use std::io::Write;

use tracing::{debug, info};

use crate::dynamics::model::NesModel;
use crate::error::{NesError, NesResult};
use crate::io::results::{write_config, write_header, write_row};
use crate::sim::reduction::Objective;
use crate::sim::runner::{evaluate, BatchMode};
use crate::sweep::grid::SweepGrid;

/// Smallest mass ratio the last absorber may be left with.
pub const MIN_IMPLIED_MASS_RATIO: f64 = 1e-9;

/// One complete absorber assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub mass_ratios: Vec<f64>,
    pub stiffness_ratios: Vec<f64>,
    pub damping_ratios: Vec<f64>,
}

impl SweepConfig {
    fn zeros(n: usize) -> Self {
        Self {
            mass_ratios: vec![0.0; n],
            stiffness_ratios: vec![0.0; n],
            damping_ratios: vec![0.0; n],
        }
    }

    /// Write every ratio into the model (absorbers 1..=N).
    pub fn apply(&self, model: &mut NesModel) -> NesResult<()> {
        for i in 0..self.mass_ratios.len() {
            model.set_absorber_mass_ratio(i + 1, self.mass_ratios[i])?;
            model.set_absorber_stiffness_ratio(i + 1, self.stiffness_ratios[i])?;
            model.set_absorber_damping_ratio(i + 1, self.damping_ratios[i])?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backtracking enumeration
// ---------------------------------------------------------------------------

struct Walker<'a, F> {
    grid: &'a SweepGrid,
    total: f64,
    current: SweepConfig,
    visit: F,
    count: usize,
}

impl<F> Walker<'_, F>
where
    F: FnMut(&SweepConfig) -> NesResult<()>,
{
    /// Mass ratios of absorbers 1..N-1; the last one takes the remainder.
    fn mass_stage(&mut self, i: usize, sum: f64) -> NesResult<()> {
        let grid = self.grid;
        let last = grid.absorbers() - 1;
        if i == last {
            let implied = self.total - sum;
            if implied <= MIN_IMPLIED_MASS_RATIO {
                return Ok(());
            }
            self.current.mass_ratios[last] = implied;
            return self.stiffness_stage(0);
        }
        for &v in &grid.mass()[i] {
            // lists are ascending: nothing further fits either
            if sum + v >= self.total {
                break;
            }
            self.current.mass_ratios[i] = v;
            self.mass_stage(i + 1, sum + v)?;
        }
        Ok(())
    }

    fn stiffness_stage(&mut self, i: usize) -> NesResult<()> {
        let grid = self.grid;
        if i == grid.absorbers() {
            return self.damping_stage(0);
        }
        for &v in &grid.stiffness()[i] {
            self.current.stiffness_ratios[i] = v;
            self.stiffness_stage(i + 1)?;
        }
        Ok(())
    }

    fn damping_stage(&mut self, i: usize) -> NesResult<()> {
        let grid = self.grid;
        if i == grid.absorbers() {
            self.count += 1;
            return (self.visit)(&self.current);
        }
        for &v in &grid.damping()[i] {
            self.current.damping_ratios[i] = v;
            self.damping_stage(i + 1)?;
        }
        Ok(())
    }
}

/// Visit every feasible configuration in traversal order (mass ratios
/// outermost, damping innermost, last absorber fastest). Returns the count.
pub fn for_each_config<F>(grid: &SweepGrid, total_mass_ratio: f64, visit: F) -> NesResult<usize>
where
    F: FnMut(&SweepConfig) -> NesResult<()>,
{
    let mut walker = Walker {
        grid,
        total: total_mass_ratio,
        current: SweepConfig::zeros(grid.absorbers()),
        visit,
        count: 0,
    };
    walker.mass_stage(0, 0.0)?;
    Ok(walker.count)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Sweep over a grid, writing results to a sink it owns.
pub struct SweepEngine<W: Write> {
    grid: SweepGrid,
    total_mass_ratio: f64,
    sink: W,
}

impl<W: Write> SweepEngine<W> {
    pub fn new(grid: SweepGrid, total_mass_ratio: f64, sink: W) -> NesResult<Self> {
        if !(total_mass_ratio.is_finite() && total_mass_ratio > 0.0) {
            return Err(NesError::validation(format!(
                "Total mass ratio must be positive, got {total_mass_ratio}"
            )));
        }
        Ok(Self { grid, total_mass_ratio, sink })
    }

    pub fn grid(&self) -> &SweepGrid {
        &self.grid
    }

    pub fn total_mass_ratio(&self) -> f64 {
        self.total_mass_ratio
    }

    /// Every feasible configuration, in traversal order.
    pub fn configs(&self) -> NesResult<Vec<SweepConfig>> {
        let mut all = Vec::new();
        for_each_config(&self.grid, self.total_mass_ratio, |c| {
            all.push(c.clone());
            Ok(())
        })?;
        Ok(all)
    }

    pub fn count(&self) -> NesResult<usize> {
        for_each_config(&self.grid, self.total_mass_ratio, |_| Ok(()))
    }

    /// Write the numbered configuration list and the total, without running.
    pub fn preview(&mut self) -> NesResult<usize> {
        let Self { grid, total_mass_ratio, sink } = self;
        let mut index = 0;
        let count = for_each_config(grid, *total_mass_ratio, |c| {
            index += 1;
            write_config(sink, index, c)?;
            Ok(())
        })?;
        writeln!(sink, "Total configurations: {count}")?;
        sink.flush()?;
        Ok(count)
    }

    /// Evaluate every configuration and write one row each. The header goes
    /// first; rows are written as they are produced.
    pub fn run(
        &mut self,
        model: &mut NesModel,
        mode: BatchMode,
        objective: Objective,
    ) -> NesResult<usize> {
        if self.grid.absorbers() != model.absorber_count() {
            return Err(NesError::validation(format!(
                "Grid is for {} absorbers, model has {}",
                self.grid.absorbers(),
                model.absorber_count()
            )));
        }
        let Self { grid, total_mass_ratio, sink } = self;
        write_header(sink, grid.absorbers())?;
        let count = for_each_config(grid, *total_mass_ratio, |config| {
            config.apply(model)?;
            let result = evaluate(model, mode, objective)?;
            debug!(?config, rms = result.rms, peak = result.peak, "configuration");
            write_row(sink, config, &result)?;
            Ok(())
        })?;
        sink.flush()?;
        info!(configs = count, %mode, %objective, "sweep done");
        Ok(count)
    }

    pub fn into_sink(self) -> W {
        self.sink
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
