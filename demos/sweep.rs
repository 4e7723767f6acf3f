use std::io;

use nes_sim::prelude::*;

fn main() -> NesResult<()> {
    println!("=== Two-absorber sweep, total mass ratio 0.02 ===\n");

    let grid = SweepGrid::new(
        vec![vec![0.005, 0.01, 0.015]],
        vec![vec![0.5, 1.0], vec![1.0]],
        vec![vec![0.5], vec![0.5, 1.0]],
    )?;

    let mut model = NesModel::new(2)?;
    model.set_total_tao(100.0)?;
    model.set_settling_tao(50.0)?;

    let mut engine = SweepEngine::new(grid, 0.02, io::stdout())?;
    engine.preview()?;
    println!();

    // Shortened runs keep the demo quick; rows go to stdout
    let count = engine.run(&mut model, BatchMode::Single, Objective::Max)?;
    println!("\nEvaluated {count} configurations");
    Ok(())
}
