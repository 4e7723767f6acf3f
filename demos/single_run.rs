use nes_sim::prelude::*;
use nes_sim::sim::run_config_1m3u;

fn main() -> NesResult<()> {
    println!("=== Single NES on the main girder ===\n");

    let mut model = NesModel::new(1)?;
    model.set_absorber_mass_ratio(1, 0.01)?;
    model.set_absorber_stiffness_ratio(1, 0.55)?;
    model.set_absorber_damping_ratio(1, 0.65)?;
    model.set_initial_a_star(0.01)?;
    println!("{model}");

    let result = run(&model)?;
    println!(
        "U* {:.1}: RMS {:.4e}  peak {:.4e}  (y / D)",
        model.structure().u_star(),
        result.rms,
        result.peak
    );
    println!();

    // Same absorber against all three wind speeds
    println!("=== Wind speed batch ===\n");
    let results = run_config_1m3u(&mut model)?;
    for (u_star, r) in [1.6, 1.7, 1.8].iter().zip(&results) {
        println!("  U* {u_star:.1}: RMS {:.4e}  peak {:.4e}", r.rms, r.peak);
    }
    let worst = Objective::Max.reduce(&results, 3)?;
    println!("\nWorst case: RMS {:.4e}  peak {:.4e}", worst.rms, worst.peak);
    Ok(())
}
