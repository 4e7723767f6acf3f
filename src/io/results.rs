use std::io::{self, Write};

use crate::sim::reduction::DisplacementResult;
use crate::sweep::SweepConfig;

// ---------------------------------------------------------------------------
// Sweep result table
// ---------------------------------------------------------------------------

/// Column names: mr1..mrN, kr1..krN, cr1..crN, rms, peak.
pub fn write_header<W: Write + ?Sized>(writer: &mut W, absorbers: usize) -> io::Result<()> {
    for prefix in ["mr", "kr", "cr"] {
        for i in 1..=absorbers {
            write!(writer, "{prefix}{i}\t")?;
        }
    }
    writeln!(writer, "rms\tpeak")
}

/// One tab-separated row per evaluated configuration.
pub fn write_row<W: Write + ?Sized>(
    writer: &mut W,
    config: &SweepConfig,
    result: &DisplacementResult,
) -> io::Result<()> {
    let ratios = config
        .mass_ratios
        .iter()
        .chain(&config.stiffness_ratios)
        .chain(&config.damping_ratios);
    for r in ratios {
        write!(writer, "{:.8}\t", r)?;
    }
    writeln!(writer, "{:.10e}\t{:.10e}", result.rms, result.peak)
}

/// Numbered configuration line used by the sweep preview.
pub fn write_config<W: Write + ?Sized>(
    writer: &mut W,
    index: usize,
    config: &SweepConfig,
) -> io::Result<()> {
    write!(writer, "{index:>6}:")?;
    for (name, values) in [
        ("mr", &config.mass_ratios),
        ("kr", &config.stiffness_ratios),
        ("cr", &config.damping_ratios),
    ] {
        write!(writer, "  {name}")?;
        for v in values {
            write!(writer, " {:.6}", v)?;
        }
    }
    writeln!(writer)
}
