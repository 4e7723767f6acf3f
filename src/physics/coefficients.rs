use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{NesError, NesResult};
use crate::physics::wind::ReducedVelocity;

// ---------------------------------------------------------------------------
// Amplitude-dependent flutter derivatives (H1*, H4*)
// ---------------------------------------------------------------------------

/// Relative tolerance when matching a row's U* against the requested one.
const U_STAR_REL_TOL: f64 = 1e-8;

/// Amplitude gaps below this are treated as 1 when computing slopes.
const MIN_AMPLITUDE_GAP: f64 = 1e-9;

/// One calibration point with the forward slope to its right neighbour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientPoint {
    pub a_star: f64,
    pub h1: f64,
    pub h4: f64,
    pub slope_h1: f64,
    pub slope_h4: f64,
}

/// Tabulated coefficients for a single reduced wind velocity.
///
/// Points are sorted by A*; lookups clamp to the end points and interpolate
/// linearly in between, so the table is a continuous piecewise-linear curve.
#[derive(Debug, Clone)]
pub struct AeroTable {
    u_star: f64,
    points: Vec<CoefficientPoint>,
}

impl AeroTable {
    /// Table from the file if given, otherwise the built-in calibration.
    pub fn load(u_star: f64, file: Option<&Path>) -> NesResult<Self> {
        match file {
            Some(path) => Self::from_file(u_star, path),
            None => Self::builtin(u_star),
        }
    }

    /// One of the three built-in 13-point tables.
    pub fn builtin(u_star: f64) -> NesResult<Self> {
        let class = ReducedVelocity::ALL
            .into_iter()
            .find(|c| matches_velocity(c.value(), u_star))
            .ok_or_else(|| NesError::configuration(format!("Unsupported U* {u_star}")))?;
        Self::from_points(u_star, class.builtin_points().to_vec())
    }

    /// Read rows of `A* U* H1* H4*`, keeping those whose U* matches.
    pub fn from_file(u_star: f64, path: &Path) -> NesResult<Self> {
        let file = File::open(path).map_err(|e| {
            NesError::configuration(format!(
                "Can not open aerodynamic table {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(u_star, BufReader::new(file))
    }

    pub fn parse<R: BufRead>(u_star: f64, reader: R) -> NesResult<Self> {
        let mut rows = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let values = line
                .split_whitespace()
                .map(|token| token.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    NesError::configuration(format!("Invalid data in line {line_number}"))
                })?;
            if values.len() != 4 {
                return Err(NesError::configuration(format!(
                    "Invalid number of columns in line {line_number}"
                )));
            }
            if matches_velocity(values[1], u_star) {
                rows.push((values[0], values[2], values[3]));
            }
        }
        Self::from_points(u_star, rows)
    }

    fn from_points(u_star: f64, mut rows: Vec<(f64, f64, f64)>) -> NesResult<Self> {
        if rows.len() < 2 {
            return Err(NesError::configuration(format!(
                "Not enough data points for U* {u_star}"
            )));
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut points: Vec<CoefficientPoint> = rows
            .iter()
            .map(|&(a_star, h1, h4)| CoefficientPoint {
                a_star,
                h1,
                h4,
                slope_h1: 0.0,
                slope_h4: 0.0,
            })
            .collect();

        for i in 0..points.len() - 1 {
            let next = points[i + 1];
            let cur = &mut points[i];
            let mut gap = next.a_star - cur.a_star;
            if gap.abs() < MIN_AMPLITUDE_GAP {
                gap = 1.0;
            }
            cur.slope_h1 = (next.h1 - cur.h1) / gap;
            cur.slope_h4 = (next.h4 - cur.h4) / gap;
        }

        Ok(Self { u_star, points })
    }

    pub fn u_star(&self) -> f64 {
        self.u_star
    }

    pub fn points(&self) -> &[CoefficientPoint] {
        &self.points
    }

    /// (H1*, H4*) at normalized amplitude `a_star`.
    pub fn lookup(&self, a_star: f64) -> (f64, f64) {
        let first = &self.points[0];
        if a_star <= first.a_star {
            return (first.h1, first.h4);
        }
        let last = &self.points[self.points.len() - 1];
        if a_star >= last.a_star {
            return (last.h1, last.h4);
        }

        // last point at or below a_star, so breakpoints return stored values
        let upper = self.points.partition_point(|p| p.a_star <= a_star);
        let p = &self.points[upper - 1];
        let da = a_star - p.a_star;
        (p.h1 + da * p.slope_h1, p.h4 + da * p.slope_h4)
    }
}

fn matches_velocity(candidate: f64, target: f64) -> bool {
    (candidate - target).abs() <= target.abs() * U_STAR_REL_TOL
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
