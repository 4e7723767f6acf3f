use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NesError, NesResult};

// ---------------------------------------------------------------------------
// Displacement statistics
// ---------------------------------------------------------------------------

/// Normalized (by D) main displacement over the settling window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DisplacementResult {
    pub rms: f64,
    pub peak: f64,
}

/// First row at or after `start_time`, with the time step taken from
/// column 0 of the first two rows.
fn window_start<R: AsRef<[f64]>>(series: &[R], start_time: f64) -> usize {
    if series.len() < 2 {
        return 0;
    }
    let (t0, t1) = match (series[0].as_ref().first(), series[1].as_ref().first()) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return 0,
    };
    let dt = t1 - t0;
    if !(dt > 0.0 && start_time > 0.0) {
        return 0;
    }
    (start_time / dt) as usize
}

/// Values of `column` over the window, or `None` if the window is empty.
fn window<'a, R: AsRef<[f64]>>(
    series: &'a [R],
    column: usize,
    start_time: f64,
) -> Option<impl Iterator<Item = f64> + 'a> {
    let first = series.first()?;
    if column >= first.as_ref().len() {
        return None;
    }
    let start = window_start(series, start_time);
    if start >= series.len() {
        return None;
    }
    Some(series[start..].iter().filter_map(move |row| row.as_ref().get(column).copied()))
}

/// Root mean square of `column` from `start_time` to the end; 0 when the
/// window is empty or the column does not exist.
pub fn windowed_rms<R: AsRef<[f64]>>(series: &[R], column: usize, start_time: f64) -> f64 {
    let Some(values) = window(series, column, start_time) else {
        return 0.0;
    };
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), x| (s + x * x, n + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Maximum of `column` from `start_time` to the end; 0 when the window is
/// empty or the column does not exist.
pub fn windowed_max<R: AsRef<[f64]>>(series: &[R], column: usize, start_time: f64) -> f64 {
    window(series, column, start_time)
        .and_then(|values| values.reduce(f64::max))
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Batch aggregation
// ---------------------------------------------------------------------------

/// Mean over consecutive groups of `group_size` of the per-group maximum,
/// separately for RMS and peak.
pub fn aggregate_groups(
    results: &[DisplacementResult],
    group_size: usize,
) -> NesResult<DisplacementResult> {
    if results.is_empty() || group_size == 0 || results.len() % group_size != 0 {
        return Err(NesError::consistency(format!(
            "Cannot split {} results into groups of {group_size}",
            results.len()
        )));
    }
    let groups = results.len() / group_size;
    let mut total = DisplacementResult::default();
    for group in results.chunks(group_size) {
        total.rms += group.iter().map(|r| r.rms).fold(f64::NEG_INFINITY, f64::max);
        total.peak += group.iter().map(|r| r.peak).fold(f64::NEG_INFINITY, f64::max);
    }
    Ok(DisplacementResult {
        rms: total.rms / groups as f64,
        peak: total.peak / groups as f64,
    })
}

/// Worst wind speed per mode, averaged over the three modes.
pub fn aggregate_9_to_3(results: &[DisplacementResult]) -> NesResult<DisplacementResult> {
    if results.len() != 9 {
        return Err(NesError::consistency(format!(
            "Expected 9 results, got {}",
            results.len()
        )));
    }
    aggregate_groups(results, 3)
}

/// How the runs of a batch are reduced to one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// Maximum within each group, then mean of the maxima.
    #[default]
    MaxAvg,
    Avg,
    Max,
}

impl Objective {
    pub fn reduce(
        self,
        results: &[DisplacementResult],
        group_size: usize,
    ) -> NesResult<DisplacementResult> {
        if results.is_empty() {
            return Err(NesError::consistency("No results to reduce"));
        }
        match self {
            Self::MaxAvg => aggregate_groups(results, group_size),
            Self::Avg => {
                let n = results.len() as f64;
                Ok(DisplacementResult {
                    rms: results.iter().map(|r| r.rms).sum::<f64>() / n,
                    peak: results.iter().map(|r| r.peak).sum::<f64>() / n,
                })
            }
            Self::Max => Ok(DisplacementResult {
                rms: results.iter().map(|r| r.rms).fold(f64::NEG_INFINITY, f64::max),
                peak: results.iter().map(|r| r.peak).fold(f64::NEG_INFINITY, f64::max),
            }),
        }
    }
}

impl FromStr for Objective {
    type Err = NesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max-avg" | "maxavg" => Ok(Self::MaxAvg),
            "avg" => Ok(Self::Avg),
            "max" => Ok(Self::Max),
            other => Err(NesError::configuration(format!("Unknown objective '{other}'"))),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MaxAvg => "max-avg",
            Self::Avg => "avg",
            Self::Max => "max",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(rms: &[f64]) -> Vec<DisplacementResult> {
        rms.iter().map(|&r| DisplacementResult { rms: r, peak: 2.0 * r }).collect()
    }

    #[test]
    fn rms_and_max_of_single_column() {
        let series = vec![[1.0], [2.0], [3.0], [4.0]];
        assert!((windowed_rms(&series, 0, 0.0) - 7.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(windowed_max(&series, 0, 0.0), 4.0);
    }

    #[test]
    fn window_starts_at_settling_time() {
        let series: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 * 0.5, i as f64]).collect();
        // dt 0.5, start 2.0 -> row 4
        assert_eq!(windowed_max(&series, 1, 2.0), 9.0);
        let expected = ((4..10).map(|i| (i * i) as f64).sum::<f64>() / 6.0).sqrt();
        assert!((windowed_rms(&series, 1, 2.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_windows_give_zero() {
        let empty: Vec<[f64; 2]> = Vec::new();
        assert_eq!(windowed_rms(&empty, 0, 0.0), 0.0);
        let series = vec![[0.0, 1.0], [1.0, 2.0]];
        assert_eq!(windowed_rms(&series, 2, 0.0), 0.0);
        assert_eq!(windowed_max(&series, 1, 5.0), 0.0);
    }

    #[test]
    fn single_row_window_starts_at_zero() {
        let series = vec![[3.0, -2.0]];
        assert_eq!(windowed_max(&series, 1, 100.0), -2.0);
    }

    #[test]
    fn nine_to_three() {
        let r = results(&[1.0, 5.0, 3.0, 2.0, 2.0, 9.0, 7.0, 1.0, 1.0]);
        let agg = aggregate_9_to_3(&r).unwrap();
        assert!((agg.rms - 7.0).abs() < 1e-12);
        assert!((agg.peak - 14.0).abs() < 1e-12);
    }

    #[test]
    fn nine_to_three_needs_nine() {
        let r = results(&[1.0; 8]);
        assert!(matches!(aggregate_9_to_3(&r), Err(NesError::Consistency(_))));
    }

    #[test]
    fn groups_must_divide() {
        let r = results(&[1.0, 2.0, 3.0, 4.0]);
        assert!(aggregate_groups(&r, 3).is_err());
        assert!(aggregate_groups(&r, 0).is_err());
        let agg = aggregate_groups(&r, 2).unwrap();
        assert!((agg.rms - 3.0).abs() < 1e-12);
    }

    #[test]
    fn objectives() {
        let r = results(&[1.0, 5.0, 3.0]);
        assert_eq!(Objective::MaxAvg.reduce(&r, 3).unwrap().rms, 5.0);
        assert!((Objective::Avg.reduce(&r, 3).unwrap().rms - 3.0).abs() < 1e-12);
        assert_eq!(Objective::Max.reduce(&r, 1).unwrap().peak, 10.0);
        assert!(Objective::Avg.reduce(&[], 1).is_err());
    }

    #[test]
    fn objective_names() {
        for o in [Objective::MaxAvg, Objective::Avg, Objective::Max] {
            assert_eq!(o.to_string().parse::<Objective>().unwrap(), o);
        }
        assert!("median".parse::<Objective>().is_err());
    }
}
