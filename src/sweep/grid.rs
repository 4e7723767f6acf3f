use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{NesError, NesResult};

// ---------------------------------------------------------------------------
// Grid keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    MassRatio,
    StiffnessRatio,
    DampingRatio,
}

impl Parameter {
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::MassRatio => "mr",
            Self::StiffnessRatio => "kr",
            Self::DampingRatio => "cr",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "mr" => Some(Self::MassRatio),
            "kr" => Some(Self::StiffnessRatio),
            "cr" => Some(Self::DampingRatio),
            _ => None,
        }
    }
}

/// `mr2` -> (MassRatio, 2). `None` for anything else, including signed or
/// zero-padded indices such as `kr+1` and `kr01`.
fn parse_key(key: &str) -> Option<(Parameter, usize)> {
    let prefix = key.get(..2)?;
    let digits = key.get(2..)?;
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
    {
        return None;
    }
    let index = digits.parse::<usize>().ok()?;
    Some((Parameter::from_prefix(prefix)?, index))
}

// ---------------------------------------------------------------------------
// Value lists
// ---------------------------------------------------------------------------

/// Longest list a range line may expand to.
pub const MAX_RANGE_VALUES: usize = 10_000_000;

/// `start, start+step, ...` up to `end`, inclusive within step·1e-8.
fn expand_range(key: &str, start: f64, end: f64, step: f64) -> NesResult<Vec<f64>> {
    let count = (end - start) / step;
    if !(count <= MAX_RANGE_VALUES as f64) {
        return Err(NesError::validation(format!(
            "{key} range {start} {end} {step} expands past {MAX_RANGE_VALUES} values"
        )));
    }
    let limit = end + step * 1e-8;
    let mut values = Vec::with_capacity(count as usize + 1);
    let mut i = 0usize;
    loop {
        let v = start + i as f64 * step;
        if v > limit {
            break;
        }
        values.push(v);
        i += 1;
    }
    Ok(values)
}

/// Three numbers a b c with b above both a and c (and c positive) are read
/// as a range; anything else is an explicit list.
fn expand_values(key: &str, values: Vec<f64>) -> NesResult<Vec<f64>> {
    if let &[a, b, c] = values.as_slice() {
        if b > a && b > c && c > 0.0 {
            return expand_range(key, a, b, c);
        }
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Sweep grid
// ---------------------------------------------------------------------------

/// Candidate values per absorber. The last absorber has no mass-ratio list;
/// its mass ratio is whatever remains of the total.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    absorbers: usize,
    mass: Vec<Vec<f64>>,       // absorbers - 1 entries
    stiffness: Vec<Vec<f64>>,  // absorbers entries
    damping: Vec<Vec<f64>>,    // absorbers entries
}

impl SweepGrid {
    pub fn new(
        mass: Vec<Vec<f64>>,
        stiffness: Vec<Vec<f64>>,
        damping: Vec<Vec<f64>>,
    ) -> NesResult<Self> {
        let absorbers = stiffness.len();
        if absorbers == 0 {
            return Err(NesError::validation("Sweep needs at least one absorber"));
        }
        if damping.len() != absorbers || mass.len() + 1 != absorbers {
            return Err(NesError::validation(format!(
                "Grid sizes do not match: {} mass, {} stiffness, {} damping lists",
                mass.len(),
                stiffness.len(),
                damping.len()
            )));
        }
        let grid = Self { absorbers, mass, stiffness, damping };
        for (key, values) in grid.keys() {
            check_list(&key, values)?;
        }
        Ok(grid)
    }

    pub fn from_file(path: &Path, absorbers: usize) -> NesResult<Self> {
        let file = File::open(path).map_err(|e| {
            NesError::configuration(format!("Can not open sweep grid {}: {e}", path.display()))
        })?;
        Self::parse(BufReader::new(file), absorbers)
    }

    /// Read `key v1 v2 ...` lines for `absorbers` absorbers. Blank lines,
    /// `#` comments and lines without values are skipped.
    pub fn parse<R: BufRead>(reader: R, absorbers: usize) -> NesResult<Self> {
        if absorbers == 0 {
            return Err(NesError::validation("Sweep needs at least one absorber"));
        }
        let mut mass: Vec<Option<Vec<f64>>> = vec![None; absorbers - 1];
        let mut stiffness: Vec<Option<Vec<f64>>> = vec![None; absorbers];
        let mut damping: Vec<Option<Vec<f64>>> = vec![None; absorbers];

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else { continue };
            let tokens: Vec<&str> = tokens.collect();
            if tokens.is_empty() {
                continue;
            }

            let (param, index) = parse_key(key).ok_or_else(|| {
                NesError::validation(format!("Invalid key '{key}' in line {line_number}"))
            })?;
            let values = tokens
                .iter()
                .map(|t| t.parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| {
                    NesError::validation(format!("Invalid value for {key} in line {line_number}"))
                })?;

            let slots = match param {
                Parameter::MassRatio => &mut mass,
                Parameter::StiffnessRatio => &mut stiffness,
                Parameter::DampingRatio => &mut damping,
            };
            if index == 0 || index > slots.len() {
                return Err(NesError::validation(format!(
                    "Key {key} in line {line_number} is out of range 1..={}",
                    slots.len()
                )));
            }
            let slot = &mut slots[index - 1];
            if slot.is_some() {
                return Err(NesError::validation(format!(
                    "Duplicate key {key} in line {line_number}"
                )));
            }
            let values = expand_values(key, values)?;
            check_list(key, &values)?;
            *slot = Some(values);
        }

        Self::new(
            require(Parameter::MassRatio, mass)?,
            require(Parameter::StiffnessRatio, stiffness)?,
            require(Parameter::DampingRatio, damping)?,
        )
    }

    pub fn absorbers(&self) -> usize {
        self.absorbers
    }

    /// Mass-ratio lists of absorbers 1..N-1.
    pub fn mass(&self) -> &[Vec<f64>] {
        &self.mass
    }

    pub fn stiffness(&self) -> &[Vec<f64>] {
        &self.stiffness
    }

    pub fn damping(&self) -> &[Vec<f64>] {
        &self.damping
    }

    /// All (key, values) pairs in mr, kr, cr order.
    pub fn keys(&self) -> impl Iterator<Item = (String, &Vec<f64>)> + '_ {
        [
            (Parameter::MassRatio, &self.mass),
            (Parameter::StiffnessRatio, &self.stiffness),
            (Parameter::DampingRatio, &self.damping),
        ]
        .into_iter()
        .flat_map(|(param, lists)| {
            lists
                .iter()
                .enumerate()
                .map(move |(i, values)| (format!("{}{}", param.prefix(), i + 1), values))
        })
    }

    /// Print every resolved list, one key per line.
    pub fn describe<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        for (key, values) in self.keys() {
            write!(writer, "{key:<4} ({:>3})", values.len())?;
            for v in values {
                write!(writer, " {v}")?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

fn require(param: Parameter, slots: Vec<Option<Vec<f64>>>) -> NesResult<Vec<Vec<f64>>> {
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| {
                NesError::validation(format!("Missing key {}{}", param.prefix(), i + 1))
            })
        })
        .collect()
}

fn check_list(key: &str, values: &[f64]) -> NesResult<()> {
    if values.is_empty() {
        return Err(NesError::validation(format!("{key} has no values")));
    }
    if let Some(v) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
        return Err(NesError::validation(format!("{key} has invalid value {v}")));
    }
    if values.windows(2).any(|w| w[1] < w[0]) {
        return Err(NesError::validation(format!("{key} values must be ascending")));
    }
    Ok(())
}
