use std::io::{self, Write};

use nalgebra::DVector;

/// Write one state as a trajectory line: every entry in scientific notation
/// with 10 digits after the point, each followed by a tab.
pub fn write_state<W: Write + ?Sized>(writer: &mut W, state: &DVector<f64>) -> io::Result<()> {
    for x in state.iter() {
        write!(writer, "{:.10e}\t", x)?;
    }
    writeln!(writer)
}

/// Write a whole trajectory, one state per line.
pub fn write_trajectory<W: Write + ?Sized>(
    writer: &mut W,
    trajectory: &[DVector<f64>],
) -> io::Result<()> {
    for state in trajectory {
        write_state(writer, state)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_has_one_field_per_entry() {
        let mut buf = Vec::new();
        write_state(&mut buf, &DVector::from_vec(vec![0.0, 1.5, -0.00125])).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert_eq!(line, "0.0000000000e0\t1.5000000000e0\t-1.2500000000e-3\t\n");
    }

    #[test]
    fn fields_parse_back() {
        let states = vec![
            DVector::from_vec(vec![0.0, 0.001_234_567_89]),
            DVector::from_vec(vec![0.01, -3.2e-5]),
        ];
        let mut buf = Vec::new();
        write_trajectory(&mut buf, &states).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        let v: f64 = text.lines().next().unwrap().split('\t').nth(1).unwrap().parse().unwrap();
        assert!((v - 0.001_234_567_89).abs() < 1e-15);
    }
}
