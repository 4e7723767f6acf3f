use nalgebra::DVector;

use crate::error::{NesError, NesResult};

// ---------------------------------------------------------------------------
// First-order ODE systems
// ---------------------------------------------------------------------------

/// A first-order system ẋ = f(x) of fixed dimension.
pub trait OdeSystem {
    fn dimension(&self) -> usize;

    /// Write f(state) into `out`. Both have length `dimension()`.
    fn derivatives(&self, state: &DVector<f64>, out: &mut DVector<f64>);
}

/// Boxed per-dimension derivative function.
pub type DerivativeFn = Box<dyn Fn(&DVector<f64>) -> f64>;

/// A system given as one scalar function per state dimension.
pub struct FunctionSet {
    funcs: Vec<DerivativeFn>,
}

impl FunctionSet {
    pub fn new(funcs: Vec<DerivativeFn>) -> Self {
        Self { funcs }
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Derivative of dimension `i` alone.
    pub fn eval(&self, i: usize, state: &DVector<f64>) -> f64 {
        (self.funcs[i])(state)
    }
}

impl OdeSystem for FunctionSet {
    fn dimension(&self) -> usize {
        self.funcs.len()
    }

    fn derivatives(&self, state: &DVector<f64>, out: &mut DVector<f64>) {
        for (slot, f) in out.iter_mut().zip(&self.funcs) {
            *slot = f(state);
        }
    }
}

// ---------------------------------------------------------------------------
// Classical 4th-order Runge-Kutta, fixed step
// ---------------------------------------------------------------------------

/// Scratch vectors reused across steps.
struct Stages {
    k1: DVector<f64>,
    k2: DVector<f64>,
    k3: DVector<f64>,
    k4: DVector<f64>,
    tmp: DVector<f64>,
}

impl Stages {
    fn new(dim: usize) -> Self {
        Self {
            k1: DVector::zeros(dim),
            k2: DVector::zeros(dim),
            k3: DVector::zeros(dim),
            k4: DVector::zeros(dim),
            tmp: DVector::zeros(dim),
        }
    }
}

/// Single RK4 step: advance `state` in place by `h`.
fn rk4_step_into<S: OdeSystem + ?Sized>(
    system: &S,
    state: &mut DVector<f64>,
    h: f64,
    s: &mut Stages,
) {
    system.derivatives(&*state, &mut s.k1);
    s.k1 *= h;

    s.tmp.copy_from(&*state);
    s.tmp.axpy(0.5, &s.k1, 1.0);
    system.derivatives(&s.tmp, &mut s.k2);
    s.k2 *= h;

    s.tmp.copy_from(&*state);
    s.tmp.axpy(0.5, &s.k2, 1.0);
    system.derivatives(&s.tmp, &mut s.k3);
    s.k3 *= h;

    s.tmp.copy_from(&*state);
    s.tmp += &s.k3;
    system.derivatives(&s.tmp, &mut s.k4);
    s.k4 *= h;

    for i in 0..state.len() {
        state[i] += (s.k1[i] + 2.0 * s.k2[i] + 2.0 * s.k3[i] + s.k4[i]) / 6.0;
    }
}

/// Single RK4 step returning the advanced state.
pub fn rk4_step<S: OdeSystem + ?Sized>(system: &S, state: &DVector<f64>, h: f64) -> DVector<f64> {
    let mut next = state.clone();
    let mut stages = Stages::new(state.len());
    rk4_step_into(system, &mut next, h, &mut stages);
    next
}

/// Fixed-step RK4 driver over a pre-sized number of steps.
pub struct Rk4<'a, S: OdeSystem + ?Sized> {
    system: &'a S,
    step_size: f64,
    num_steps: usize,
}

impl<'a, S: OdeSystem + ?Sized> Rk4<'a, S> {
    pub fn new(system: &'a S, step_size: f64, num_steps: usize) -> NesResult<Self> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(NesError::validation(format!(
                "Integration step size must be positive, got {step_size}"
            )));
        }
        Ok(Self { system, step_size, num_steps })
    }

    pub fn dimension(&self) -> usize {
        self.system.dimension()
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Advance `state` in place through all steps.
    pub fn integrate(&self, state: &mut DVector<f64>) -> NesResult<()> {
        self.integrate_with(state, |_| Ok(()))
    }

    /// Advance `state`, calling `on_step` before the first step and after
    /// every step (`num_steps + 1` calls). An error from `on_step` stops the
    /// integration and is returned.
    pub fn integrate_with<F>(&self, state: &mut DVector<f64>, mut on_step: F) -> NesResult<()>
    where
        F: FnMut(&DVector<f64>) -> NesResult<()>,
    {
        let dim = self.system.dimension();
        if state.len() != dim {
            return Err(NesError::validation(format!(
                "State has {} entries, system expects {dim}",
                state.len()
            )));
        }

        let mut stages = Stages::new(dim);
        on_step(&*state)?;
        for _ in 0..self.num_steps {
            rk4_step_into(self.system, state, self.step_size, &mut stages);
            on_step(&*state)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// ẋ = v, v̇ = -ω²x
    struct Harmonic {
        omega: f64,
    }

    impl OdeSystem for Harmonic {
        fn dimension(&self) -> usize {
            2
        }

        fn derivatives(&self, state: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = state[1];
            out[1] = -self.omega * self.omega * state[0];
        }
    }

    fn zero_set(dim: usize) -> FunctionSet {
        FunctionSet::new((0..dim).map(|_| Box::new(|_: &DVector<f64>| 0.0) as DerivativeFn).collect())
    }

    #[test]
    fn zero_forcing_keeps_zero_state() {
        let set = zero_set(5);
        let rk = Rk4::new(&set, 0.01, 1000).unwrap();
        let mut state = DVector::zeros(5);
        rk.integrate(&mut state).unwrap();
        assert!(state.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn callback_fires_steps_plus_one_times() {
        let set = zero_set(3);
        let rk = Rk4::new(&set, 0.1, 7).unwrap();
        let mut state = DVector::zeros(3);
        let mut calls = 0;
        rk.integrate_with(&mut state, |_| {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 8);
    }

    #[test]
    fn integration_is_deterministic() {
        let sys = Harmonic { omega: 3.0 };
        let rk = Rk4::new(&sys, 1e-3, 2000).unwrap();
        let run = || {
            let mut state = DVector::from_vec(vec![1.0, 0.0]);
            let mut traj = Vec::new();
            rk.integrate_with(&mut state, |s| {
                traj.push(s.clone());
                Ok(())
            })
            .unwrap();
            traj
        };
        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            for (p, q) in x.iter().zip(y.iter()) {
                assert_eq!(p.to_bits(), q.to_bits());
            }
        }
    }

    #[test]
    fn harmonic_oscillator_accuracy() {
        let omega = 2.0;
        let sys = Harmonic { omega };
        let period = 2.0 * std::f64::consts::PI / omega;
        let steps = 10_000;
        let rk = Rk4::new(&sys, period / steps as f64, steps).unwrap();
        let mut state = DVector::from_vec(vec![1.0, 0.0]);
        rk.integrate(&mut state).unwrap();
        assert!((state[0] - 1.0).abs() < 1e-10, "x(T) = {}", state[0]);
        assert!(state[1].abs() < 1e-9, "v(T) = {}", state[1]);
    }

    #[test]
    fn time_accumulator_counts_steps() {
        let set = FunctionSet::new(vec![Box::new(|_: &DVector<f64>| 1.0) as DerivativeFn]);
        let rk = Rk4::new(&set, 0.25, 8).unwrap();
        let mut state = DVector::zeros(1);
        rk.integrate(&mut state).unwrap();
        assert!((state[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn single_step_matches_driver() {
        let sys = Harmonic { omega: 1.5 };
        let start = DVector::from_vec(vec![0.3, -0.2]);
        let stepped = rk4_step(&sys, &start, 0.01);
        let mut state = start.clone();
        Rk4::new(&sys, 0.01, 1).unwrap().integrate(&mut state).unwrap();
        assert_eq!(stepped, state);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let set = zero_set(4);
        let rk = Rk4::new(&set, 0.1, 1).unwrap();
        let mut state = DVector::zeros(3);
        assert!(matches!(rk.integrate(&mut state), Err(NesError::Validation(_))));
    }

    #[test]
    fn non_positive_step_is_rejected() {
        let set = zero_set(1);
        assert!(Rk4::new(&set, 0.0, 1).is_err());
        assert!(Rk4::new(&set, f64::NAN, 1).is_err());
    }

    #[test]
    fn callback_error_stops_integration() {
        let set = zero_set(2);
        let rk = Rk4::new(&set, 0.1, 100).unwrap();
        let mut state = DVector::zeros(2);
        let mut calls = 0;
        let res = rk.integrate_with(&mut state, |_| {
            calls += 1;
            if calls == 3 {
                Err(NesError::consistency("stop"))
            } else {
                Ok(())
            }
        });
        assert!(res.is_err());
        assert_eq!(calls, 3);
    }
}
