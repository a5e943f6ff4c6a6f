//! Bounded non-linear least squares (Levenberg–Marquardt).
//!
//! The solver minimizes `Σ r_i(p)²` for a residual function over named
//! [`Parameters`]. Each parameter has an initial value, optional bounds and a
//! `vary` flag.
//!
//! Bounds are enforced by optimizing unconstrained internal variables `u` and
//! mapping them to the external values (MINUIT-style):
//!
//! ```text
//! both bounds:  x = min + (sin u + 1)(max − min)/2
//! lower only:   x = min − 1 + sqrt(u² + 1)
//! upper only:   x = max + 1 − sqrt(u² + 1)
//! ```
//!
//! Each iteration builds a forward-difference Jacobian in `u` and solves the
//! damped step `[J; sqrt(λ)·S] δ = [−r; 0]` (Marquardt scaling
//! `S = diag(sqrt(diag(JᵀJ)))`) with the SVD least squares solver. The damping
//! `λ` is divided by 10 after an accepted step and multiplied by 10 after a
//! rejected one.
//!
//! The step test is made on the scaled norm `‖S·δ‖ ≤ xtol·‖S·u‖`, so
//! parameters of very different magnitude (D in V²/s next to f3dB in Hz)
//! count by their effect on the residuals.
//!
//! Standard errors come from `inv(JᵀJ)` scaled by the reduced chi-square and
//! mapped back through `dx/du`. A run that stops without converging still
//! returns its result with `success = false`. [`LmStatus`] tells why the
//! solver stopped; it says nothing about the quality of the fit, which is
//! judged from the reduced chi-square.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::ols::{invert_normal_matrix, solve_least_squares};

/// One named fit parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub vary: bool,
    /// Standard error after a fit (varying parameters only).
    pub stderr: Option<f64>,
}

/// Ordered collection of named parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    params: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a parameter with bounds.
    pub fn add(&mut self, name: &str, value: f64, min: f64, max: f64, vary: bool) -> Result<(), AppError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(AppError::input(format!(
                "Invalid bounds for parameter '{name}': [{min}, {max}]."
            )));
        }
        if !value.is_finite() {
            return Err(AppError::input(format!(
                "Initial value of parameter '{name}' is not finite."
            )));
        }
        let param = Parameter {
            name: name.to_string(),
            value: value.clamp(min, max),
            min,
            max,
            vary,
            stderr: None,
        };
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    /// Current value of a parameter.
    pub fn value(&self, name: &str) -> Result<f64, AppError> {
        self.get(name)
            .map(|p| p.value)
            .ok_or_else(|| AppError::input(format!("Unknown fit parameter '{name}'.")))
    }

    /// Standard error of a parameter (NaN when not available).
    pub fn stderr(&self, name: &str) -> f64 {
        self.get(name).and_then(|p| p.stderr).unwrap_or(f64::NAN)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn n_varying(&self) -> usize {
        self.params.iter().filter(|p| p.vary).count()
    }
}

/// Solver tolerances and limits.
#[derive(Debug, Clone)]
pub struct LmOptions {
    /// Relative reduction of chi-square below which the fit has converged.
    pub ftol: f64,
    /// Relative step size below which the fit has converged.
    pub xtol: f64,
    /// Gradient magnitude below which the fit has converged.
    pub gtol: f64,
    /// Defaults to `2000 · (n_varying + 1)`.
    pub max_nfev: Option<usize>,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 0.0,
            max_nfev: None,
        }
    }
}

/// Why [`minimize`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LmStatus {
    NoVarying,
    ExactFit,
    /// Relative reduction of chi-square at most `ftol`.
    Ftol,
    /// Scaled step at most `xtol`.
    Xtol,
    Gtol,
    /// No damped step reduces chi-square any more.
    Stalled,
    MaxNfev,
    SingularStep,
}

impl LmStatus {
    /// Stopped at a (local) minimum rather than on a limit.
    pub fn converged(self) -> bool {
        !matches!(self, LmStatus::MaxNfev | LmStatus::SingularStep)
    }
}

/// Outcome of [`minimize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimizerResult {
    pub params: Parameters,
    pub residual: Vec<f64>,
    pub chisqr: f64,
    pub redchi: f64,
    pub ndata: usize,
    pub nvarys: usize,
    pub nfree: usize,
    pub nfev: usize,
    pub success: bool,
    pub status: LmStatus,
    pub message: String,
    /// Covariance of the varying parameters (external values), in their order.
    #[serde(skip)]
    pub covar: Option<DMatrix<f64>>,
}

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e16;

/// Minimize the sum of squared residuals returned by `residual`.
pub fn minimize<F>(residual: F, params: &Parameters, options: &LmOptions) -> Result<MinimizerResult, AppError>
where
    F: Fn(&Parameters) -> Vec<f64>,
{
    let mut problem = Problem::new(&residual, params.clone());
    let mut u = problem.initial_internal();
    let nvarys = u.len();

    let mut r = problem.eval(&u);
    let ndata = r.len();
    if ndata == 0 {
        return Err(AppError::insufficient("Residual function returned no data."));
    }
    if ndata < nvarys {
        return Err(AppError::insufficient(format!(
            "Fewer data points ({ndata}) than varying parameters ({nvarys})."
        )));
    }
    let mut chi2 = r.norm_squared();
    if !chi2.is_finite() {
        return Err(AppError::numerical(
            "Residuals are not finite at the initial parameter values.",
        ));
    }

    let max_nfev = options.max_nfev.unwrap_or(2000 * (nvarys + 1));
    let mut lambda = LAMBDA_INIT;
    let mut status = LmStatus::NoVarying;
    let mut message = "No varying parameters.".to_string();

    'outer: while nvarys > 0 {
        if problem.nfev >= max_nfev {
            status = LmStatus::MaxNfev;
            message = format!("Maximum number of function evaluations ({max_nfev}) exceeded.");
            break;
        }
        let jac = problem.jacobian(&u, &r);
        let jtj = jac.transpose() * &jac;
        let grad = jac.transpose() * &r;
        if grad.amax() <= options.gtol {
            status = LmStatus::Gtol;
            message = "Gradient below tolerance.".to_string();
            break;
        }
        let scale = jtj.diagonal().map(|d| if d > 0.0 { d.sqrt() } else { 1.0 });

        loop {
            if problem.nfev >= max_nfev {
                status = LmStatus::MaxNfev;
                message = format!("Maximum number of function evaluations ({max_nfev}) exceeded.");
                break 'outer;
            }

            let step = damped_step(&jac, &r, &scale, lambda);
            let Some(step) = step else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    status = LmStatus::SingularStep;
                    message = "Damped step could not be solved.".to_string();
                    break 'outer;
                }
                continue;
            };

            let u_trial = &u + &step;
            let r_trial = problem.eval(&u_trial);
            let chi2_trial = r_trial.norm_squared();

            if chi2_trial.is_finite() && chi2_trial < chi2 {
                let reduction = (chi2 - chi2_trial) / chi2;
                let step_norm = step.component_mul(&scale).norm();
                let x_norm = u.component_mul(&scale).norm();
                let small_step = step_norm <= options.xtol * (x_norm + options.xtol);
                u = u_trial;
                r = r_trial;
                chi2 = chi2_trial;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);

                if chi2 == 0.0 {
                    status = LmStatus::ExactFit;
                    message = "Exact fit.".to_string();
                    break 'outer;
                }
                if reduction <= options.ftol {
                    status = LmStatus::Ftol;
                    message = "Relative reduction of chi-square is at most ftol.".to_string();
                    break 'outer;
                }
                if small_step {
                    status = LmStatus::Xtol;
                    message = "Relative change of the parameters is at most xtol.".to_string();
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No direction reduces chi-square: local minimum.
                status = LmStatus::Stalled;
                message = "Chi-square cannot be reduced any further.".to_string();
                break 'outer;
            }
        }
    }

    let success = status.converged();
    problem.set_internal(&u);
    let nfree = ndata - nvarys;
    let redchi = if nfree > 0 { chi2 / nfree as f64 } else { f64::NAN };

    let covar = if nvarys > 0 {
        problem.covariance(&u, &r, redchi)
    } else {
        None
    };
    if let Some(covar) = &covar {
        for (k, &i) in problem.varying.iter().enumerate() {
            let var = covar[(k, k)];
            problem.params.params[i].stderr = if var >= 0.0 { Some(var.sqrt()) } else { None };
        }
    }

    tracing::debug!(
        nfev = problem.nfev,
        chisqr = chi2,
        redchi,
        ?status,
        "{message}"
    );

    Ok(MinimizerResult {
        nfev: problem.nfev,
        params: problem.params,
        residual: r.iter().copied().collect(),
        chisqr: chi2,
        redchi,
        ndata,
        nvarys,
        nfree,
        success,
        status,
        message,
        covar,
    })
}

fn damped_step(jac: &DMatrix<f64>, r: &DVector<f64>, scale: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let (n, p) = jac.shape();
    let mut a = DMatrix::<f64>::zeros(n + p, p);
    let mut b = DVector::<f64>::zeros(n + p);
    a.view_mut((0, 0), (n, p)).copy_from(jac);
    for j in 0..p {
        a[(n + j, j)] = lambda.sqrt() * scale[j];
    }
    for i in 0..n {
        b[i] = -r[i];
    }
    solve_least_squares(&a, &b)
}

/// Mapping between an external (bounded) value and its internal variable.
#[derive(Debug, Clone, Copy)]
enum BoundTransform {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl BoundTransform {
    fn new(min: f64, max: f64) -> Self {
        match (min.is_finite(), max.is_finite()) {
            (true, true) => BoundTransform::Both(min, max),
            (true, false) => BoundTransform::Lower(min),
            (false, true) => BoundTransform::Upper(max),
            (false, false) => BoundTransform::Free,
        }
    }

    fn to_internal(self, x: f64) -> f64 {
        match self {
            BoundTransform::Free => x,
            BoundTransform::Lower(min) => {
                let d = (x - min).max(0.0);
                (d * (d + 2.0)).sqrt()
            }
            BoundTransform::Upper(max) => {
                let d = (max - x).max(0.0);
                (d * (d + 2.0)).sqrt()
            }
            BoundTransform::Both(min, max) => (2.0 * (x - min) / (max - min) - 1.0).clamp(-1.0, 1.0).asin(),
        }
    }

    fn to_external(self, u: f64) -> f64 {
        // sqrt(u² + 1) − 1 written without cancellation.
        let lift = |u: f64| u * u / (1.0 + (u * u + 1.0).sqrt());
        match self {
            BoundTransform::Free => u,
            BoundTransform::Lower(min) => min + lift(u),
            BoundTransform::Upper(max) => max - lift(u),
            BoundTransform::Both(min, max) => min + (u.sin() + 1.0) * (max - min) / 2.0,
        }
    }

    /// `dx/du`
    fn derivative(self, u: f64) -> f64 {
        match self {
            BoundTransform::Free => 1.0,
            BoundTransform::Lower(_) => u / (u * u + 1.0).sqrt(),
            BoundTransform::Upper(_) => -u / (u * u + 1.0).sqrt(),
            BoundTransform::Both(min, max) => u.cos() * (max - min) / 2.0,
        }
    }
}

struct Problem<'a, F> {
    residual: &'a F,
    params: Parameters,
    varying: Vec<usize>,
    transforms: Vec<BoundTransform>,
    nfev: usize,
}

impl<'a, F> Problem<'a, F>
where
    F: Fn(&Parameters) -> Vec<f64>,
{
    fn new(residual: &'a F, params: Parameters) -> Self {
        let varying: Vec<usize> = params
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.vary)
            .map(|(i, _)| i)
            .collect();
        let transforms = varying
            .iter()
            .map(|&i| BoundTransform::new(params.params[i].min, params.params[i].max))
            .collect();
        Self {
            residual,
            params,
            varying,
            transforms,
            nfev: 0,
        }
    }

    fn initial_internal(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.varying.len(),
            self.varying
                .iter()
                .zip(&self.transforms)
                .map(|(&i, t)| t.to_internal(self.params.params[i].value)),
        )
    }

    fn set_internal(&mut self, u: &DVector<f64>) {
        for (k, &i) in self.varying.iter().enumerate() {
            self.params.params[i].value = self.transforms[k].to_external(u[k]);
        }
    }

    fn eval(&mut self, u: &DVector<f64>) -> DVector<f64> {
        self.set_internal(u);
        self.nfev += 1;
        DVector::from_vec((self.residual)(&self.params))
    }

    /// Forward-difference Jacobian of the residuals in internal variables.
    fn jacobian(&mut self, u: &DVector<f64>, r0: &DVector<f64>) -> DMatrix<f64> {
        let n = r0.len();
        let p = u.len();
        let sqrt_eps = f64::EPSILON.sqrt();
        let mut jac = DMatrix::<f64>::zeros(n, p);
        let mut shifted = u.clone();

        for j in 0..p {
            let h = if u[j] == 0.0 { sqrt_eps } else { sqrt_eps * u[j].abs() };
            shifted[j] = u[j] + h;
            let r = self.eval(&shifted);
            shifted[j] = u[j];
            if r.len() != n {
                continue;
            }
            for i in 0..n {
                let d = (r[i] - r0[i]) / h;
                jac[(i, j)] = if d.is_finite() { d } else { 0.0 };
            }
        }
        self.set_internal(u);
        jac
    }

    fn covariance(&mut self, u: &DVector<f64>, r: &DVector<f64>, redchi: f64) -> Option<DMatrix<f64>> {
        let jac = self.jacobian(u, r);
        let jtj = jac.transpose() * &jac;
        let inv = invert_normal_matrix(&jtj)?;
        let grad: Vec<f64> = self
            .transforms
            .iter()
            .zip(u.iter())
            .map(|(t, &ui)| t.derivative(ui))
            .collect();
        let p = grad.len();
        Some(DMatrix::from_fn(p, p, |i, j| inv[(i, j)] * grad[i] * grad[j] * redchi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay_data() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.25).collect();
        let y = x.iter().map(|&t| 3.0 * (-0.7 * t).exp() + 0.5).collect();
        (x, y)
    }

    #[test]
    fn recovers_exponential_decay() {
        let (x, y) = decay_data();
        let mut params = Parameters::new();
        params.add("amp", 1.0, f64::NEG_INFINITY, f64::INFINITY, true).unwrap();
        params.add("rate", 0.2, 0.0, f64::INFINITY, true).unwrap();
        params.add("offset", 0.0, -10.0, 10.0, true).unwrap();

        let result = minimize(
            |p: &Parameters| {
                let amp = p.value("amp").unwrap();
                let rate = p.value("rate").unwrap();
                let offset = p.value("offset").unwrap();
                x.iter()
                    .zip(&y)
                    .map(|(&t, &yi)| amp * (-rate * t).exp() + offset - yi)
                    .collect()
            },
            &params,
            &LmOptions::default(),
        )
        .unwrap();

        assert!(result.success, "{}", result.message);
        assert!(result.status.converged());
        assert!((result.params.value("amp").unwrap() - 3.0).abs() < 1e-6);
        assert!((result.params.value("rate").unwrap() - 0.7).abs() < 1e-6);
        assert!((result.params.value("offset").unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(result.nfree, 37);
        assert!(result.chisqr < 1e-12);
    }

    #[test]
    fn respects_bounds_and_fixed_parameters() {
        let (x, y) = decay_data();
        let mut params = Parameters::new();
        params.add("amp", 1.0, 0.0, 2.0, true).unwrap();
        params.add("rate", 0.7, 0.0, f64::INFINITY, false).unwrap();
        params.add("offset", 0.0, f64::NEG_INFINITY, f64::INFINITY, true).unwrap();

        let result = minimize(
            |p: &Parameters| {
                let amp = p.value("amp").unwrap();
                let rate = p.value("rate").unwrap();
                let offset = p.value("offset").unwrap();
                x.iter()
                    .zip(&y)
                    .map(|(&t, &yi)| amp * (-rate * t).exp() + offset - yi)
                    .collect()
            },
            &params,
            &LmOptions::default(),
        )
        .unwrap();

        let amp = result.params.value("amp").unwrap();
        assert!(amp <= 2.0 && amp > 1.9, "amp = {amp}");
        assert_eq!(result.params.value("rate").unwrap(), 0.7);
        assert!(result.params.get("rate").unwrap().stderr.is_none());
        assert_eq!(result.nvarys, 2);
    }

    #[test]
    fn noisy_linear_fit_reports_standard_errors() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        // Deterministic ±0.1 alternation around y = 1 + 2x.
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &t)| 1.0 + 2.0 * t + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let mut params = Parameters::new();
        params.add("a", 0.0, f64::NEG_INFINITY, f64::INFINITY, true).unwrap();
        params.add("b", 1.0, f64::NEG_INFINITY, f64::INFINITY, true).unwrap();

        let result = minimize(
            |p: &Parameters| {
                let a = p.value("a").unwrap();
                let b = p.value("b").unwrap();
                x.iter().zip(&y).map(|(&t, &yi)| a + b * t - yi).collect()
            },
            &params,
            &LmOptions::default(),
        )
        .unwrap();

        assert!((result.params.value("b").unwrap() - 2.0).abs() < 1e-3);
        let err_b = result.params.stderr("b");
        assert!(err_b > 0.0 && err_b < 1e-2, "err_b = {err_b}");
    }

    #[test]
    fn mixed_magnitudes_do_not_stop_early() {
        // Amplitude ~1e-6 next to a corner ~1e4 in the same parameter vector.
        let x: Vec<f64> = (1..=200).map(|i| f64::from(i) * 100.0).collect();
        let y: Vec<f64> = x.iter().map(|&t| 2e-6 / (1.0 + (t / 3000.0).powi(2))).collect();
        let mut params = Parameters::new();
        params.add("amp", 1e-6, 0.0, f64::INFINITY, true).unwrap();
        params.add("corner", 1e4, 0.0, f64::INFINITY, true).unwrap();

        let result = minimize(
            |p: &Parameters| {
                let amp = p.value("amp").unwrap();
                let corner = p.value("corner").unwrap();
                x.iter()
                    .zip(&y)
                    .map(|(&t, &yi)| (amp / (1.0 + (t / corner).powi(2)) - yi) / yi)
                    .collect()
            },
            &params,
            &LmOptions::default(),
        )
        .unwrap();

        assert!(result.status.converged(), "{:?}", result.status);
        assert_ne!(result.status, LmStatus::MaxNfev);
        assert!((result.params.value("amp").unwrap() / 2e-6 - 1.0).abs() < 1e-6);
        assert!((result.params.value("corner").unwrap() / 3000.0 - 1.0).abs() < 1e-6);
        assert!(result.chisqr < 1e-12);
    }

    #[test]
    fn evaluation_limit_is_not_convergence() {
        let (x, y) = decay_data();
        let mut params = Parameters::new();
        params.add("amp", 1.0, f64::NEG_INFINITY, f64::INFINITY, true).unwrap();
        params.add("rate", 0.2, 0.0, f64::INFINITY, true).unwrap();
        let options = LmOptions {
            max_nfev: Some(4),
            ..LmOptions::default()
        };
        let result = minimize(
            |p: &Parameters| {
                let amp = p.value("amp").unwrap();
                let rate = p.value("rate").unwrap();
                x.iter().zip(&y).map(|(&t, &yi)| amp * (-rate * t).exp() + 0.5 - yi).collect()
            },
            &params,
            &options,
        )
        .unwrap();
        assert_eq!(result.status, LmStatus::MaxNfev);
        assert!(!result.success);
    }

    #[test]
    fn bound_transforms_round_trip() {
        for t in [
            BoundTransform::Lower(0.0),
            BoundTransform::Upper(5.0),
            BoundTransform::Both(0.0, 1e7),
            BoundTransform::Free,
        ] {
            for x in [1e-6_f64, 0.5, 3.0, 800.0] {
                let x = match t {
                    BoundTransform::Upper(max) => max - x.min(4.0),
                    _ => x,
                };
                let back = t.to_external(t.to_internal(x));
                assert!((back - x).abs() <= 1e-8 * x.abs().max(1.0), "{t:?}: {x} -> {back}");
            }
        }
    }

    #[test]
    fn empty_residual_is_an_error() {
        let mut params = Parameters::new();
        params.add("a", 1.0, f64::NEG_INFINITY, f64::INFINITY, true).unwrap();
        let err = minimize(|_: &Parameters| Vec::new(), &params, &LmOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
