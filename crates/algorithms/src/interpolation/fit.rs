//! Covariance model fitting
//!
//! Fits a geodesic covariance family to an empirical variogram by
//! minimizing a robust loss of the residuals r = γ_model(h) − γ_emp(h):
//! ```text
//! Cauchy:  ρ(r) = f²·ln(1 + (r/f)²)
//! SoftL1:  ρ(r) = 2f²·(sqrt(1 + (r/f)²) − 1)
//! Linear:  ρ(r) = r²
//! ```
//! The nugget is fixed at zero. Variance, length scale and (when the
//! family has one) the shape parameter are free.
//!
//! A coarse grid search seeds a Nelder–Mead simplex that runs in an
//! unconstrained space: each parameter is mapped from ℝ onto its bounds by
//! a logistic curve (on a log axis for variance and length scale).
//!
//! Reference:
//! Cressie, N. (1985). Fitting variogram models by weighted least squares.
//! Mathematical Geology.
//! Nelder, J.A. & Mead, R. (1965). A simplex method for function
//! minimization. The Computer Journal.

use geokrig_core::{Error, Result};
use tracing::{debug, warn};

use super::covariance::{CovarianceFamily, CovarianceModel};
use super::normalizer::Normalizer;
use super::variogram::EmpiricalVariogram;

/// Simplex diameter (free coordinates) at which Nelder–Mead stops
const SIMPLEX_TOLERANCE: f64 = 1e-10;

/// Robust loss applied to each bin residual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loss {
    Linear,
    SoftL1,
    #[default]
    Cauchy,
}

impl Loss {
    #[inline]
    fn rho(&self, r: f64, f_scale: f64) -> f64 {
        let z = (r / f_scale).powi(2);
        match self {
            Loss::Linear => r * r,
            Loss::SoftL1 => 2.0 * f_scale * f_scale * ((1.0 + z).sqrt() - 1.0),
            Loss::Cauchy => f_scale * f_scale * z.ln_1p(),
        }
    }
}

/// Parameters for covariance model fitting
#[derive(Debug, Clone)]
pub struct FitParams {
    pub loss: Loss,
    /// Residual scale at which the robust loss departs from least squares
    pub f_scale: f64,
    /// Hold the shape parameter at this value instead of fitting it
    pub fixed_shape: Option<f64>,
    /// Weight bins by their pair count
    pub weighted: bool,
    /// Nelder–Mead iteration cap
    pub max_iterations: usize,
    /// Convergence threshold on the spread of simplex losses
    pub tolerance: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            loss: Loss::Cauchy,
            f_scale: 1.0,
            fixed_shape: None,
            weighted: false,
            max_iterations: 5000,
            tolerance: 1e-14,
        }
    }
}

/// Open interval a parameter is mapped onto.
#[derive(Debug, Clone, Copy)]
struct Bound {
    lo: f64,
    hi: f64,
    log: bool,
}

impl Bound {
    fn to_param(self, t: f64) -> f64 {
        let s = 1.0 / (1.0 + (-t).exp());
        if self.log {
            (self.lo.ln() + (self.hi.ln() - self.lo.ln()) * s).exp()
        } else {
            self.lo + (self.hi - self.lo) * s
        }
    }

    fn to_free(self, p: f64) -> f64 {
        let s = if self.log {
            (p.ln() - self.lo.ln()) / (self.hi.ln() - self.lo.ln())
        } else {
            (p - self.lo) / (self.hi - self.lo)
        };
        let s = s.clamp(1e-9, 1.0 - 1e-9);
        (s / (1.0 - s)).ln()
    }
}

struct Objective<'a> {
    family: CovarianceFamily,
    normalizer: Normalizer,
    bins: Vec<(f64, f64, f64)>,
    bounds: Vec<Bound>,
    fixed_shape: Option<f64>,
    params: &'a FitParams,
}

impl Objective<'_> {
    fn model(&self, free: &[f64]) -> CovarianceModel {
        let variance = self.bounds[0].to_param(free[0]);
        let range = self.bounds[1].to_param(free[1]);
        let shape = match (self.fixed_shape, self.bounds.get(2)) {
            (Some(s), _) => Some(s),
            (None, Some(b)) => Some(b.to_param(free[2])),
            (None, None) => None,
        };
        CovarianceModel::new(self.family, variance, range, shape, self.normalizer)
    }

    fn loss(&self, free: &[f64]) -> f64 {
        let model = self.model(free);
        let total: f64 = self
            .bins
            .iter()
            .map(|&(lag, gamma, w)| w * self.params.loss.rho(model.variogram(lag) - gamma, self.params.f_scale))
            .sum();
        if total.is_finite() { total } else { f64::MAX }
    }
}

/// Fit a geodesic covariance family to an empirical variogram.
///
/// # Arguments
/// * `empirical` — Empirical variogram in the normalized space
/// * `family` — Covariance family from the catalog
/// * `normalizer` — Transform the variogram was computed under; stored on
///   the fitted model
/// * `params` — Loss and optimizer settings
///
/// # Errors
/// `Fit` if the variogram is empty or flat, the optimizer does not converge
/// within `max_iterations`, or the optimum is not a valid (finite,
/// positive) parameter set.
pub fn fit_covariance(
    empirical: &EmpiricalVariogram,
    family: CovarianceFamily,
    normalizer: Normalizer,
    params: &FitParams,
) -> Result<CovarianceModel> {
    let total_pairs: usize = empirical.pair_counts.iter().sum();
    let bins: Vec<(f64, f64, f64)> = empirical
        .lags
        .iter()
        .zip(&empirical.semivariance)
        .zip(&empirical.pair_counts)
        .filter(|((_, g), _)| g.is_finite())
        .map(|((&lag, &g), &cnt)| {
            let w = if params.weighted && total_pairs > 0 {
                cnt as f64 * empirical.pair_counts.len() as f64 / total_pairs as f64
            } else {
                1.0
            };
            (lag, g, w)
        })
        .collect();

    if bins.is_empty() {
        return Err(Error::Fit("Empirical variogram has no valid bins".into()));
    }

    let max_lag = bins.iter().map(|b| b.0).fold(0.0_f64, f64::max);
    let max_sv = bins.iter().map(|b| b.1).fold(0.0_f64, f64::max);
    if max_sv <= 0.0 {
        return Err(Error::Fit("All semivariance values are zero".into()));
    }
    if let (Some(s), Some((lo, hi))) = (params.fixed_shape, family.shape_bounds())
        && !(lo..=hi).contains(&s)
    {
        return Err(Error::Fit(format!(
            "fixed shape {s} outside [{lo}, {hi}] for {family}"
        )));
    }

    let mut bounds = vec![
        Bound { lo: max_sv * 1e-4, hi: max_sv * 1e3, log: true },
        Bound { lo: max_lag * 1e-3, hi: max_lag * 1e3, log: true },
    ];
    let free_shape = params.fixed_shape.is_none() && family.shape_bounds().is_some();
    if let (true, Some((lo, hi))) = (free_shape, family.shape_bounds()) {
        bounds.push(Bound { lo, hi, log: false });
    }

    let objective = Objective {
        family,
        normalizer,
        bins,
        bounds,
        fixed_shape: params.fixed_shape,
        params,
    };

    let start = grid_search(&objective, max_sv, max_lag, free_shape);
    let (best, iterations, converged) = nelder_mead(&objective, &start, params);
    if !converged {
        warn!(family = %family, iterations, "variogram fit hit the iteration cap");
        return Err(Error::Fit(format!(
            "{family} fit did not converge within {iterations} iterations"
        )));
    }

    let mut model = objective.model(&best);
    model.loss = objective.loss(&best);

    let valid = model.variance.is_finite()
        && model.variance > 0.0
        && model.range.is_finite()
        && model.range > 0.0
        && model.shape.is_none_or(|s| s.is_finite())
        && model.loss < f64::MAX;
    if !valid {
        return Err(Error::Fit(format!("optimizer ended at invalid parameters: {model}")));
    }

    debug!(%model, loss = model.loss, iterations, "fitted covariance model");
    Ok(model)
}

/// Coarse search over the physical parameter space. Returns the best point
/// in free coordinates.
fn grid_search(obj: &Objective<'_>, max_sv: f64, max_lag: f64, free_shape: bool) -> Vec<f64> {
    let var_factors = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 3.0];
    let range_factors = [0.05, 0.1, 0.2, 0.35, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0];
    let shapes: Vec<f64> = match (free_shape, obj.family.shape_bounds()) {
        (true, Some((lo, hi))) => (0..5).map(|i| lo + (hi - lo) * [0.02, 0.1, 0.25, 0.5, 0.9][i]).collect(),
        _ => vec![f64::NAN],
    };

    let mut best = Vec::new();
    let mut best_loss = f64::INFINITY;
    for &vf in &var_factors {
        for &rf in &range_factors {
            for &shape in &shapes {
                let mut free = vec![
                    obj.bounds[0].to_free(max_sv * vf),
                    obj.bounds[1].to_free(max_lag * rf),
                ];
                if !shape.is_nan() {
                    free.push(obj.bounds[2].to_free(shape));
                }
                let loss = obj.loss(&free);
                if loss < best_loss {
                    best_loss = loss;
                    best = free;
                }
            }
        }
    }
    best
}

/// Nelder–Mead downhill simplex. Returns (best point, iterations, converged).
fn nelder_mead(obj: &Objective<'_>, start: &[f64], params: &FitParams) -> (Vec<f64>, usize, bool) {
    let n = start.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(start.to_vec());
    for i in 0..n {
        let mut v = start.to_vec();
        v[i] += 0.5;
        simplex.push(v);
    }
    let mut losses: Vec<f64> = simplex.iter().map(|v| obj.loss(v)).collect();

    let (alpha, gamma, rho, sigma) = (1.0, 2.0, 0.5, 0.5);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iterations {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| losses[a].total_cmp(&losses[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        losses = order.iter().map(|&i| losses[i]).collect();

        let spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        if (losses[n] - losses[0]).abs() <= params.tolerance * (1.0 + losses[0].abs())
            || spread <= SIMPLEX_TOLERANCE
        {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let along = |t: f64| -> Vec<f64> {
            centroid.iter().zip(&simplex[n]).map(|(c, w)| c + t * (c - w)).collect()
        };

        let reflected = along(alpha);
        let fr = obj.loss(&reflected);
        if fr < losses[0] {
            let expanded = along(gamma);
            let fe = obj.loss(&expanded);
            if fe < fr {
                simplex[n] = expanded;
                losses[n] = fe;
            } else {
                simplex[n] = reflected;
                losses[n] = fr;
            }
            continue;
        }
        if fr < losses[n - 1] {
            simplex[n] = reflected;
            losses[n] = fr;
            continue;
        }

        let contracted = if fr < losses[n] { along(rho) } else { along(-rho) };
        let fc = obj.loss(&contracted);
        if fc < losses[n].min(fr) {
            simplex[n] = contracted;
            losses[n] = fc;
            continue;
        }

        for i in 1..=n {
            let shrunk: Vec<f64> =
                simplex[0].iter().zip(&simplex[i]).map(|(b, v)| b + sigma * (v - b)).collect();
            losses[i] = obj.loss(&shrunk);
            simplex[i] = shrunk;
        }
    }

    let best = (0..=n).min_by(|&a, &b| losses[a].total_cmp(&losses[b])).unwrap_or(0);
    (simplex[best].clone(), iterations, converged)
}
