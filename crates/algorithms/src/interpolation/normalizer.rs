//! Normalizing transforms for positive, right-skewed variables
//!
//! Areal rates are strongly skewed. Variogram estimation and kriging
//! operate on `normalize(z)`; predictions and simulated fields are mapped
//! back with `denormalize`.
//!
//! - **LogNormal**: y = ln(z)
//! - **BoxCox**: y = (z^λ − 1)/λ (ln z for λ = 0), λ fitted by maximum likelihood
//!
//! Reference:
//! Box, G.E.P. & Cox, D.R. (1964). An analysis of transformations. JRSS B.

use geokrig_core::{Error, Result};

/// Which normalizer to fit from the observed values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizerKind {
    #[default]
    LogNormal,
    BoxCox,
}

/// A fitted normalizing transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalizer {
    LogNormal,
    BoxCox { lambda: f64 },
}

const LAMBDA_BOUNDS: (f64, f64) = (-3.0, 3.0);

impl Normalizer {
    /// Fit the requested transform from observed values alone.
    ///
    /// # Errors
    /// `Numeric` if any value is non-positive or not finite, `Configuration`
    /// if there are no values.
    pub fn fit(kind: NormalizerKind, values: &[f64]) -> Result<Self> {
        check_domain(values)?;
        match kind {
            NormalizerKind::LogNormal => Ok(Normalizer::LogNormal),
            NormalizerKind::BoxCox => Ok(Normalizer::BoxCox { lambda: fit_box_cox_lambda(values) }),
        }
    }

    pub fn normalize(&self, z: f64) -> f64 {
        match *self {
            Normalizer::LogNormal => z.ln(),
            Normalizer::BoxCox { lambda } => box_cox(z, lambda),
        }
    }

    pub fn denormalize(&self, y: f64) -> f64 {
        match *self {
            Normalizer::LogNormal => y.exp(),
            Normalizer::BoxCox { lambda } => {
                if lambda.abs() < 1e-12 {
                    y.exp()
                } else {
                    // Values below the transform's image map to the domain edge
                    (lambda * y + 1.0).max(0.0).powf(1.0 / lambda)
                }
            }
        }
    }

    pub fn normalize_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&z| self.normalize(z)).collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Normalizer::LogNormal => "LogNormal",
            Normalizer::BoxCox { .. } => "BoxCox",
        }
    }
}

fn check_domain(values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(Error::Configuration("normalizer needs at least one observed value".into()));
    }
    if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
        return Err(Error::Numeric(format!(
            "log-normal transform requires strictly positive values, observation {i} is {v}"
        )));
    }
    Ok(())
}

#[inline]
fn box_cox(z: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-12 {
        z.ln()
    } else {
        (z.powf(lambda) - 1.0) / lambda
    }
}

/// Profile log-likelihood of λ under a Gaussian model for the transformed data.
fn box_cox_log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let y: Vec<f64> = values.iter().map(|&z| box_cox(z, lambda)).collect();
    let mean = y.iter().sum::<f64>() / n;
    let var = y.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let log_jacobian: f64 = values.iter().map(|z| z.ln()).sum();
    if var <= 0.0 {
        return f64::NEG_INFINITY;
    }
    -0.5 * n * var.ln() + (lambda - 1.0) * log_jacobian
}

/// Golden-section maximization of the Box-Cox likelihood over λ.
fn fit_box_cox_lambda(values: &[f64]) -> f64 {
    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = LAMBDA_BOUNDS;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = box_cox_log_likelihood(values, c);
    let mut fd = box_cox_log_likelihood(values, d);

    for _ in 0..100 {
        if (b - a).abs() < 1e-8 {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = box_cox_log_likelihood(values, c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = box_cox_log_likelihood(values, d);
        }
    }

    let lambda = 0.5 * (a + b);
    if lambda.is_finite() { lambda } else { 0.0 }
}
