use serde::{Deserialize, Serialize};

/// Maps temperature to a scalar material parameter
///
/// All temperature-dependent coefficients (moduli, yield stress, thermal
/// expansion, creep constants) are expressed through this type so that models
/// remain agnostic of how a parameter varies.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Interpolate {
    /// Temperature-independent value
    Constant(f64),

    /// Piecewise-linear table with strictly increasing abscissas (clamped at both ends)
    PiecewiseLinear { points: Vec<(f64, f64)> },

    /// Polynomial with coefficients ordered from the highest degree to the constant term
    Polynomial { coefficients: Vec<f64> },
}

impl Interpolate {
    /// Allocates a new constant interpolation
    pub fn constant(value: f64) -> Self {
        Interpolate::Constant(value)
    }

    /// Allocates a new piecewise-linear interpolation from abscissas and ordinates
    ///
    /// # Panics
    ///
    /// Panics if the arrays have different lengths, fewer than two entries,
    /// or non-increasing abscissas.
    pub fn piecewise_linear(xx: &[f64], yy: &[f64]) -> Self {
        assert_eq!(xx.len(), yy.len());
        assert!(xx.len() >= 2);
        assert!(xx.windows(2).all(|w| w[0] < w[1]));
        Interpolate::PiecewiseLinear {
            points: xx.iter().copied().zip(yy.iter().copied()).collect(),
        }
    }

    /// Allocates a new polynomial interpolation (highest degree first)
    pub fn polynomial(coefficients: &[f64]) -> Self {
        assert!(!coefficients.is_empty());
        Interpolate::Polynomial {
            coefficients: coefficients.to_vec(),
        }
    }

    /// Evaluates the parameter at the given temperature
    pub fn value(&self, temperature: f64) -> f64 {
        match self {
            Interpolate::Constant(value) => *value,
            Interpolate::PiecewiseLinear { points } => {
                let n = points.len();
                if temperature <= points[0].0 {
                    return points[0].1;
                }
                if temperature >= points[n - 1].0 {
                    return points[n - 1].1;
                }
                let i = points.partition_point(|&(x, _)| x <= temperature);
                let (x0, y0) = points[i - 1];
                let (x1, y1) = points[i];
                y0 + (y1 - y0) * (temperature - x0) / (x1 - x0)
            }
            Interpolate::Polynomial { coefficients } => {
                coefficients.iter().fold(0.0, |acc, c| acc * temperature + c)
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
