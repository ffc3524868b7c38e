use super::{AssociativeFlowRule, HardeningRule, Interpolate, RateIndependentFlowRule, YieldSurface};
use crate::base::Error;
use russell_lab::{Matrix, Vector};
use russell_tensor::{Tensor2, Tensor4};

/// Maps the overstress f > 0 to a scalar flow-rate factor
pub trait OverstressFunction: Send + Sync {
    /// Evaluates the rate factor at the given overstress
    fn value(&self, f: f64) -> f64;

    /// Evaluates the derivative of the rate factor
    fn deriv(&self, f: f64) -> f64;
}

/// Implements the power-law overstress function g(f) = f^n
#[derive(Clone, Copy, Debug)]
pub struct PowerLawOverstress {
    n: f64,
}

impl PowerLawOverstress {
    /// Allocates a new instance with exponent n
    pub fn new(n: f64) -> Self {
        PowerLawOverstress { n }
    }
}

impl OverstressFunction for PowerLawOverstress {
    fn value(&self, f: f64) -> f64 {
        if f > 0.0 {
            f.powf(self.n)
        } else {
            0.0
        }
    }

    fn deriv(&self, f: f64) -> f64 {
        if f > 0.0 {
            self.n * f.powf(self.n - 1.0)
        } else {
            0.0
        }
    }
}

/// Defines the flow data consumed by the rate-dependent (viscoplastic) integrator
///
/// A rule provides a scalar rate ẏ, a flow direction g, and a hardening rate h,
/// with all first partials in the stress and in the strain-like history α.
pub trait ViscoPlasticFlowRule: Send + Sync {
    /// Returns the number of strain-like history variables α
    fn nhist(&self) -> usize;

    /// Initializes the history to the reference state
    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error>;

    /// Evaluates the scalar flow rate ẏ(σ, α, T) ≥ 0
    fn y(&self, stress: &Tensor2, alpha: &Vector, temperature: f64) -> Result<f64, Error>;

    /// Computes ∂ẏ/∂σ
    fn dy_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error>;

    /// Computes ∂ẏ/∂α (nhist)
    fn dy_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes the flow direction g(σ, α, T)
    fn g(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error>;

    /// Computes ∂g/∂σ (6×6)
    fn dg_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error>;

    /// Computes ∂g/∂α (6×nhist)
    fn dg_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes the hardening rate direction h(σ, α, T) (nhist)
    fn h(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes ∂h/∂σ (nhist×6)
    fn dh_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes ∂h/∂α (nhist×nhist)
    fn dh_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;
}

/// Implements Perzyna associative viscoplasticity
///
/// The scalar rate is driven by the overstress beyond the (rate-independent)
/// yield surface:
///
/// ```text
/// ẏ = g(f(σ, q(α), T)) / η(T)   for f > 0, else 0
/// ```
///
/// while direction and hardening rate coincide with the associative flow of
/// the underlying surface.
pub struct PerzynaFlowRule {
    flow: AssociativeFlowRule,
    overstress: Box<dyn OverstressFunction>,
    eta: Interpolate,
}

impl PerzynaFlowRule {
    /// Allocates a new instance; fails when the surface and hardening rule
    /// disagree on the number of internal variables
    pub fn new(
        surface: Box<dyn YieldSurface>,
        hardening: Box<dyn HardeningRule>,
        overstress: Box<dyn OverstressFunction>,
        eta: Interpolate,
    ) -> Result<Self, Error> {
        Ok(PerzynaFlowRule {
            flow: AssociativeFlowRule::new(surface, hardening)?,
            overstress,
            eta,
        })
    }
}

impl ViscoPlasticFlowRule for PerzynaFlowRule {
    fn nhist(&self) -> usize {
        self.flow.nhist()
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        self.flow.init_hist(alpha)
    }

    fn y(&self, stress: &Tensor2, alpha: &Vector, temperature: f64) -> Result<f64, Error> {
        let f = self.flow.f(stress, alpha, temperature)?;
        Ok(self.overstress.value(f) / self.eta.value(temperature))
    }

    fn dy_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        let f = self.flow.f(stress, alpha, temperature)?;
        let c = self.overstress.deriv(f) / self.eta.value(temperature);
        self.flow.df_ds(stress, alpha, temperature, out)?;
        let v = out.vector_mut();
        for i in 0..6 {
            v[i] *= c;
        }
        Ok(())
    }

    fn dy_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let f = self.flow.f(stress, alpha, temperature)?;
        let c = self.overstress.deriv(f) / self.eta.value(temperature);
        self.flow.df_da(stress, alpha, temperature, out)?;
        for i in 0..self.nhist() {
            out[i] *= c;
        }
        Ok(())
    }

    fn g(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        self.flow.g(stress, alpha, temperature, out)
    }

    fn dg_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
        self.flow.dg_ds(stress, alpha, temperature, out)
    }

    fn dg_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.flow.dg_da(stress, alpha, temperature, out)
    }

    fn h(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        self.flow.h(stress, alpha, temperature, out)
    }

    fn dh_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.flow.dh_ds(stress, alpha, temperature, out)
    }

    fn dh_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.flow.dh_da(stress, alpha, temperature, out)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
