use super::{HardeningRule, NonAssociativeHardening, YieldSurface};
use crate::base::Error;
use russell_lab::{Matrix, Vector};
use russell_tensor::{Tensor2, Tensor4};

/// Defines the flow data consumed by the rate-independent integrator
///
/// A rule provides the yield scalar f, the flow direction g, and the history
/// evolution h (per unit plastic multiplier), with all first partials in the
/// stress and in the strain-like history α.
pub trait RateIndependentFlowRule: Send + Sync {
    /// Returns the number of strain-like history variables α
    fn nhist(&self) -> usize;

    /// Initializes the history to the reference state
    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error>;

    /// Evaluates the yield function f(σ, α, T)
    fn f(&self, stress: &Tensor2, alpha: &Vector, temperature: f64) -> Result<f64, Error>;

    /// Computes ∂f/∂σ
    fn df_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error>;

    /// Computes ∂f/∂α (nhist)
    fn df_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes the flow direction g(σ, α, T)
    fn g(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error>;

    /// Computes ∂g/∂σ (6×6)
    fn dg_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error>;

    /// Computes ∂g/∂α (6×nhist)
    fn dg_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes the history evolution h(σ, α, T) per unit plastic multiplier (nhist)
    fn h(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes ∂h/∂σ (nhist×6)
    fn dh_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes ∂h/∂α (nhist×nhist)
    fn dh_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;
}

/// Implements associative flow: g = ∂f/∂σ and h = ∂f/∂q
///
/// The strain-like history evolves normal to the yield surface in the space of
/// stress-like variables; all partials chain through the hardening Jacobian
/// dq/dα.
pub struct AssociativeFlowRule {
    surface: Box<dyn YieldSurface>,
    hardening: Box<dyn HardeningRule>,
}

impl AssociativeFlowRule {
    /// Allocates a new instance; fails when the surface and the hardening rule
    /// disagree on the number of internal variables
    pub fn new(surface: Box<dyn YieldSurface>, hardening: Box<dyn HardeningRule>) -> Result<Self, Error> {
        if surface.nhist() != hardening.nhist() {
            return Err(Error::IncompatibleModels);
        }
        Ok(AssociativeFlowRule { surface, hardening })
    }

    /// Computes q(α) into a fresh vector
    fn q_of(&self, alpha: &Vector, temperature: f64) -> Result<Vector, Error> {
        let mut q = Vector::new(self.hardening.nhist());
        self.hardening.q(alpha, temperature, &mut q)?;
        Ok(q)
    }
}

impl RateIndependentFlowRule for AssociativeFlowRule {
    fn nhist(&self) -> usize {
        self.hardening.nhist()
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        self.hardening.init_hist(alpha)
    }

    fn f(&self, stress: &Tensor2, alpha: &Vector, temperature: f64) -> Result<f64, Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.f(stress, &q, temperature)
    }

    fn df_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.df_ds(stress, &q, temperature, out)
    }

    fn df_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let nh = self.nhist();
        let q = self.q_of(alpha, temperature)?;
        let mut df_dq = Vector::new(nh);
        self.surface.df_dq(stress, &q, temperature, &mut df_dq)?;
        let mut dq_da = Matrix::new(nh, nh);
        self.hardening.dq_da(alpha, temperature, &mut dq_da)?;
        for i in 0..nh {
            out[i] = (0..nh).map(|k| df_dq[k] * dq_da.get(k, i)).sum();
        }
        Ok(())
    }

    fn g(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        self.df_ds(stress, alpha, temperature, out)
    }

    fn dg_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.df_dsds(stress, &q, temperature, out)
    }

    fn dg_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let nh = self.nhist();
        let q = self.q_of(alpha, temperature)?;
        let mut df_dsdq = Matrix::new(6, nh);
        self.surface.df_dsdq(stress, &q, temperature, &mut df_dsdq)?;
        let mut dq_da = Matrix::new(nh, nh);
        self.hardening.dq_da(alpha, temperature, &mut dq_da)?;
        for i in 0..6 {
            for j in 0..nh {
                out.set(i, j, (0..nh).map(|k| df_dsdq.get(i, k) * dq_da.get(k, j)).sum());
            }
        }
        Ok(())
    }

    fn h(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.df_dq(stress, &q, temperature, out)
    }

    fn dh_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.df_dqds(stress, &q, temperature, out)
    }

    fn dh_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let nh = self.nhist();
        let q = self.q_of(alpha, temperature)?;
        let mut df_dqdq = Matrix::new(nh, nh);
        self.surface.df_dqdq(stress, &q, temperature, &mut df_dqdq)?;
        let mut dq_da = Matrix::new(nh, nh);
        self.hardening.dq_da(alpha, temperature, &mut dq_da)?;
        for i in 0..nh {
            for j in 0..nh {
                out.set(i, j, (0..nh).map(|k| df_dqdq.get(i, k) * dq_da.get(k, j)).sum());
            }
        }
        Ok(())
    }
}

/// Implements flow with a surface-normal direction but independent hardening
///
/// The direction still comes from the yield surface while the history evolves
/// along the rule supplied by a [NonAssociativeHardening] (e.g. Chaboche).
/// Such rules can converge to roots violating the discrete Kuhn-Tucker
/// conditions, which is why the rate-independent integrator checks
/// feasibility after the return.
pub struct NonAssociativeFlowRule {
    surface: Box<dyn YieldSurface>,
    hardening: Box<dyn NonAssociativeHardening>,
}

impl NonAssociativeFlowRule {
    /// Allocates a new instance; fails when the surface expects a different
    /// number of stress-like variables than the hardening rule produces
    pub fn new(surface: Box<dyn YieldSurface>, hardening: Box<dyn NonAssociativeHardening>) -> Result<Self, Error> {
        if surface.nhist() != hardening.ninter() {
            return Err(Error::IncompatibleModels);
        }
        Ok(NonAssociativeFlowRule { surface, hardening })
    }

    /// Computes q(α) into a fresh vector
    fn q_of(&self, alpha: &Vector, temperature: f64) -> Result<Vector, Error> {
        let mut q = Vector::new(self.hardening.ninter());
        self.hardening.q(alpha, temperature, &mut q)?;
        Ok(q)
    }
}

impl RateIndependentFlowRule for NonAssociativeFlowRule {
    fn nhist(&self) -> usize {
        self.hardening.nhist()
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        self.hardening.init_hist(alpha)
    }

    fn f(&self, stress: &Tensor2, alpha: &Vector, temperature: f64) -> Result<f64, Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.f(stress, &q, temperature)
    }

    fn df_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.df_ds(stress, &q, temperature, out)
    }

    fn df_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let nh = self.nhist();
        let nq = self.hardening.ninter();
        let q = self.q_of(alpha, temperature)?;
        let mut df_dq = Vector::new(nq);
        self.surface.df_dq(stress, &q, temperature, &mut df_dq)?;
        let mut dq_da = Matrix::new(nq, nh);
        self.hardening.dq_da(alpha, temperature, &mut dq_da)?;
        for i in 0..nh {
            out[i] = (0..nq).map(|k| df_dq[k] * dq_da.get(k, i)).sum();
        }
        Ok(())
    }

    fn g(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        self.df_ds(stress, alpha, temperature, out)
    }

    fn dg_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
        let q = self.q_of(alpha, temperature)?;
        self.surface.df_dsds(stress, &q, temperature, out)
    }

    fn dg_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let nh = self.nhist();
        let nq = self.hardening.ninter();
        let q = self.q_of(alpha, temperature)?;
        let mut df_dsdq = Matrix::new(6, nq);
        self.surface.df_dsdq(stress, &q, temperature, &mut df_dsdq)?;
        let mut dq_da = Matrix::new(nq, nh);
        self.hardening.dq_da(alpha, temperature, &mut dq_da)?;
        for i in 0..6 {
            for j in 0..nh {
                out.set(i, j, (0..nq).map(|k| df_dsdq.get(i, k) * dq_da.get(k, j)).sum());
            }
        }
        Ok(())
    }

    fn h(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        self.hardening.h(stress, alpha, temperature, out)
    }

    fn dh_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.hardening.dh_ds(stress, alpha, temperature, out)
    }

    fn dh_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.hardening.dh_da(stress, alpha, temperature, out)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
