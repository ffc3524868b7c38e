use super::Interpolate;
use crate::base::Error;
use russell_lab::{Matrix, Vector};
use russell_tensor::{Tensor2, Tensor4, IDENTITY2, P_SYMDEV, SQRT_2_BY_3};

/// Defines an alias to IDENTITY2
const I: &[f64; 9] = &IDENTITY2;

/// Defines an alias to P_SYMDEV
const PSD: &[[f64; 9]; 9] = &P_SYMDEV;

/// Defines a generic yield surface with first and second derivatives
///
/// The surface is a scalar function `f(σ, q, T)` of the stress and of the
/// stress-like internal variables q produced by a hardening rule. The elastic
/// region is `f < 0` and plastic flow happens on `f = 0`. The integrators
/// need the gradients and Hessians with respect to both arguments.
pub trait YieldSurface: Send + Sync {
    /// Returns the number of stress-like internal variables q
    fn nhist(&self) -> usize;

    /// Evaluates the yield function
    fn f(&self, stress: &Tensor2, q: &Vector, temperature: f64) -> Result<f64, Error>;

    /// Computes the gradient of f with respect to the stress
    fn df_ds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error>;

    /// Computes the gradient of f with respect to q
    fn df_dq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes the Hessian of f with respect to the stress (6×6)
    fn df_dsds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error>;

    /// Computes the Hessian of f with respect to q (nhist×nhist)
    fn df_dqdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes the mixed Hessian ∂²f/∂σ∂q (6×nhist)
    fn df_dsdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes the mixed Hessian ∂²f/∂q∂σ (nhist×6)
    fn df_dqds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;
}

/// Computes the translated deviator e = dev(σ) + X and auxiliary directions
///
/// Returns (e, norm, n, m) with n = e/‖e‖ and m = Psymdev·n. The directions
/// are zeroed when ‖e‖ vanishes (the yield function is not smooth there).
fn translated_deviator(stress: &Tensor2, q: &Vector) -> ([f64; 6], f64, [f64; 6], [f64; 6]) {
    let sig = stress.vector();
    let mean = (sig[0] + sig[1] + sig[2]) / 3.0;
    let mut e = [0.0; 6];
    for i in 0..6 {
        e[i] = sig[i] - mean * I[i] + q[1 + i];
    }
    let norm = e.iter().map(|v| v * v).sum::<f64>().sqrt();
    let mut n = [0.0; 6];
    let mut m = [0.0; 6];
    if norm > 0.0 {
        for i in 0..6 {
            n[i] = e[i] / norm;
        }
        for i in 0..6 {
            m[i] = (0..6).map(|j| PSD[i][j] * n[j]).sum();
        }
    }
    (e, norm, n, m)
}

/// Implements a von Mises (J2) surface with combined isotropic/kinematic hardening
///
/// The internal variables are `q = [q_iso, X(6)]` with X a Mandel backstress:
///
/// ```text
/// f(σ, q, T) = ‖dev(σ) + X‖ + √(2/3) q_iso
/// ```
///
/// An isotropic hardening rule supplies `q_iso = -σ_flow` so that yield occurs
/// at a von Mises stress equal to the flow stress.
#[derive(Clone, Copy, Debug)]
pub struct J2Surface {}

impl J2Surface {
    /// Allocates a new instance
    pub fn new() -> Self {
        J2Surface {}
    }
}

impl YieldSurface for J2Surface {
    fn nhist(&self) -> usize {
        7
    }

    fn f(&self, stress: &Tensor2, q: &Vector, _temperature: f64) -> Result<f64, Error> {
        let (_, norm, _, _) = translated_deviator(stress, q);
        Ok(norm + SQRT_2_BY_3 * q[0])
    }

    fn df_ds(&self, stress: &Tensor2, q: &Vector, _temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        let (_, _, _, m) = translated_deviator(stress, q);
        let v = out.vector_mut();
        for i in 0..6 {
            v[i] = m[i];
        }
        Ok(())
    }

    fn df_dq(&self, stress: &Tensor2, q: &Vector, _temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let (_, _, n, _) = translated_deviator(stress, q);
        out[0] = SQRT_2_BY_3;
        for i in 0..6 {
            out[1 + i] = n[i];
        }
        Ok(())
    }

    fn df_dsds(&self, stress: &Tensor2, q: &Vector, _temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
        let (_, norm, _, m) = translated_deviator(stress, q);
        let mat = out.matrix_mut();
        if norm <= 0.0 {
            mat.fill(0.0);
            return Ok(());
        }
        for i in 0..6 {
            for j in 0..6 {
                mat.set(i, j, (PSD[i][j] - m[i] * m[j]) / norm);
            }
        }
        Ok(())
    }

    fn df_dqdq(&self, stress: &Tensor2, q: &Vector, _temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let (_, norm, n, _) = translated_deviator(stress, q);
        out.fill(0.0);
        if norm <= 0.0 {
            return Ok(());
        }
        for i in 0..6 {
            for j in 0..6 {
                let delta = if i == j { 1.0 } else { 0.0 };
                out.set(1 + i, 1 + j, (delta - n[i] * n[j]) / norm);
            }
        }
        Ok(())
    }

    fn df_dsdq(&self, stress: &Tensor2, q: &Vector, _temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let (_, norm, n, m) = translated_deviator(stress, q);
        out.fill(0.0);
        if norm <= 0.0 {
            return Ok(());
        }
        for i in 0..6 {
            for j in 0..6 {
                out.set(i, 1 + j, (PSD[i][j] - m[i] * n[j]) / norm);
            }
        }
        Ok(())
    }

    fn df_dqds(&self, stress: &Tensor2, q: &Vector, _temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let (_, norm, n, m) = translated_deviator(stress, q);
        out.fill(0.0);
        if norm <= 0.0 {
            return Ok(());
        }
        for i in 0..6 {
            for j in 0..6 {
                out.set(1 + i, j, (PSD[i][j] - n[i] * m[j]) / norm);
            }
        }
        Ok(())
    }
}

/// Implements a J2 surface with an additional mean-stress (I1) contribution
///
/// ```text
/// f(σ, q, T) = ‖dev(σ) + X‖ + √(2/3) q_iso + sign(tr σ) h(T) |tr σ|^l(T)
/// ```
///
/// The extra term makes yield pressure-sensitive, e.g. for porous metals.
#[derive(Clone, Debug)]
pub struct J2I1Surface {
    j2: J2Surface,
    hcoef: Interpolate,
    lexp: Interpolate,
}

impl J2I1Surface {
    /// Allocates a new instance with prefactor h(T) and exponent l(T)
    pub fn new(hcoef: Interpolate, lexp: Interpolate) -> Self {
        J2I1Surface {
            j2: J2Surface::new(),
            hcoef,
            lexp,
        }
    }

    /// Returns (tr σ, h, l)
    fn trace_h_l(&self, stress: &Tensor2, temperature: f64) -> (f64, f64, f64) {
        let sig = stress.vector();
        let i1 = sig[0] + sig[1] + sig[2];
        (i1, self.hcoef.value(temperature), self.lexp.value(temperature))
    }
}

impl YieldSurface for J2I1Surface {
    fn nhist(&self) -> usize {
        7
    }

    fn f(&self, stress: &Tensor2, q: &Vector, temperature: f64) -> Result<f64, Error> {
        let base = self.j2.f(stress, q, temperature)?;
        let (i1, h, l) = self.trace_h_l(stress, temperature);
        Ok(base + f64::signum(i1) * h * f64::abs(i1).powf(l))
    }

    fn df_ds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        self.j2.df_ds(stress, q, temperature, out)?;
        let (i1, h, l) = self.trace_h_l(stress, temperature);
        if i1 != 0.0 {
            let c = h * l * f64::abs(i1).powf(l - 1.0);
            let v = out.vector_mut();
            for i in 0..6 {
                v[i] += c * I[i];
            }
        }
        Ok(())
    }

    fn df_dq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        self.j2.df_dq(stress, q, temperature, out)
    }

    fn df_dsds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
        self.j2.df_dsds(stress, q, temperature, out)?;
        let (i1, h, l) = self.trace_h_l(stress, temperature);
        if i1 != 0.0 {
            let c = f64::signum(i1) * h * l * (l - 1.0) * f64::abs(i1).powf(l - 2.0);
            let mat = out.matrix_mut();
            for i in 0..6 {
                for j in 0..6 {
                    let v = mat.get(i, j);
                    mat.set(i, j, v + c * I[i] * I[j]);
                }
            }
        }
        Ok(())
    }

    fn df_dqdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.j2.df_dqdq(stress, q, temperature, out)
    }

    fn df_dsdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.j2.df_dsdq(stress, q, temperature, out)
    }

    fn df_dqds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        self.j2.df_dqds(stress, q, temperature, out)
    }
}

/// Reduces a combined isotropic/kinematic surface to isotropic hardening only
///
/// The single internal variable is forwarded to the base surface with a
/// zeroed backstress; derivatives are sliced back down to one variable.
pub struct IsoReduced<S: YieldSurface> {
    base: S,
}

impl<S: YieldSurface> IsoReduced<S> {
    /// Allocates a new instance wrapping the given surface
    pub fn new(base: S) -> Self {
        IsoReduced { base }
    }

    /// Expands the single isotropic variable with a zero backstress
    fn expand(&self, q: &Vector) -> Vector {
        let mut qn = Vector::new(self.base.nhist());
        qn[0] = q[0];
        qn
    }
}

impl<S: YieldSurface> YieldSurface for IsoReduced<S> {
    fn nhist(&self) -> usize {
        1
    }

    fn f(&self, stress: &Tensor2, q: &Vector, temperature: f64) -> Result<f64, Error> {
        self.base.f(stress, &self.expand(q), temperature)
    }

    fn df_ds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
        self.base.df_ds(stress, &self.expand(q), temperature, out)
    }

    fn df_dq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let mut full = Vector::new(self.base.nhist());
        self.base.df_dq(stress, &self.expand(q), temperature, &mut full)?;
        out[0] = full[0];
        Ok(())
    }

    fn df_dsds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
        self.base.df_dsds(stress, &self.expand(q), temperature, out)
    }

    fn df_dqdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let nq = self.base.nhist();
        let mut full = Matrix::new(nq, nq);
        self.base.df_dqdq(stress, &self.expand(q), temperature, &mut full)?;
        out.set(0, 0, full.get(0, 0));
        Ok(())
    }

    fn df_dsdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let nq = self.base.nhist();
        let mut full = Matrix::new(6, nq);
        self.base.df_dsdq(stress, &self.expand(q), temperature, &mut full)?;
        for i in 0..6 {
            out.set(i, 0, full.get(i, 0));
        }
        Ok(())
    }

    fn df_dqds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let nq = self.base.nhist();
        let mut full = Matrix::new(nq, 6);
        self.base.df_dqds(stress, &self.expand(q), temperature, &mut full)?;
        for j in 0..6 {
            out.set(0, j, full.get(0, j));
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
