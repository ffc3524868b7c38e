use super::Interpolate;
use crate::base::Error;
use russell_lab::{Matrix, Vector};
use russell_tensor::{Tensor2, IDENTITY2, P_SYMDEV, SQRT_2_BY_3};

/// Defines an alias to IDENTITY2
const I: &[f64; 9] = &IDENTITY2;

/// Defines an alias to P_SYMDEV
const PSD: &[[f64; 9]; 9] = &P_SYMDEV;

/// Maps strain-like history α to stress-like internal variables q
///
/// The associative integrators evolve α with the yield-surface gradient, so a
/// hardening rule only has to provide the map and its Jacobian. The layout of
/// q must match the surface it is paired with.
pub trait HardeningRule: Send + Sync {
    /// Returns the number of strain-like (= stress-like) variables
    fn nhist(&self) -> usize;

    /// Initializes the history to the reference state
    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error>;

    /// Computes q(α)
    fn q(&self, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes the Jacobian dq/dα (nhist×nhist)
    fn dq_da(&self, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;
}

/// Implements linear isotropic hardening: σ_flow = σ₀(T) + K(T) α
///
/// The single stress-like variable is `q₀ = -σ_flow` so that a paired J2
/// surface yields at the current flow stress.
#[derive(Clone, Debug)]
pub struct LinearIsotropicHardening {
    s0: Interpolate,
    kk: Interpolate,
}

impl LinearIsotropicHardening {
    /// Allocates a new instance with initial yield stress σ₀(T) and modulus K(T)
    pub fn new(s0: Interpolate, kk: Interpolate) -> Self {
        LinearIsotropicHardening { s0, kk }
    }
}

impl HardeningRule for LinearIsotropicHardening {
    fn nhist(&self) -> usize {
        1
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        alpha.fill(0.0);
        Ok(())
    }

    fn q(&self, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        out[0] = -(self.s0.value(temperature) + self.kk.value(temperature) * alpha[0]);
        Ok(())
    }

    fn dq_da(&self, _alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        out.set(0, 0, -self.kk.value(temperature));
        Ok(())
    }
}

/// Implements Voce (saturating) isotropic hardening: σ_flow = σ₀ + R (1 - e^(-δ α))
#[derive(Clone, Debug)]
pub struct VoceIsotropicHardening {
    s0: Interpolate,
    rr: Interpolate,
    delta: Interpolate,
}

impl VoceIsotropicHardening {
    /// Allocates a new instance with initial yield stress σ₀(T), saturation R(T), and rate δ(T)
    pub fn new(s0: Interpolate, rr: Interpolate, delta: Interpolate) -> Self {
        VoceIsotropicHardening { s0, rr, delta }
    }
}

impl HardeningRule for VoceIsotropicHardening {
    fn nhist(&self) -> usize {
        1
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        alpha.fill(0.0);
        Ok(())
    }

    fn q(&self, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let rr = self.rr.value(temperature);
        let delta = self.delta.value(temperature);
        out[0] = -(self.s0.value(temperature) + rr * (1.0 - f64::exp(-delta * alpha[0])));
        Ok(())
    }

    fn dq_da(&self, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let rr = self.rr.value(temperature);
        let delta = self.delta.value(temperature);
        out.set(0, 0, -rr * delta * f64::exp(-delta * alpha[0]));
        Ok(())
    }
}

/// Implements linear kinematic hardening: X = -(2/3) H(T) α
///
/// The six strain-like variables are the kinematic strain; the stress-like
/// output is the backstress entering a translated J2 surface.
#[derive(Clone, Debug)]
pub struct LinearKinematicHardening {
    hh: Interpolate,
}

impl LinearKinematicHardening {
    /// Allocates a new instance with kinematic modulus H(T)
    pub fn new(hh: Interpolate) -> Self {
        LinearKinematicHardening { hh }
    }
}

impl HardeningRule for LinearKinematicHardening {
    fn nhist(&self) -> usize {
        6
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        alpha.fill(0.0);
        Ok(())
    }

    fn q(&self, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let hh = self.hh.value(temperature);
        for i in 0..6 {
            out[i] = -2.0 / 3.0 * hh * alpha[i];
        }
        Ok(())
    }

    fn dq_da(&self, _alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let hh = self.hh.value(temperature);
        out.fill(0.0);
        for i in 0..6 {
            out.set(i, i, -2.0 / 3.0 * hh);
        }
        Ok(())
    }
}

/// Combines an isotropic rule (1 variable) with a kinematic rule (6 variables)
///
/// The layout is `α = [α_iso, α_kin(6)]` and `q = [q_iso, X(6)]`, matching the
/// combined J2 surface.
pub struct CombinedHardening {
    iso: Box<dyn HardeningRule>,
    kin: Box<dyn HardeningRule>,
}

impl CombinedHardening {
    /// Allocates a new instance; fails unless iso has 1 variable and kin has 6
    pub fn new(iso: Box<dyn HardeningRule>, kin: Box<dyn HardeningRule>) -> Result<Self, Error> {
        if iso.nhist() != 1 || kin.nhist() != 6 {
            return Err(Error::IncompatibleModels);
        }
        Ok(CombinedHardening { iso, kin })
    }
}

impl HardeningRule for CombinedHardening {
    fn nhist(&self) -> usize {
        7
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        alpha.fill(0.0);
        Ok(())
    }

    fn q(&self, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let a_iso = Vector::from(&[alpha[0]]);
        let mut q_iso = Vector::new(1);
        self.iso.q(&a_iso, temperature, &mut q_iso)?;
        out[0] = q_iso[0];

        let mut a_kin = Vector::new(6);
        for i in 0..6 {
            a_kin[i] = alpha[1 + i];
        }
        let mut q_kin = Vector::new(6);
        self.kin.q(&a_kin, temperature, &mut q_kin)?;
        for i in 0..6 {
            out[1 + i] = q_kin[i];
        }
        Ok(())
    }

    fn dq_da(&self, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        out.fill(0.0);
        let a_iso = Vector::from(&[alpha[0]]);
        let mut d_iso = Matrix::new(1, 1);
        self.iso.dq_da(&a_iso, temperature, &mut d_iso)?;
        out.set(0, 0, d_iso.get(0, 0));

        let mut a_kin = Vector::new(6);
        for i in 0..6 {
            a_kin[i] = alpha[1 + i];
        }
        let mut d_kin = Matrix::new(6, 6);
        self.kin.dq_da(&a_kin, temperature, &mut d_kin)?;
        for i in 0..6 {
            for j in 0..6 {
                out.set(1 + i, 1 + j, d_kin.get(i, j));
            }
        }
        Ok(())
    }
}

/// Defines the recovery coefficient γ(p) of a Chaboche backstress
#[derive(Clone, Copy, Debug)]
pub enum Gamma {
    /// Constant recovery coefficient
    Constant { g: f64 },

    /// Saturating recovery: γ(p) = gs + (g0 - gs) e^(-β p)
    Saturating { gs: f64, g0: f64, beta: f64 },
}

impl Gamma {
    /// Evaluates γ at the equivalent plastic strain p
    pub fn value(&self, p: f64) -> f64 {
        match self {
            Gamma::Constant { g } => *g,
            Gamma::Saturating { gs, g0, beta } => gs + (g0 - gs) * f64::exp(-beta * p),
        }
    }

    /// Evaluates dγ/dp
    pub fn deriv(&self, p: f64) -> f64 {
        match self {
            Gamma::Constant { .. } => 0.0,
            Gamma::Saturating { gs, g0, beta } => -beta * (g0 - gs) * f64::exp(-beta * p),
        }
    }
}

/// Separates the q(α) map from an independent hardening evolution h(σ, α, T)
///
/// This is the seam for non-associative hardening: the strain-like history no
/// longer evolves along ∂f/∂q but along a model-specific direction h given per
/// unit plastic multiplier.
pub trait NonAssociativeHardening: Send + Sync {
    /// Returns the number of stress-like variables q
    fn ninter(&self) -> usize;

    /// Returns the number of strain-like variables α
    fn nhist(&self) -> usize;

    /// Initializes the history to the reference state
    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error>;

    /// Computes q(α)
    fn q(&self, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes dq/dα (ninter×nhist)
    fn dq_da(&self, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes the hardening evolution h per unit plastic multiplier (nhist)
    fn h(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error>;

    /// Computes dh/dσ (nhist×6)
    fn dh_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;

    /// Computes dh/dα (nhist×nhist)
    fn dh_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error>;
}

/// Implements Chaboche hardening with multiple Armstrong-Frederick backstresses
///
/// The history is `α = [p, X₁(6), …, X_n(6)]` with p the equivalent plastic
/// strain and Xᵢ backstress contributions in the translated-surface convention
/// (the physical backstress is -Xᵢ). The stress-like output is
/// `q = [-σ_flow(p), ΣXᵢ]` for a combined J2 surface. Evolution per unit Δγ:
///
/// ```text
/// dp  = √(2/3)
/// dXᵢ = -(2/3) Cᵢ(T) n - √(2/3) γᵢ(p) Xᵢ
/// ```
///
/// with n the unit direction of dev(σ) + ΣXᵢ.
pub struct Chaboche {
    iso: Box<dyn HardeningRule>,
    cc: Vec<Interpolate>,
    gamma: Vec<Gamma>,
}

impl Chaboche {
    /// Allocates a new instance; fails unless iso has exactly 1 variable and
    /// there is one γ per backstress modulus C
    pub fn new(iso: Box<dyn HardeningRule>, cc: Vec<Interpolate>, gamma: Vec<Gamma>) -> Result<Self, Error> {
        if iso.nhist() != 1 || cc.is_empty() || cc.len() != gamma.len() {
            return Err(Error::IncompatibleModels);
        }
        Ok(Chaboche { iso, cc, gamma })
    }

    /// Returns the number of backstresses
    pub fn n_backstress(&self) -> usize {
        self.cc.len()
    }

    /// Computes e = dev(σ) + ΣXᵢ, its norm, and n = e/‖e‖ (zeroed at the center)
    fn direction(&self, stress: &Tensor2, alpha: &Vector) -> (f64, [f64; 6], [f64; 6]) {
        let sig = stress.vector();
        let mean = (sig[0] + sig[1] + sig[2]) / 3.0;
        let mut e = [0.0; 6];
        for i in 0..6 {
            e[i] = sig[i] - mean * I[i];
            for j in 0..self.n_backstress() {
                e[i] += alpha[1 + 6 * j + i];
            }
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
        (norm, n, m)
    }
}

impl NonAssociativeHardening for Chaboche {
    fn ninter(&self) -> usize {
        7
    }

    fn nhist(&self) -> usize {
        1 + 6 * self.n_backstress()
    }

    fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
        alpha.fill(0.0);
        Ok(())
    }

    fn q(&self, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let a_iso = Vector::from(&[alpha[0]]);
        let mut q_iso = Vector::new(1);
        self.iso.q(&a_iso, temperature, &mut q_iso)?;
        out[0] = q_iso[0];
        for i in 0..6 {
            out[1 + i] = (0..self.n_backstress()).map(|j| alpha[1 + 6 * j + i]).sum();
        }
        Ok(())
    }

    fn dq_da(&self, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        out.fill(0.0);
        let a_iso = Vector::from(&[alpha[0]]);
        let mut d_iso = Matrix::new(1, 1);
        self.iso.dq_da(&a_iso, temperature, &mut d_iso)?;
        out.set(0, 0, d_iso.get(0, 0));
        for j in 0..self.n_backstress() {
            for i in 0..6 {
                out.set(1 + i, 1 + 6 * j + i, 1.0);
            }
        }
        Ok(())
    }

    fn h(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
        let (_, n, _) = self.direction(stress, alpha);
        let p = alpha[0];
        out[0] = SQRT_2_BY_3;
        for j in 0..self.n_backstress() {
            let cj = self.cc[j].value(temperature);
            let gj = self.gamma[j].value(p);
            for i in 0..6 {
                out[1 + 6 * j + i] = -2.0 / 3.0 * cj * n[i] - SQRT_2_BY_3 * gj * alpha[1 + 6 * j + i];
            }
        }
        Ok(())
    }

    fn dh_ds(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let (norm, n, m) = self.direction(stress, alpha);
        out.fill(0.0);
        if norm <= 0.0 {
            return Ok(());
        }
        for j in 0..self.n_backstress() {
            let cj = self.cc[j].value(temperature);
            for i in 0..6 {
                for k in 0..6 {
                    // dnᵢ/dσₖ = (Psymdev[i][k] - nᵢ mₖ)/‖e‖
                    let dn = (PSD[i][k] - n[i] * m[k]) / norm;
                    out.set(1 + 6 * j + i, k, -2.0 / 3.0 * cj * dn);
                }
            }
        }
        Ok(())
    }

    fn dh_da(&self, stress: &Tensor2, alpha: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
        let (norm, n, _) = self.direction(stress, alpha);
        let p = alpha[0];
        out.fill(0.0);
        for j in 0..self.n_backstress() {
            let cj = self.cc[j].value(temperature);
            let gj = self.gamma[j].value(p);
            let dgj = self.gamma[j].deriv(p);
            for i in 0..6 {
                let row = 1 + 6 * j + i;
                // recovery depends on p through γ(p)
                out.set(row, 0, -SQRT_2_BY_3 * dgj * alpha[row]);
                for k in 0..self.n_backstress() {
                    for l in 0..6 {
                        let col = 1 + 6 * k + l;
                        let mut val = 0.0;
                        if norm > 0.0 {
                            let delta = if i == l { 1.0 } else { 0.0 };
                            // dnᵢ/dXₗ = (δᵢₗ - nᵢ nₗ)/‖e‖ for every backstress block
                            val -= 2.0 / 3.0 * cj * (delta - n[i] * n[l]) / norm;
                        }
                        if k == j && i == l {
                            val -= SQRT_2_BY_3 * gj;
                        }
                        out.set(row, col, val);
                    }
                }
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use russell_lab::approx_eq;
    use russell_tensor::Mandel;

    #[test]
    fn linear_isotropic_works() {
        let rule = LinearIsotropicHardening::new(Interpolate::constant(100.0), Interpolate::constant(10000.0));
        assert_eq!(rule.nhist(), 1);
        let mut alpha = Vector::new(1);
        rule.init_hist(&mut alpha).unwrap();
        assert_eq!(alpha[0], 0.0);
        alpha[0] = 0.01;
        let mut q = Vector::new(1);
        rule.q(&alpha, 0.0, &mut q).unwrap();
        approx_eq(q[0], -200.0, 1e-13);
        let mut dd = Matrix::new(1, 1);
        rule.dq_da(&alpha, 0.0, &mut dd).unwrap();
        approx_eq(dd.get(0, 0), -10000.0, 1e-13);
    }

    #[test]
    fn voce_works() {
        let rule = VoceIsotropicHardening::new(
            Interpolate::constant(100.0),
            Interpolate::constant(50.0),
            Interpolate::constant(200.0),
        );
        let mut q = Vector::new(1);
        let alpha = Vector::from(&[0.0]);
        rule.q(&alpha, 0.0, &mut q).unwrap();
        approx_eq(q[0], -100.0, 1e-13);
        let alpha = Vector::from(&[1.0]);
        rule.q(&alpha, 0.0, &mut q).unwrap();
        approx_eq(q[0], -150.0, 1e-10); // saturated

        // Jacobian vs finite differences
        let alpha = Vector::from(&[0.004]);
        let mut dd = Matrix::new(1, 1);
        rule.dq_da(&alpha, 0.0, &mut dd).unwrap();
        let h = 1e-7;
        let mut qp = Vector::new(1);
        let mut qm = Vector::new(1);
        rule.q(&Vector::from(&[0.004 + h]), 0.0, &mut qp).unwrap();
        rule.q(&Vector::from(&[0.004 - h]), 0.0, &mut qm).unwrap();
        approx_eq(dd.get(0, 0), (qp[0] - qm[0]) / (2.0 * h), 1e-6);
    }

    #[test]
    fn combined_works() {
        let iso = Box::new(LinearIsotropicHardening::new(
            Interpolate::constant(100.0),
            Interpolate::constant(1000.0),
        ));
        let kin = Box::new(LinearKinematicHardening::new(Interpolate::constant(1500.0)));
        let rule = CombinedHardening::new(iso, kin).unwrap();
        assert_eq!(rule.nhist(), 7);
        let mut alpha = Vector::new(7);
        alpha[0] = 0.1;
        alpha[1] = 0.01;
        let mut q = Vector::new(7);
        rule.q(&alpha, 0.0, &mut q).unwrap();
        approx_eq(q[0], -200.0, 1e-12);
        approx_eq(q[1], -2.0 / 3.0 * 1500.0 * 0.01, 1e-12);
        assert_eq!(q[2], 0.0);
    }

    #[test]
    fn combined_captures_incompatible_rules() {
        let iso = Box::new(LinearIsotropicHardening::new(
            Interpolate::constant(1.0),
            Interpolate::constant(1.0),
        ));
        let iso2 = Box::new(LinearIsotropicHardening::new(
            Interpolate::constant(1.0),
            Interpolate::constant(1.0),
        ));
        assert_eq!(CombinedHardening::new(iso, iso2).err(), Some(Error::IncompatibleModels));
    }

    #[test]
    fn gamma_works() {
        let g = Gamma::Constant { g: 10.0 };
        assert_eq!(g.value(0.5), 10.0);
        assert_eq!(g.deriv(0.5), 0.0);
        let g = Gamma::Saturating {
            gs: 5.0,
            g0: 20.0,
            beta: 100.0,
        };
        approx_eq(g.value(0.0), 20.0, 1e-14);
        approx_eq(g.value(1.0), 5.0, 1e-10);
        let h = 1e-7;
        approx_eq(g.deriv(0.01), (g.value(0.01 + h) - g.value(0.01 - h)) / (2.0 * h), 1e-5);
    }

    #[test]
    fn chaboche_derivatives_match_finite_differences() {
        let iso = Box::new(LinearIsotropicHardening::new(
            Interpolate::constant(100.0),
            Interpolate::constant(500.0),
        ));
        let rule = Chaboche::new(
            iso,
            vec![Interpolate::constant(2000.0), Interpolate::constant(400.0)],
            vec![Gamma::Constant { g: 50.0 }, Gamma::Saturating {
                gs: 10.0,
                g0: 30.0,
                beta: 80.0,
            }],
        )
        .unwrap();
        assert_eq!(rule.ninter(), 7);
        assert_eq!(rule.nhist(), 13);

        let stress = Tensor2::from_matrix(
            &[[80.0, 20.0, 0.0], [20.0, -30.0, 10.0], [0.0, 10.0, 5.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let mut alpha = Vector::new(13);
        alpha[0] = 0.002;
        for i in 0..12 {
            alpha[1 + i] = 0.5 * ((i as f64) - 6.0);
        }

        // dh_da
        let step = 1e-6;
        let mut dh = Matrix::new(13, 13);
        rule.dh_da(&stress, &alpha, 0.0, &mut dh).unwrap();
        let mut hp = Vector::new(13);
        let mut hm = Vector::new(13);
        for j in 0..13 {
            alpha[j] += step;
            rule.h(&stress, &alpha, 0.0, &mut hp).unwrap();
            alpha[j] -= 2.0 * step;
            rule.h(&stress, &alpha, 0.0, &mut hm).unwrap();
            alpha[j] += step;
            for i in 0..13 {
                approx_eq(dh.get(i, j), (hp[i] - hm[i]) / (2.0 * step), 1e-5);
            }
        }

        // dh_ds
        let mut dhs = Matrix::new(13, 6);
        rule.dh_ds(&stress, &alpha, 0.0, &mut dhs).unwrap();
        for j in 0..6 {
            let mut sp = stress.clone();
            sp.vector_mut()[j] += step;
            rule.h(&sp, &alpha, 0.0, &mut hp).unwrap();
            let mut sm = stress.clone();
            sm.vector_mut()[j] -= step;
            rule.h(&sm, &alpha, 0.0, &mut hm).unwrap();
            for i in 0..13 {
                approx_eq(dhs.get(i, j), (hp[i] - hm[i]) / (2.0 * step), 1e-5);
            }
        }

        // dq_da
        let mut dq = Matrix::new(7, 13);
        rule.dq_da(&alpha, 0.0, &mut dq).unwrap();
        let mut qp = Vector::new(7);
        let mut qm = Vector::new(7);
        for j in 0..13 {
            alpha[j] += step;
            rule.q(&alpha, 0.0, &mut qp).unwrap();
            alpha[j] -= 2.0 * step;
            rule.q(&alpha, 0.0, &mut qm).unwrap();
            alpha[j] += step;
            for i in 0..7 {
                approx_eq(dq.get(i, j), (qp[i] - qm[i]) / (2.0 * step), 1e-6);
            }
        }
    }
}
