use super::{trapezoid_energy, MaterialModel, ModelBase};
use crate::base::Error;
use crate::material::{ElasticModel, Interpolate, LocalState, RateIndependentFlowRule};
use crate::solver::{newton_solve, NonlinearSystem};
use russell_lab::{mat_inverse, Matrix, Vector};
use russell_tensor::{t2_add, t4_ddot_t2, Mandel, Tensor2, Tensor4};
use std::sync::Arc;

/// Implements small-strain rate-independent plasticity with hardening
///
/// The update is a generalized closest-point projection on the unknowns
/// (εᵖₙ₊₁, αₙ₊₁, Δγ):
///
/// ```text
/// R_εᵖ = εᵖ - εᵖₙ - Δγ g(σ, α, T)
/// R_α  = α  - αₙ  - Δγ h(σ, α, T)
/// R_f  = f(σ, α, T)          with σ = C(T) : (ε - εᵖ)
/// ```
///
/// The history is `h = [εᵖ(6), α(nh)]`. For non-associative flow the solver
/// can converge to a root violating the discrete Kuhn-Tucker conditions, so
/// feasibility (Δγ ≥ -kttol, f ≤ kttol) is checked after the return when
/// `check_kt` is enabled.
pub struct SmallStrainRateIndependentPlasticity {
    base: ModelBase,
    flow: Box<dyn RateIndependentFlowRule>,
    tol: f64,
    miter: usize,
    verbose: bool,
    kttol: f64,
    check_kt: bool,
}

/// Defines the closest-point-projection system on x = (εᵖ, α, Δγ)
struct RateIndependentSystem<'a> {
    flow: &'a dyn RateIndependentFlowRule,
    dd: &'a Tensor4,
    strain_eff: &'a Tensor2,
    ep_old: &'a Tensor2,
    alpha_old: &'a Vector,
    temperature: f64,
    nh: usize,
    // scratch
    ep: Tensor2,
    sigma: Tensor2,
    alpha: Vector,
    elastic_strain: Tensor2,
    g: Tensor2,
    h: Vector,
    df_ds: Tensor2,
    df_da: Vector,
    dg_ds: Tensor4,
    dg_da: Matrix,
    dh_ds: Matrix,
    dh_da: Matrix,
}

impl<'a> RateIndependentSystem<'a> {
    fn new(
        flow: &'a dyn RateIndependentFlowRule,
        dd: &'a Tensor4,
        strain_eff: &'a Tensor2,
        ep_old: &'a Tensor2,
        alpha_old: &'a Vector,
        temperature: f64,
    ) -> Self {
        let nh = flow.nhist();
        RateIndependentSystem {
            flow,
            dd,
            strain_eff,
            ep_old,
            alpha_old,
            temperature,
            nh,
            ep: Tensor2::new(Mandel::Symmetric),
            sigma: Tensor2::new(Mandel::Symmetric),
            alpha: Vector::new(nh),
            elastic_strain: Tensor2::new(Mandel::Symmetric),
            g: Tensor2::new(Mandel::Symmetric),
            h: Vector::new(nh),
            df_ds: Tensor2::new(Mandel::Symmetric),
            df_da: Vector::new(nh),
            dg_ds: Tensor4::new(Mandel::Symmetric),
            dg_da: Matrix::new(6, nh),
            dh_ds: Matrix::new(nh, 6),
            dh_da: Matrix::new(nh, nh),
        }
    }

    /// Computes σ = C : (ε_eff - εᵖ) for the current unknowns
    fn stress_of(&mut self, x: &Vector) {
        {
            let v = self.ep.vector_mut();
            for i in 0..6 {
                v[i] = x[i];
            }
        }
        for i in 0..self.nh {
            self.alpha[i] = x[6 + i];
        }
        t2_add(&mut self.elastic_strain, 1.0, self.strain_eff, -1.0, &self.ep);
        t4_ddot_t2(&mut self.sigma, 1.0, self.dd, &self.elastic_strain);
    }
}

impl<'a> NonlinearSystem for RateIndependentSystem<'a> {
    fn dim(&self) -> usize {
        7 + self.nh
    }

    fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
        let (nh, tt) = (self.nh, self.temperature);
        let dgamma = x[6 + nh];
        self.stress_of(x);

        let f = self.flow.f(&self.sigma, &self.alpha, tt)?;
        self.flow.df_ds(&self.sigma, &self.alpha, tt, &mut self.df_ds)?;
        self.flow.df_da(&self.sigma, &self.alpha, tt, &mut self.df_da)?;
        self.flow.g(&self.sigma, &self.alpha, tt, &mut self.g)?;
        self.flow.dg_ds(&self.sigma, &self.alpha, tt, &mut self.dg_ds)?;
        self.flow.dg_da(&self.sigma, &self.alpha, tt, &mut self.dg_da)?;
        self.flow.h(&self.sigma, &self.alpha, tt, &mut self.h)?;
        self.flow.dh_ds(&self.sigma, &self.alpha, tt, &mut self.dh_ds)?;
        self.flow.dh_da(&self.sigma, &self.alpha, tt, &mut self.dh_da)?;

        // residuals
        for i in 0..6 {
            rr[i] = self.ep.vector()[i] - self.ep_old.vector()[i] - dgamma * self.g.vector()[i];
        }
        for i in 0..nh {
            rr[6 + i] = self.alpha[i] - self.alpha_old[i] - dgamma * self.h[i];
        }
        rr[6 + nh] = f;

        // jacobian with ∂σ/∂εᵖ = -C
        let cc = self.dd.matrix();
        let dg_ds = self.dg_ds.matrix();
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += dg_ds.get(i, k) * cc.get(k, j);
                }
                let delta = if i == j { 1.0 } else { 0.0 };
                jj.set(i, j, delta + dgamma * sum);
            }
            for j in 0..nh {
                jj.set(i, 6 + j, -dgamma * self.dg_da.get(i, j));
            }
            jj.set(i, 6 + nh, -self.g.vector()[i]);
        }
        for i in 0..nh {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += self.dh_ds.get(i, k) * cc.get(k, j);
                }
                jj.set(6 + i, j, dgamma * sum);
            }
            for j in 0..nh {
                let delta = if i == j { 1.0 } else { 0.0 };
                jj.set(6 + i, 6 + j, delta - dgamma * self.dh_da.get(i, j));
            }
            jj.set(6 + i, 6 + nh, -self.h[i]);
        }
        for j in 0..6 {
            let mut sum = 0.0;
            for k in 0..6 {
                sum += self.df_ds.vector()[k] * cc.get(k, j);
            }
            jj.set(6 + nh, j, -sum);
        }
        for j in 0..nh {
            jj.set(6 + nh, 6 + j, self.df_da[j]);
        }
        jj.set(6 + nh, 6 + nh, 0.0);
        Ok(())
    }
}

impl SmallStrainRateIndependentPlasticity {
    /// Allocates a new instance
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        elastic: Arc<dyn ElasticModel>,
        flow: Box<dyn RateIndependentFlowRule>,
        cte: Interpolate,
        tol: f64,
        miter: usize,
        verbose: bool,
        kttol: f64,
        check_kt: bool,
    ) -> Self {
        SmallStrainRateIndependentPlasticity {
            base: ModelBase::new(elastic, cte),
            flow,
            tol,
            miter,
            verbose,
            kttol,
            check_kt,
        }
    }

    /// Verifies the discrete Kuhn-Tucker conditions at the converged point
    fn check_kuhn_tucker(&self, f: f64, dgamma: f64) -> Result<(), Error> {
        if dgamma < -self.kttol || f > self.kttol {
            return Err(Error::KtViolation);
        }
        Ok(())
    }

    /// Linearizes the converged residual with respect to Δε and extracts A
    fn calc_tangent(
        &self,
        system: &mut RateIndependentSystem,
        x: &Vector,
        stiffness: &mut Tensor4,
    ) -> Result<(), Error> {
        let nh = system.nh;
        let dim = 7 + nh;
        let dgamma = x[6 + nh];
        let mut rr = Vector::new(dim);
        let mut jj = Matrix::new(dim, dim);
        system.residual_jacobian(x, &mut rr, &mut jj)?;
        let mut jj_inv = Matrix::new(dim, dim);
        mat_inverse(&mut jj_inv, &jj).map_err(|_| Error::LinalgFailure)?;

        // rhs = -∂R/∂ε with ∂σ/∂ε = C
        let cc = system.dd.matrix();
        let dg_ds = system.dg_ds.matrix();
        let mut bb = Matrix::new(dim, 6);
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += dg_ds.get(i, k) * cc.get(k, j);
                }
                bb.set(i, j, dgamma * sum);
            }
        }
        for i in 0..nh {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += system.dh_ds.get(i, k) * cc.get(k, j);
                }
                bb.set(6 + i, j, dgamma * sum);
            }
        }
        for j in 0..6 {
            let mut sum = 0.0;
            for k in 0..6 {
                sum += system.df_ds.vector()[k] * cc.get(k, j);
            }
            bb.set(6 + nh, j, -sum);
        }

        // dεᵖ/dε = (J⁻¹ rhs)[0..6][0..6] and A = C (I - dεᵖ/dε)
        let mut dep_de = Matrix::new(6, 6);
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..dim {
                    sum += jj_inv.get(i, k) * bb.get(k, j);
                }
                dep_de.set(i, j, sum);
            }
        }
        let mat = stiffness.matrix_mut();
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    let delta = if k == j { 1.0 } else { 0.0 };
                    sum += cc.get(i, k) * (delta - dep_de.get(k, j));
                }
                mat.set(i, j, sum);
            }
        }
        Ok(())
    }
}

impl MaterialModel for SmallStrainRateIndependentPlasticity {
    fn nhist(&self) -> usize {
        6 + self.flow.nhist()
    }

    fn init_hist(&self, hist: &mut Vector) -> Result<(), Error> {
        let nh = self.flow.nhist();
        hist.fill(0.0);
        let mut alpha = Vector::new(nh);
        self.flow.init_hist(&mut alpha)?;
        for i in 0..nh {
            hist[6 + i] = alpha[i];
        }
        Ok(())
    }

    fn cte(&self, temperature: f64) -> f64 {
        self.base.cte.value(temperature)
    }

    fn shear(&self, temperature: f64) -> f64 {
        self.base.elastic.shear(temperature)
    }

    fn bulk(&self, temperature: f64) -> f64 {
        self.base.elastic.bulk(temperature)
    }

    fn elastic_strains(&self, stress: &Tensor2, temperature: f64, strain: &mut Tensor2) -> Result<(), Error> {
        self.base.elastic_strains(stress, temperature, strain)
    }

    fn set_elastic_model(&mut self, elastic: Arc<dyn ElasticModel>) -> Result<(), Error> {
        self.base.elastic = elastic;
        Ok(())
    }

    fn update(
        &self,
        strain_new: &Tensor2,
        strain_old: &Tensor2,
        temperature_new: f64,
        temperature_old: f64,
        _time_new: f64,
        _time_old: f64,
        state_old: &LocalState,
        state_new: &mut LocalState,
        stiffness: &mut Tensor4,
    ) -> Result<(), Error> {
        let nh = self.flow.nhist();

        // mechanical strain increment
        let mut deps = Tensor2::new(Mandel::Symmetric);
        self.base
            .mechanical_strain_increment(strain_new, strain_old, temperature_new, temperature_old, &mut deps);

        // unpack history
        let mut ep_old = Tensor2::new(Mandel::Symmetric);
        {
            let v = ep_old.vector_mut();
            for i in 0..6 {
                v[i] = state_old.internal_values[i];
            }
        }
        let mut alpha_old = Vector::new(nh);
        for i in 0..nh {
            alpha_old[i] = state_old.internal_values[6 + i];
        }

        // effective total strain: prior elastic + prior plastic + increment
        let mut dd = Tensor4::new(Mandel::Symmetric);
        self.base.elastic.modulus(temperature_new, &mut dd)?;
        let mut ee_old = Tensor2::new(Mandel::Symmetric);
        self.base.elastic_strains(&state_old.stress, temperature_old, &mut ee_old)?;
        let mut strain_eff = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut strain_eff, 1.0, &ee_old, 1.0, &ep_old);
        {
            let v = strain_eff.vector_mut();
            for i in 0..6 {
                v[i] += deps.vector()[i];
            }
        }

        // elastic predictor
        let mut ee_trial = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut ee_trial, 1.0, &strain_eff, -1.0, &ep_old);
        let mut stress_trial = Tensor2::new(Mandel::Symmetric);
        t4_ddot_t2(&mut stress_trial, 1.0, &dd, &ee_trial);
        let f_trial = self.flow.f(&stress_trial, &alpha_old, temperature_new)?;

        let dgamma;
        let f_final;
        if f_trial <= self.tol {
            state_new.stress.set_tensor(1.0, &stress_trial);
            for i in 0..self.nstore() {
                state_new.internal_values[i] = state_old.internal_values[i];
            }
            stiffness.set_tensor(1.0, &dd);
            dgamma = 0.0;
            f_final = f_trial;
        } else {
            // plastic corrector
            let mut system = RateIndependentSystem::new(
                self.flow.as_ref(),
                &dd,
                &strain_eff,
                &ep_old,
                &alpha_old,
                temperature_new,
            );
            let mut x = Vector::new(7 + nh);
            for i in 0..6 {
                x[i] = ep_old.vector()[i];
            }
            for i in 0..nh {
                x[6 + i] = alpha_old[i];
            }
            newton_solve(&mut system, &mut x, self.tol, self.miter, self.verbose)?;

            // new stress and history
            system.stress_of(&x);
            state_new.stress.set_tensor(1.0, &system.sigma);
            for i in 0..6 {
                state_new.internal_values[i] = x[i];
            }
            for i in 0..nh {
                state_new.internal_values[6 + i] = x[6 + i];
            }
            dgamma = x[6 + nh];
            f_final = self.flow.f(&state_new.stress, &system.alpha, temperature_new)?;
            self.calc_tangent(&mut system, &x, stiffness)?;
        }

        if self.check_kt {
            self.check_kuhn_tucker(f_final, dgamma)?;
        }

        // energy over the total strain increment and dissipation over Δεᵖ
        let mut dstrain = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut dstrain, 1.0, strain_new, -1.0, strain_old);
        state_new.strain_energy =
            state_old.strain_energy + trapezoid_energy(&state_old.stress, &state_new.stress, &dstrain);
        let mut deps_p = Tensor2::new(Mandel::Symmetric);
        {
            let v = deps_p.vector_mut();
            for i in 0..6 {
                v[i] = state_new.internal_values[i] - state_old.internal_values[i];
            }
        }
        state_new.plastic_dissipation =
            state_old.plastic_dissipation + trapezoid_energy(&state_old.stress, &state_new.stress, &deps_p);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
