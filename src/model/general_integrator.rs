use super::{trapezoid_energy, MaterialModel, ModelBase};
use crate::base::Error;
use crate::material::{ElasticModel, Interpolate, LocalState, ViscoPlasticFlowRule};
use crate::solver::{newton_solve, NonlinearSystem};
use russell_lab::{mat_inverse, Matrix, Vector};
use russell_tensor::{t2_add, t4_ddot_t2, Mandel, Tensor2, Tensor4};
use std::sync::Arc;

/// Implements the backward-Euler integrator for rate-dependent flow
///
/// The unknowns are (σₙ₊₁, αₙ₊₁) and the residuals discretize the
/// viscoplastic evolution implicitly:
///
/// ```text
/// R_σ = σ - σₙ - C(T) : (Δε - Δt ẏ g)
/// R_α = α - αₙ - Δt ẏ h
/// ```
///
/// A zero time increment degenerates to the elastic update. Non-convergence
/// triggers adaptive substepping up to `max_divide` levels.
pub struct GeneralIntegrator {
    base: ModelBase,
    flow: Box<dyn ViscoPlasticFlowRule>,
    tol: f64,
    miter: usize,
    verbose: bool,
    max_divide: usize,
}

/// Defines the backward-Euler system on x = (σ, α)
struct ViscoPlasticSystem<'a> {
    flow: &'a dyn ViscoPlasticFlowRule,
    dd: &'a Tensor4,
    stress_old: &'a Tensor2,
    alpha_old: &'a Vector,
    deps: &'a Tensor2,
    dt: f64,
    temperature: f64,
    nh: usize,
    // scratch
    sigma: Tensor2,
    alpha: Vector,
    g: Tensor2,
    h: Vector,
    dy_ds: Tensor2,
    dy_da: Vector,
    dg_ds: Tensor4,
    dg_da: Matrix,
    dh_ds: Matrix,
    dh_da: Matrix,
    inelastic: Tensor2,
    dsigma: Tensor2,
}

impl<'a> ViscoPlasticSystem<'a> {
    fn new(
        flow: &'a dyn ViscoPlasticFlowRule,
        dd: &'a Tensor4,
        stress_old: &'a Tensor2,
        alpha_old: &'a Vector,
        deps: &'a Tensor2,
        dt: f64,
        temperature: f64,
    ) -> Self {
        let nh = flow.nhist();
        ViscoPlasticSystem {
            flow,
            dd,
            stress_old,
            alpha_old,
            deps,
            dt,
            temperature,
            nh,
            sigma: Tensor2::new(Mandel::Symmetric),
            alpha: Vector::new(nh),
            g: Tensor2::new(Mandel::Symmetric),
            h: Vector::new(nh),
            dy_ds: Tensor2::new(Mandel::Symmetric),
            dy_da: Vector::new(nh),
            dg_ds: Tensor4::new(Mandel::Symmetric),
            dg_da: Matrix::new(6, nh),
            dh_ds: Matrix::new(nh, 6),
            dh_da: Matrix::new(nh, nh),
            inelastic: Tensor2::new(Mandel::Symmetric),
            dsigma: Tensor2::new(Mandel::Symmetric),
        }
    }
}

impl<'a> NonlinearSystem for ViscoPlasticSystem<'a> {
    fn dim(&self) -> usize {
        6 + self.nh
    }

    fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
        let (nh, tt, dt) = (self.nh, self.temperature, self.dt);
        {
            let v = self.sigma.vector_mut();
            for i in 0..6 {
                v[i] = x[i];
            }
        }
        for i in 0..nh {
            self.alpha[i] = x[6 + i];
        }

        let y = self.flow.y(&self.sigma, &self.alpha, tt)?;
        self.flow.dy_ds(&self.sigma, &self.alpha, tt, &mut self.dy_ds)?;
        self.flow.dy_da(&self.sigma, &self.alpha, tt, &mut self.dy_da)?;
        self.flow.g(&self.sigma, &self.alpha, tt, &mut self.g)?;
        self.flow.dg_ds(&self.sigma, &self.alpha, tt, &mut self.dg_ds)?;
        self.flow.dg_da(&self.sigma, &self.alpha, tt, &mut self.dg_da)?;
        self.flow.h(&self.sigma, &self.alpha, tt, &mut self.h)?;
        self.flow.dh_ds(&self.sigma, &self.alpha, tt, &mut self.dh_ds)?;
        self.flow.dh_da(&self.sigma, &self.alpha, tt, &mut self.dh_da)?;

        // R_σ = σ - σₙ - C : (Δε - Δt ẏ g)
        {
            let v = self.inelastic.vector_mut();
            for i in 0..6 {
                v[i] = self.deps.vector()[i] - dt * y * self.g.vector()[i];
            }
        }
        t4_ddot_t2(&mut self.dsigma, 1.0, self.dd, &self.inelastic);
        for i in 0..6 {
            rr[i] = x[i] - self.stress_old.vector()[i] - self.dsigma.vector()[i];
        }
        for i in 0..nh {
            rr[6 + i] = self.alpha[i] - self.alpha_old[i] - dt * y * self.h[i];
        }

        // J_σσ = I + Δt C (g ⊗ ∂ẏ/∂σ + ẏ ∂g/∂σ)
        let cc = self.dd.matrix();
        let dg_ds = self.dg_ds.matrix();
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += cc.get(i, k) * (self.g.vector()[k] * self.dy_ds.vector()[j] + y * dg_ds.get(k, j));
                }
                let delta = if i == j { 1.0 } else { 0.0 };
                jj.set(i, j, delta + dt * sum);
            }
            for j in 0..nh {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += cc.get(i, k) * (self.g.vector()[k] * self.dy_da[j] + y * self.dg_da.get(k, j));
                }
                jj.set(i, 6 + j, dt * sum);
            }
        }
        for i in 0..nh {
            for j in 0..6 {
                jj.set(6 + i, j, -dt * (self.h[i] * self.dy_ds.vector()[j] + y * self.dh_ds.get(i, j)));
            }
            for j in 0..nh {
                let delta = if i == j { 1.0 } else { 0.0 };
                jj.set(6 + i, 6 + j, delta - dt * (self.h[i] * self.dy_da[j] + y * self.dh_da.get(i, j)));
            }
        }
        Ok(())
    }
}

impl GeneralIntegrator {
    /// Allocates a new instance
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        elastic: Arc<dyn ElasticModel>,
        flow: Box<dyn ViscoPlasticFlowRule>,
        cte: Interpolate,
        tol: f64,
        miter: usize,
        verbose: bool,
        max_divide: usize,
    ) -> Self {
        GeneralIntegrator {
            base: ModelBase::new(elastic, cte),
            flow,
            tol,
            miter,
            verbose,
            max_divide,
        }
    }

    /// Updates over one (sub)step without subdivision
    #[allow(clippy::too_many_arguments)]
    fn update_substep(
        &self,
        strain_new: &Tensor2,
        strain_old: &Tensor2,
        temperature_new: f64,
        temperature_old: f64,
        time_new: f64,
        time_old: f64,
        state_old: &LocalState,
        state_new: &mut LocalState,
        stiffness: &mut Tensor4,
    ) -> Result<(), Error> {
        let nh = self.flow.nhist();
        let dt = time_new - time_old;

        // mechanical strain increment
        let mut deps = Tensor2::new(Mandel::Symmetric);
        self.base
            .mechanical_strain_increment(strain_new, strain_old, temperature_new, temperature_old, &mut deps);

        let mut dd = Tensor4::new(Mandel::Symmetric);
        self.base.elastic.modulus(temperature_new, &mut dd)?;

        // trial elastic stress
        let mut dsigma = Tensor2::new(Mandel::Symmetric);
        t4_ddot_t2(&mut dsigma, 1.0, &dd, &deps);
        let mut stress_trial = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut stress_trial, 1.0, &state_old.stress, 1.0, &dsigma);

        if dt <= 0.0 {
            // instantaneous step: elastic response, frozen history
            state_new.stress.set_tensor(1.0, &stress_trial);
            for i in 0..nh {
                state_new.internal_values[i] = state_old.internal_values[i];
            }
            stiffness.set_tensor(1.0, &dd);
        } else {
            let mut alpha_old = Vector::new(nh);
            for i in 0..nh {
                alpha_old[i] = state_old.internal_values[i];
            }
            let mut system = ViscoPlasticSystem::new(
                self.flow.as_ref(),
                &dd,
                &state_old.stress,
                &alpha_old,
                &deps,
                dt,
                temperature_new,
            );
            let mut x = Vector::new(6 + nh);
            for i in 0..6 {
                x[i] = stress_trial.vector()[i];
            }
            for i in 0..nh {
                x[6 + i] = alpha_old[i];
            }
            newton_solve(&mut system, &mut x, self.tol, self.miter, self.verbose)?;

            {
                let v = state_new.stress.vector_mut();
                for i in 0..6 {
                    v[i] = x[i];
                }
            }
            for i in 0..nh {
                state_new.internal_values[i] = x[6 + i];
            }
            self.calc_tangent(&mut system, &x, stiffness)?;
        }

        // energy over the total strain increment and dissipation over Δεᵛᵖ
        let mut dstrain = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut dstrain, 1.0, strain_new, -1.0, strain_old);
        state_new.strain_energy =
            state_old.strain_energy + trapezoid_energy(&state_old.stress, &state_new.stress, &dstrain);
        let mut ee_old = Tensor2::new(Mandel::Symmetric);
        self.base.elastic_strains(&state_old.stress, temperature_old, &mut ee_old)?;
        let mut ee_new = Tensor2::new(Mandel::Symmetric);
        self.base.elastic_strains(&state_new.stress, temperature_new, &mut ee_new)?;
        let mut deps_p = Tensor2::new(Mandel::Symmetric);
        {
            let v = deps_p.vector_mut();
            for i in 0..6 {
                v[i] = deps.vector()[i] - (ee_new.vector()[i] - ee_old.vector()[i]);
            }
        }
        state_new.plastic_dissipation =
            state_old.plastic_dissipation + trapezoid_energy(&state_old.stress, &state_new.stress, &deps_p);
        Ok(())
    }

    /// Linearizes the converged residual with respect to Δε and extracts A
    fn calc_tangent(&self, system: &mut ViscoPlasticSystem, x: &Vector, stiffness: &mut Tensor4) -> Result<(), Error> {
        let nh = system.nh;
        let dim = 6 + nh;
        let mut rr = Vector::new(dim);
        let mut jj = Matrix::new(dim, dim);
        system.residual_jacobian(x, &mut rr, &mut jj)?;
        let mut jj_inv = Matrix::new(dim, dim);
        mat_inverse(&mut jj_inv, &jj).map_err(|_| Error::LinalgFailure)?;

        // dx/dε = J⁻¹ [C; 0] and A = (dσ/dε)
        let cc = system.dd.matrix();
        let mat = stiffness.matrix_mut();
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += jj_inv.get(i, k) * cc.get(k, j);
                }
                mat.set(i, j, sum);
            }
        }
        Ok(())
    }

    /// Updates with adaptive subdivision on non-convergence
    #[allow(clippy::too_many_arguments)]
    fn update_adaptive(
        &self,
        strain_new: &Tensor2,
        strain_old: &Tensor2,
        temperature_new: f64,
        temperature_old: f64,
        time_new: f64,
        time_old: f64,
        state_old: &LocalState,
        state_new: &mut LocalState,
        stiffness: &mut Tensor4,
        depth: usize,
    ) -> Result<(), Error> {
        match self.update_substep(
            strain_new,
            strain_old,
            temperature_new,
            temperature_old,
            time_new,
            time_old,
            state_old,
            state_new,
            stiffness,
        ) {
            Err(Error::MaxIterations) | Err(Error::LinalgFailure) if depth < self.max_divide => {
                let mut strain_mid = Tensor2::new(Mandel::Symmetric);
                t2_add(&mut strain_mid, 0.5, strain_new, 0.5, strain_old);
                let temperature_mid = 0.5 * (temperature_new + temperature_old);
                let time_mid = 0.5 * (time_new + time_old);
                let mut state_mid = LocalState::new(self.nstore());
                self.update_adaptive(
                    &strain_mid,
                    strain_old,
                    temperature_mid,
                    temperature_old,
                    time_mid,
                    time_old,
                    state_old,
                    &mut state_mid,
                    stiffness,
                    depth + 1,
                )?;
                self.update_adaptive(
                    strain_new,
                    &strain_mid,
                    temperature_new,
                    temperature_mid,
                    time_new,
                    time_mid,
                    &state_mid,
                    state_new,
                    stiffness,
                    depth + 1,
                )
            }
            result => result,
        }
    }
}

impl MaterialModel for GeneralIntegrator {
    fn nhist(&self) -> usize {
        self.flow.nhist()
    }

    fn init_hist(&self, hist: &mut Vector) -> Result<(), Error> {
        self.flow.init_hist(hist)
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
        time_new: f64,
        time_old: f64,
        state_old: &LocalState,
        state_new: &mut LocalState,
        stiffness: &mut Tensor4,
    ) -> Result<(), Error> {
        self.update_adaptive(
            strain_new,
            strain_old,
            temperature_new,
            temperature_old,
            time_new,
            time_old,
            state_old,
            state_new,
            stiffness,
            0,
        )
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::GeneralIntegrator;
    use crate::base::Error;
    use crate::material::{
        Interpolate, IsoReduced, IsotropicLinearElasticity, J2Surface, LinearIsotropicHardening, PerzynaFlowRule,
        PowerLawOverstress, ViscoPlasticFlowRule,
    };
    use crate::model::MaterialModel;
    use russell_lab::{approx_eq, Matrix, Vector};
    use russell_tensor::{Mandel, Tensor2, Tensor4};
    use std::sync::Arc;

    fn perzyna_model(eta: f64) -> GeneralIntegrator {
        let elastic = Arc::new(IsotropicLinearElasticity::new_young_poisson(
            Interpolate::constant(150000.0),
            Interpolate::constant(0.3),
        ));
        let flow = Box::new(
            PerzynaFlowRule::new(
                Box::new(IsoReduced::new(J2Surface::new())),
                Box::new(LinearIsotropicHardening::new(
                    Interpolate::constant(100.0),
                    Interpolate::constant(2000.0),
                )),
                Box::new(PowerLawOverstress::new(2.0)),
                Interpolate::constant(eta),
            )
            .unwrap(),
        );
        GeneralIntegrator::new(elastic, flow, Interpolate::constant(0.0), 1e-12, 50, false, 6)
    }

    #[test]
    fn zero_time_increment_is_a_fixed_point() {
        let model = perzyna_model(1000.0);
        let mut state_old = model.new_state().unwrap();
        state_old.stress.vector_mut()[0] = 150.0;
        state_old.internal_values[0] = 0.01;
        let mut state_new = model.new_state().unwrap();
        let strain = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain, &strain, 293.0, 293.0, 5.0, 5.0, &state_old, &mut state_new, &mut aa)
            .unwrap();
        approx_eq(state_new.stress.vector()[0], 150.0, 1e-14);
        assert_eq!(state_new.internal_values[0], 0.01);
        // A = C at the fixed point
        let gg = 150000.0 / 2.6;
        let kk = 150000.0 / 1.2;
        approx_eq(aa.matrix().get(0, 0), kk + 4.0 * gg / 3.0, 1e-9);
    }

    #[test]
    fn elastic_inside_the_surface() {
        let model = perzyna_model(1000.0);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_new = Tensor2::from_matrix(
            &[[2e-4, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut state_new, &mut aa)
            .unwrap();
        let lambda = 150000.0 * 0.3 / (1.3 * 0.4);
        let two_g = 150000.0 / 1.3;
        approx_eq(state_new.stress.vector()[0], (lambda + two_g) * 2e-4, 1e-9);
        assert_eq!(state_new.internal_values[0], 0.0);
    }

    #[test]
    fn stress_relaxation_decays_toward_the_surface() {
        // hold strain beyond yield: stress relaxes as Δt grows
        let model = perzyna_model(100.0);
        let strain = Tensor2::from_matrix(
            &[[4e-3, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);

        // load fast (dt -> 0 keeps it almost elastic)
        let mut loaded = model.new_state().unwrap();
        let state0 = model.new_state().unwrap();
        model
            .update(&strain, &strain_old, 293.0, 293.0, 1e-8, 0.0, &state0, &mut loaded, &mut aa)
            .unwrap();
        let sigma_d_initial = loaded.stress.invariant_sigma_d();

        // hold with increasing time increments
        let mut prev = sigma_d_initial;
        let mut state = model.new_state().unwrap();
        state.mirror(&loaded);
        let mut time = 1e-8;
        for dt in [0.01, 0.1, 1.0] {
            let mut next = model.new_state().unwrap();
            model
                .update(&strain, &strain, 293.0, 293.0, time + dt, time, &state, &mut next, &mut aa)
                .unwrap();
            let sigma_d = next.stress.invariant_sigma_d();
            assert!(sigma_d < prev);
            prev = sigma_d;
            state.mirror(&next);
            time += dt;
        }
    }

    #[test]
    fn tangent_matches_finite_differences() {
        let model = perzyna_model(50.0);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let strain_new = Tensor2::from_matrix(
            &[[3e-3, 2e-4, 0.0], [2e-4, -1e-3, 0.0], [0.0, 0.0, 5e-4]],
            Mandel::Symmetric,
        )
        .unwrap();
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 0.5, 0.0, &state_old, &mut state_new, &mut aa)
            .unwrap();
        assert!(state_new.internal_values[0] > 0.0); // viscoplastic step

        let h = 1e-7;
        let mut sp = model.new_state().unwrap();
        let mut sm = model.new_state().unwrap();
        let mut aux = Tensor4::new(Mandel::Symmetric);
        for j in 0..6 {
            let mut strain_p = strain_new.clone();
            strain_p.vector_mut()[j] += h;
            let mut strain_m = strain_new.clone();
            strain_m.vector_mut()[j] -= h;
            model
                .update(&strain_p, &strain_old, 293.0, 293.0, 0.5, 0.0, &state_old, &mut sp, &mut aux)
                .unwrap();
            model
                .update(&strain_m, &strain_old, 293.0, 293.0, 0.5, 0.0, &state_old, &mut sm, &mut aux)
                .unwrap();
            for i in 0..6 {
                let num = (sp.stress.vector()[i] - sm.stress.vector()[i]) / (2.0 * h);
                let den = f64::max(f64::abs(num), 1.0);
                assert!(f64::abs(aa.matrix().get(i, j) - num) / den < 1e-5);
            }
        }
    }

    /// Switches a constant flow rate on above a von Mises threshold while
    /// reporting zero partials. A backward-Euler substep whose implicit
    /// pullback crosses the threshold has no root (the residual norm is
    /// bounded away from zero on both branches), so Newton must fail; a
    /// substep staying on one side converges in at most one step.
    struct ThresholdFlow {
        sd_on: f64,
        rate: f64,
    }

    impl ViscoPlasticFlowRule for ThresholdFlow {
        fn nhist(&self) -> usize {
            1
        }
        fn init_hist(&self, alpha: &mut Vector) -> Result<(), Error> {
            alpha.fill(0.0);
            Ok(())
        }
        fn y(&self, stress: &Tensor2, _alpha: &Vector, _temperature: f64) -> Result<f64, Error> {
            if stress.invariant_sigma_d() >= self.sd_on {
                Ok(self.rate)
            } else {
                Ok(0.0)
            }
        }
        fn dy_ds(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
            out.vector_mut().fill(0.0);
            Ok(())
        }
        fn dy_da(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Vector) -> Result<(), Error> {
            out.fill(0.0);
            Ok(())
        }
        fn g(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
            // fixed deviatoric direction of a uniaxial stress state
            let v = out.vector_mut();
            v.fill(0.0);
            v[0] = 2.0 / 3.0;
            v[1] = -1.0 / 3.0;
            v[2] = -1.0 / 3.0;
            Ok(())
        }
        fn dg_ds(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
            out.matrix_mut().fill(0.0);
            Ok(())
        }
        fn dg_da(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Matrix) -> Result<(), Error> {
            out.fill(0.0);
            Ok(())
        }
        fn h(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Vector) -> Result<(), Error> {
            out.fill(0.0);
            Ok(())
        }
        fn dh_ds(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Matrix) -> Result<(), Error> {
            out.fill(0.0);
            Ok(())
        }
        fn dh_da(&self, _stress: &Tensor2, _alpha: &Vector, _temperature: f64, out: &mut Matrix) -> Result<(), Error> {
            out.fill(0.0);
            Ok(())
        }
    }

    fn threshold_model(max_divide: usize) -> GeneralIntegrator {
        let elastic = Arc::new(IsotropicLinearElasticity::new_young_poisson(
            Interpolate::constant(150000.0),
            Interpolate::constant(0.3),
        ));
        // the implicit pullback lowers σ_d by Δt·rate·2G = Δt·300
        let two_g = 150000.0 / 1.3;
        let flow = Box::new(ThresholdFlow {
            sd_on: 350.0,
            rate: 300.0 / two_g,
        });
        GeneralIntegrator::new(elastic, flow, Interpolate::constant(0.0), 1e-12, 5, false, max_divide)
    }

    #[test]
    fn adaptive_substepping_recovers_from_max_iterations() {
        // full step (Δt = 1): trial σ_d = 2G·4e-3 ≈ 461.5 is active and the
        // pullback of 300 crosses the 350 switch, so Newton cannot converge;
        // halving twice shrinks the pullback to 75, the last quarter stays
        // active (461.5 - 75 ≈ 386.5 ≥ 350), and the earlier quarters are
        // elastic, so the bisection recovers at depth 2
        let model = threshold_model(4);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_new = Tensor2::from_matrix(
            &[[4e-3, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut state_new, &mut aa)
            .unwrap();
        let two_g = 150000.0 / 1.3;
        approx_eq(state_new.stress.invariant_sigma_d(), two_g * 4e-3 - 75.0, 1e-9);
        approx_eq(state_new.stress.invariant_sigma_m(), 150000.0 / 1.2 * 4e-3, 1e-9);
        assert_eq!(state_new.internal_values[0], 0.0);
    }

    #[test]
    fn exhausted_subdivision_propagates_the_error() {
        // with max_divide = 0 the same step must surface the original failure
        let model = threshold_model(0);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_new = Tensor2::from_matrix(
            &[[4e-3, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);
        let status =
            model.update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut state_new, &mut aa);
        assert_eq!(status.err(), Some(Error::MaxIterations));
    }

    #[test]
    fn substep_equivalence_holds() {
        let model = perzyna_model(50.0);
        let state_old = model.new_state().unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let strain_new = Tensor2::from_matrix(
            &[[4e-3, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let mut aa = Tensor4::new(Mandel::Symmetric);

        let mut one = model.new_state().unwrap();
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut one, &mut aa)
            .unwrap();

        let mut strain_mid = Tensor2::new(Mandel::Symmetric);
        russell_tensor::t2_add(&mut strain_mid, 0.5, &strain_new, 0.5, &strain_old);
        let mut mid = model.new_state().unwrap();
        let mut two = model.new_state().unwrap();
        model
            .update(&strain_mid, &strain_old, 293.0, 293.0, 0.5, 0.0, &state_old, &mut mid, &mut aa)
            .unwrap();
        model
            .update(&strain_new, &strain_mid, 293.0, 293.0, 1.0, 0.5, &mid, &mut two, &mut aa)
            .unwrap();

        // backward Euler is O(Δt) accurate: the two-substep result is close
        for i in 0..6 {
            let denom = f64::max(f64::abs(one.stress.vector()[i]), 1.0);
            assert!(f64::abs(one.stress.vector()[i] - two.stress.vector()[i]) / denom < 0.05);
        }
    }
}
