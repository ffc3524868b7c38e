use super::{trapezoid_energy, MaterialModel, ModelBase};
use crate::base::Error;
use crate::material::{ElasticModel, Interpolate, LocalState, YieldSurface};
use crate::solver::{newton_solve, NonlinearSystem};
use russell_lab::{mat_inverse, Matrix, Vector};
use russell_tensor::{t2_add, t4_ddot_t2, Mandel, Tensor2, Tensor4};
use std::sync::Arc;

/// Implements small-strain associative perfect plasticity
///
/// The update is a generalized closest-point projection on the 7 unknowns
/// (σₙ₊₁, Δγ):
///
/// ```text
/// R_σ = σ - σ_trial + Δγ C : ∂f/∂σ
/// R_f = f(σ, -σ_y(T), T)
/// ```
///
/// For a J2 surface this degenerates to radial return. The elastic predictor
/// is accepted directly whenever it is feasible. Non-convergence triggers
/// adaptive substepping up to `max_divide` levels.
pub struct SmallStrainPerfectPlasticity {
    base: ModelBase,
    surface: Box<dyn YieldSurface>,
    yield_stress: Interpolate,
    tol: f64,
    miter: usize,
    verbose: bool,
    max_divide: usize,
}

/// Holds the trial state of a perfect-plasticity substep
struct PerfectPlasticityTrial {
    dd: Tensor4,
    stress_trial: Tensor2,
    q: Vector,
    temperature: f64,
}

/// Defines the closest-point-projection system on x = (σ, Δγ)
struct PerfectPlasticitySystem<'a> {
    surface: &'a dyn YieldSurface,
    trial: &'a PerfectPlasticityTrial,
    sigma: Tensor2,
    df: Tensor2,
    ddf: Tensor4,
    c_df: Tensor2,
}

impl<'a> PerfectPlasticitySystem<'a> {
    fn new(surface: &'a dyn YieldSurface, trial: &'a PerfectPlasticityTrial) -> Self {
        PerfectPlasticitySystem {
            surface,
            trial,
            sigma: Tensor2::new(Mandel::Symmetric),
            df: Tensor2::new(Mandel::Symmetric),
            ddf: Tensor4::new(Mandel::Symmetric),
            c_df: Tensor2::new(Mandel::Symmetric),
        }
    }
}

impl<'a> NonlinearSystem for PerfectPlasticitySystem<'a> {
    fn dim(&self) -> usize {
        7
    }

    fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
        let tt = self.trial.temperature;
        {
            let v = self.sigma.vector_mut();
            for i in 0..6 {
                v[i] = x[i];
            }
        }
        let dgamma = x[6];

        let f = self.surface.f(&self.sigma, &self.trial.q, tt)?;
        self.surface.df_ds(&self.sigma, &self.trial.q, tt, &mut self.df)?;
        self.surface.df_dsds(&self.sigma, &self.trial.q, tt, &mut self.ddf)?;
        t4_ddot_t2(&mut self.c_df, 1.0, &self.trial.dd, &self.df);

        for i in 0..6 {
            rr[i] = x[i] - self.trial.stress_trial.vector()[i] + dgamma * self.c_df.vector()[i];
        }
        rr[6] = f;

        // J_σσ = I + Δγ C·∂²f/∂σ²
        let cc = self.trial.dd.matrix();
        let hh = self.ddf.matrix();
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += cc.get(i, k) * hh.get(k, j);
                }
                let delta = if i == j { 1.0 } else { 0.0 };
                jj.set(i, j, delta + dgamma * sum);
            }
            jj.set(i, 6, self.c_df.vector()[i]);
            jj.set(6, i, self.df.vector()[i]);
        }
        jj.set(6, 6, 0.0);
        Ok(())
    }
}

impl SmallStrainPerfectPlasticity {
    /// Allocates a new instance; fails unless the surface expects a single
    /// stress-like variable (the negative yield stress)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        elastic: Arc<dyn ElasticModel>,
        surface: Box<dyn YieldSurface>,
        yield_stress: Interpolate,
        cte: Interpolate,
        tol: f64,
        miter: usize,
        verbose: bool,
        max_divide: usize,
    ) -> Result<Self, Error> {
        if surface.nhist() != 1 {
            return Err(Error::IncompatibleModels);
        }
        Ok(SmallStrainPerfectPlasticity {
            base: ModelBase::new(elastic, cte),
            surface,
            yield_stress,
            tol,
            miter,
            verbose,
            max_divide,
        })
    }

    /// Returns the yield stress at the given temperature
    pub fn ys(&self, temperature: f64) -> f64 {
        self.yield_stress.value(temperature)
    }

    /// Updates over one (sub)step without subdivision
    #[allow(clippy::too_many_arguments)]
    fn update_substep(
        &self,
        strain_new: &Tensor2,
        strain_old: &Tensor2,
        temperature_new: f64,
        temperature_old: f64,
        state_old: &LocalState,
        state_new: &mut LocalState,
        stiffness: &mut Tensor4,
    ) -> Result<(), Error> {
        // mechanical strain increment
        let mut deps = Tensor2::new(Mandel::Symmetric);
        self.base
            .mechanical_strain_increment(strain_new, strain_old, temperature_new, temperature_old, &mut deps);

        // trial state: σ_trial = C(Tₙ₊₁) : (S(Tₙ)σₙ + Δε)
        let mut dd = Tensor4::new(Mandel::Symmetric);
        self.base.elastic.modulus(temperature_new, &mut dd)?;
        let mut ee_old = Tensor2::new(Mandel::Symmetric);
        self.base.elastic_strains(&state_old.stress, temperature_old, &mut ee_old)?;
        let mut ee_trial = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut ee_trial, 1.0, &ee_old, 1.0, &deps);
        let mut stress_trial = Tensor2::new(Mandel::Symmetric);
        t4_ddot_t2(&mut stress_trial, 1.0, &dd, &ee_trial);
        let mut q = Vector::new(1);
        q[0] = -self.ys(temperature_new);
        let trial = PerfectPlasticityTrial {
            dd,
            stress_trial,
            q,
            temperature: temperature_new,
        };

        // elastic predictor (tolerate converged-state roundoff on the surface)
        let f_trial = self.surface.f(&trial.stress_trial, &trial.q, temperature_new)?;
        if f_trial <= self.tol {
            state_new.stress.set_tensor(1.0, &trial.stress_trial);
            stiffness.set_tensor(1.0, &trial.dd);
        } else {
            // plastic corrector
            let mut system = PerfectPlasticitySystem::new(self.surface.as_ref(), &trial);
            let mut x = Vector::new(7);
            for i in 0..6 {
                x[i] = trial.stress_trial.vector()[i];
            }
            newton_solve(&mut system, &mut x, self.tol, self.miter, self.verbose)?;
            {
                let v = state_new.stress.vector_mut();
                for i in 0..6 {
                    v[i] = x[i];
                }
            }
            self.calc_tangent(&mut system, &x, stiffness)?;
        }

        // energy over the total strain increment and dissipation over Δεᵖ
        let mut dstrain = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut dstrain, 1.0, strain_new, -1.0, strain_old);
        state_new.strain_energy =
            state_old.strain_energy + trapezoid_energy(&state_old.stress, &state_new.stress, &dstrain);
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
    fn calc_tangent(
        &self,
        system: &mut PerfectPlasticitySystem,
        x: &Vector,
        stiffness: &mut Tensor4,
    ) -> Result<(), Error> {
        let mut rr = Vector::new(7);
        let mut jj = Matrix::new(7, 7);
        system.residual_jacobian(x, &mut rr, &mut jj)?;
        let mut jj_inv = Matrix::new(7, 7);
        mat_inverse(&mut jj_inv, &jj).map_err(|_| Error::LinalgFailure)?;

        // dx/dε = J⁻¹ [C; 0] and A = (dx/dε)[0..6][0..6]
        let cc = system.trial.dd.matrix();
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
            state_old,
            state_new,
            stiffness,
        ) {
            Err(Error::MaxIterations) | Err(Error::LinalgFailure) if depth < self.max_divide => {
                let mut strain_mid = Tensor2::new(Mandel::Symmetric);
                t2_add(&mut strain_mid, 0.5, strain_new, 0.5, strain_old);
                let temperature_mid = 0.5 * (temperature_new + temperature_old);
                let mut state_mid = LocalState::new(self.nstore());
                self.update_adaptive(
                    &strain_mid,
                    strain_old,
                    temperature_mid,
                    temperature_old,
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

impl MaterialModel for SmallStrainPerfectPlasticity {
    fn nhist(&self) -> usize {
        0
    }

    fn init_hist(&self, _hist: &mut Vector) -> Result<(), Error> {
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
        self.update_adaptive(
            strain_new,
            strain_old,
            temperature_new,
            temperature_old,
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
    use super::SmallStrainPerfectPlasticity;
    use crate::base::Error;
    use crate::material::{Interpolate, IsoReduced, IsotropicLinearElasticity, J2Surface, YieldSurface};
    use crate::model::MaterialModel;
    use russell_lab::{approx_eq, Matrix, Vector};
    use russell_tensor::{Mandel, Tensor2, Tensor4, SQRT_2_BY_3};
    use std::sync::Arc;

    fn sample_model(ys: f64) -> SmallStrainPerfectPlasticity {
        let elastic = Arc::new(IsotropicLinearElasticity::new_young_poisson(
            Interpolate::constant(200000.0),
            Interpolate::constant(0.3),
        ));
        SmallStrainPerfectPlasticity::new(
            elastic,
            Box::new(IsoReduced::new(J2Surface::new())),
            Interpolate::constant(ys),
            Interpolate::constant(0.0),
            1e-12,
            50,
            false,
            6,
        )
        .unwrap()
    }

    #[test]
    fn elastic_predictor_is_accepted_inside_the_surface() {
        let model = sample_model(100.0);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_new = Tensor2::from_matrix(
            &[[1e-4, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut state_new, &mut aa)
            .unwrap();
        let lambda = 200000.0 * 0.3 / (1.3 * 0.4);
        let two_g = 200000.0 / 1.3;
        approx_eq(state_new.stress.vector()[0], (lambda + two_g) * 1e-4, 1e-10);
        approx_eq(state_new.plastic_dissipation, 0.0, 1e-12);
    }

    #[test]
    fn plastic_return_lands_on_the_surface() {
        // yield with σ_y = 100 under Δε = (2e-3, 0, ...)
        let ys = 100.0;
        let model = sample_model(ys);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_new = Tensor2::from_matrix(
            &[[2e-3, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut state_new, &mut aa)
            .unwrap();

        // f = 0 at return: σ_d equals the yield stress
        approx_eq(state_new.stress.invariant_sigma_d(), ys, 1e-9);

        // σ11 sits above σ_y by the multiaxial correction (σm is elastic)
        assert!(state_new.stress.vector()[0] > ys);

        // dissipation is positive
        assert!(state_new.plastic_dissipation > 0.0);
    }

    #[test]
    fn tangent_matches_finite_differences() {
        let model = sample_model(100.0);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let strain_new = Tensor2::from_matrix(
            &[[2e-3, 1e-4, 0.0], [1e-4, -3e-4, 0.0], [0.0, 0.0, 1e-4]],
            Mandel::Symmetric,
        )
        .unwrap();
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut state_new, &mut aa)
            .unwrap();

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
                .update(&strain_p, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut sp, &mut aux)
                .unwrap();
            model
                .update(&strain_m, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut sm, &mut aux)
                .unwrap();
            for i in 0..6 {
                let num = (sp.stress.vector()[i] - sm.stress.vector()[i]) / (2.0 * h);
                let den = f64::max(f64::abs(num), 1.0);
                assert!(f64::abs(aa.matrix().get(i, j) - num) / den < 1e-5);
            }
        }
    }

    #[test]
    fn substep_equivalence_holds() {
        let model = sample_model(100.0);
        let state_old = model.new_state().unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let strain_new = Tensor2::from_matrix(
            &[[2e-3, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let mut aa = Tensor4::new(Mandel::Symmetric);

        // single step
        let mut one = model.new_state().unwrap();
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut one, &mut aa)
            .unwrap();

        // two half steps
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

        for i in 0..6 {
            approx_eq(one.stress.vector()[i], two.stress.vector()[i], 1e-9);
        }
    }

    /// Saturates the J2 yield value above a von Mises cap with a zero stress
    /// gradient there, so the return-mapping Jacobian is exactly singular for
    /// trial states on the plateau (below the cap it is the plain J2 surface)
    struct CappedSurface {
        base: IsoReduced<J2Surface>,
        cap: f64,
    }

    impl CappedSurface {
        fn new(cap: f64) -> Self {
            CappedSurface {
                base: IsoReduced::new(J2Surface::new()),
                cap,
            }
        }
        fn on_plateau(&self, stress: &Tensor2) -> bool {
            stress.invariant_sigma_d() >= self.cap
        }
    }

    impl YieldSurface for CappedSurface {
        fn nhist(&self) -> usize {
            1
        }
        fn f(&self, stress: &Tensor2, q: &Vector, temperature: f64) -> Result<f64, Error> {
            if self.on_plateau(stress) {
                return Ok(SQRT_2_BY_3 * (self.cap + q[0]));
            }
            self.base.f(stress, q, temperature)
        }
        fn df_ds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor2) -> Result<(), Error> {
            if self.on_plateau(stress) {
                out.vector_mut().fill(0.0);
                return Ok(());
            }
            self.base.df_ds(stress, q, temperature, out)
        }
        fn df_dq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Vector) -> Result<(), Error> {
            self.base.df_dq(stress, q, temperature, out)
        }
        fn df_dsds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Tensor4) -> Result<(), Error> {
            if self.on_plateau(stress) {
                out.matrix_mut().fill(0.0);
                return Ok(());
            }
            self.base.df_dsds(stress, q, temperature, out)
        }
        fn df_dqdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
            self.base.df_dqdq(stress, q, temperature, out)
        }
        fn df_dsdq(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
            if self.on_plateau(stress) {
                out.fill(0.0);
                return Ok(());
            }
            self.base.df_dsdq(stress, q, temperature, out)
        }
        fn df_dqds(&self, stress: &Tensor2, q: &Vector, temperature: f64, out: &mut Matrix) -> Result<(), Error> {
            if self.on_plateau(stress) {
                out.fill(0.0);
                return Ok(());
            }
            self.base.df_dqds(stress, q, temperature, out)
        }
    }

    fn capped_model(max_divide: usize) -> SmallStrainPerfectPlasticity {
        let elastic = Arc::new(IsotropicLinearElasticity::new_young_poisson(
            Interpolate::constant(200000.0),
            Interpolate::constant(0.3),
        ));
        SmallStrainPerfectPlasticity::new(
            elastic,
            Box::new(CappedSurface::new(500.0)),
            Interpolate::constant(100.0),
            Interpolate::constant(0.0),
            1e-12,
            50,
            false,
            max_divide,
        )
        .unwrap()
    }

    #[test]
    fn adaptive_substepping_recovers_from_linalg_failure() {
        // full step: trial σ_d = 2G·4e-3 ≈ 615.4 lands on the plateau, the
        // Jacobian is singular, and the first corrector fails; both half
        // steps have trial σ_d of 307.7 and 407.7 (< cap), so one bisection
        // level recovers and returns to the J2 surface
        let model = capped_model(4);
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
        approx_eq(state_new.stress.invariant_sigma_d(), 100.0, 1e-9);
        assert!(state_new.plastic_dissipation > 0.0);
    }

    #[test]
    fn exhausted_subdivision_propagates_the_error() {
        // with max_divide = 0 the same step must surface the original failure
        let model = capped_model(0);
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
        assert_eq!(status.err(), Some(Error::LinalgFailure));
    }

    #[test]
    fn yield_function_feasibility_holds() {
        // Δγ > 0 implied by σ_d returning exactly to the surface
        let model = sample_model(100.0);
        let state_old = model.new_state().unwrap();
        let mut state_new = model.new_state().unwrap();
        let strain_new = Tensor2::from_matrix(
            &[[5e-3, 0.0, 0.0], [0.0, -1e-3, 0.0], [0.0, 0.0, -1e-3]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut aa = Tensor4::new(Mandel::Symmetric);
        model
            .update(&strain_new, &strain_old, 293.0, 293.0, 1.0, 0.0, &state_old, &mut state_new, &mut aa)
            .unwrap();
        let f = SQRT_2_BY_3 * (state_new.stress.invariant_sigma_d() - 100.0);
        assert!(f <= 1e-9);
    }
}
