use super::{trapezoid_energy, MaterialModel, ModelBase};
use crate::base::Error;
use crate::material::{CreepModel, ElasticModel, Interpolate, LocalState};
use crate::solver::{newton_solve, NonlinearSystem};
use russell_lab::{mat_inverse, solve_lin_sys, vec_norm, Matrix, Norm, Vector};
use russell_tensor::{t2_add, t4_ddot_t2, Mandel, Tensor2, Tensor4};
use std::sync::Arc;

/// Implements the nested creep + plasticity composite
///
/// The strain splits as ε = εᵉ + εᵖ + εᶜ. The outer Newton iterates on the
/// plastic strain εᵖₙ₊₁: for a frozen εᵖ an inner Newton integrates the creep
/// strain implicitly (closing σ = C(ε - εᵖ - εᶜ) with the creep law), the
/// inner plastic model is then driven by the creep-corrected strain, and the
/// outer residual R = sf (εᵖ - εᵖ') measures self-consistency of the plastic
/// strain. History is `h = [εᶜ(6), inner plastic history]`.
///
/// The composite removes the thermal strain itself, so the inner plastic
/// model must carry a zero thermal-expansion coefficient. Construction
/// overrides the inner model's elasticity with the composite's (shared)
/// elastic model.
pub struct SmallStrainCreepPlasticity {
    base: ModelBase,
    plastic: Box<dyn MaterialModel>,
    creep: Box<dyn CreepModel>,
    tol: f64,
    miter: usize,
    verbose: bool,
    sf: f64,
}

/// Defines the outer self-consistency system on x = εᵖₙ₊₁
struct CreepPlasticitySystem<'a> {
    plastic: &'a dyn MaterialModel,
    creep: &'a dyn CreepModel,
    dd: &'a Tensor4,
    ss: &'a Tensor4,
    strain_total_new: &'a Tensor2,
    strain_total_old: &'a Tensor2,
    creep_old: &'a Tensor2,
    plastic_state_old: &'a LocalState,
    temperature_new: f64,
    temperature_old: f64,
    time_new: f64,
    time_old: f64,
    tol: f64,
    miter: usize,
    sf: f64,
    // cached results of the latest evaluation
    creep_new: Tensor2,
    stress: Tensor2,
    plastic_state_new: LocalState,
    stiffness_plastic: Tensor4,
    dcreep_dstress: Tensor4,
    dcreep_dstrain: Tensor4,
}

impl<'a> CreepPlasticitySystem<'a> {
    /// Integrates the creep strain implicitly for a frozen plastic strain
    ///
    /// Solves εᶜ = εᶜₙ + Δt ε̇ᶜ(σ(εᶜ), εᶜ) with σ(εᶜ) = C : (ε - εᵖ - εᶜ),
    /// leaving the converged εᶜ, σ, and the creep partials in the caches.
    fn integrate_creep(&mut self, ep: &Tensor2) -> Result<(), Error> {
        let dt = self.time_new - self.time_old;
        self.creep_new.set_tensor(1.0, self.creep_old);
        let mut rate = Tensor2::new(Mandel::Symmetric);
        let mut rc = Vector::new(6);
        let mut jc = Matrix::new(6, 6);
        let cc = self.dd.matrix();
        for iteration in 0.. {
            // σ = C : (ε - εᵖ - εᶜ)
            let mut elastic_strain = Tensor2::new(Mandel::Symmetric);
            t2_add(&mut elastic_strain, 1.0, self.strain_total_new, -1.0, ep);
            {
                let v = elastic_strain.vector_mut();
                for i in 0..6 {
                    v[i] -= self.creep_new.vector()[i];
                }
            }
            t4_ddot_t2(&mut self.stress, 1.0, self.dd, &elastic_strain);

            self.creep
                .rate(&self.stress, &self.creep_new, self.time_new, self.temperature_new, &mut rate)?;
            for i in 0..6 {
                rc[i] = self.creep_new.vector()[i] - self.creep_old.vector()[i] - dt * rate.vector()[i];
            }
            if vec_norm(&rc, Norm::Euc) < self.tol {
                break;
            }
            if iteration >= self.miter {
                return Err(Error::MaxIterations);
            }

            self.creep.drate_dstress(
                &self.stress,
                &self.creep_new,
                self.time_new,
                self.temperature_new,
                &mut self.dcreep_dstress,
            )?;
            self.creep.drate_dstrain(
                &self.stress,
                &self.creep_new,
                self.time_new,
                self.temperature_new,
                &mut self.dcreep_dstrain,
            )?;
            let cs = self.dcreep_dstress.matrix();
            let ce = self.dcreep_dstrain.matrix();
            for i in 0..6 {
                for j in 0..6 {
                    let mut sum = 0.0;
                    for k in 0..6 {
                        sum += cs.get(i, k) * cc.get(k, j);
                    }
                    let delta = if i == j { 1.0 } else { 0.0 };
                    jc.set(i, j, delta + dt * sum - dt * ce.get(i, j));
                }
            }
            let mut delta_c = Vector::new(6);
            for i in 0..6 {
                delta_c[i] = -rc[i];
            }
            solve_lin_sys(&mut delta_c, &mut jc).map_err(|_| Error::LinalgFailure)?;
            {
                let v = self.creep_new.vector_mut();
                for i in 0..6 {
                    v[i] += delta_c[i];
                }
            }
        }

        // partials at the converged creep strain (used by the outer Jacobian)
        self.creep.drate_dstress(
            &self.stress,
            &self.creep_new,
            self.time_new,
            self.temperature_new,
            &mut self.dcreep_dstress,
        )?;
        self.creep.drate_dstrain(
            &self.stress,
            &self.creep_new,
            self.time_new,
            self.temperature_new,
            &mut self.dcreep_dstrain,
        )?;
        Ok(())
    }
}

impl<'a> NonlinearSystem for CreepPlasticitySystem<'a> {
    fn dim(&self) -> usize {
        6
    }

    fn residual_jacobian(&mut self, x: &Vector, rr: &mut Vector, jj: &mut Matrix) -> Result<(), Error> {
        let dt = self.time_new - self.time_old;
        let mut ep = Tensor2::new(Mandel::Symmetric);
        {
            let v = ep.vector_mut();
            for i in 0..6 {
                v[i] = x[i];
            }
        }

        // inner creep integration for the frozen εᵖ
        self.integrate_creep(&ep)?;

        // inner plastic update driven by the creep-corrected strain
        let mut inner_new = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut inner_new, 1.0, self.strain_total_new, -1.0, &self.creep_new);
        let mut inner_old = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut inner_old, 1.0, self.strain_total_old, -1.0, self.creep_old);
        self.plastic.update(
            &inner_new,
            &inner_old,
            self.temperature_new,
            self.temperature_old,
            self.time_new,
            self.time_old,
            self.plastic_state_old,
            &mut self.plastic_state_new,
            &mut self.stiffness_plastic,
        )?;

        // εᵖ' = (ε - εᶜ) - S : σ
        let mut ee = Tensor2::new(Mandel::Symmetric);
        t4_ddot_t2(&mut ee, 1.0, self.ss, &self.plastic_state_new.stress);
        for i in 0..6 {
            rr[i] = self.sf * (x[i] - (inner_new.vector()[i] - ee.vector()[i]));
        }

        // J = sf (I - (I - S Aᵖ) Jc⁻¹ Δt ċ_σ C)
        let cc = self.dd.matrix();
        let cs = self.dcreep_dstress.matrix();
        let ce = self.dcreep_dstrain.matrix();
        let mut pp = Matrix::new(6, 6);
        let mut jc = Matrix::new(6, 6);
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += cs.get(i, k) * cc.get(k, j);
                }
                pp.set(i, j, dt * sum);
                let delta = if i == j { 1.0 } else { 0.0 };
                jc.set(i, j, delta + dt * sum - dt * ce.get(i, j));
            }
        }
        let mut jc_inv = Matrix::new(6, 6);
        mat_inverse(&mut jc_inv, &jc).map_err(|_| Error::LinalgFailure)?;
        let mut ee_mat = Matrix::new(6, 6); // dε̃/dεᵖ = Jc⁻¹ P
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += jc_inv.get(i, k) * pp.get(k, j);
                }
                ee_mat.set(i, j, sum);
            }
        }
        let ssm = self.ss.matrix();
        let ap = self.stiffness_plastic.matrix();
        let mut s_ap = Matrix::new(6, 6);
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += ssm.get(i, k) * ap.get(k, j);
                }
                s_ap.set(i, j, sum);
            }
        }
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    let delta = if i == k { 1.0 } else { 0.0 };
                    sum += (delta - s_ap.get(i, k)) * ee_mat.get(k, j);
                }
                let delta = if i == j { 1.0 } else { 0.0 };
                jj.set(i, j, self.sf * (delta - sum));
            }
        }
        Ok(())
    }
}

impl SmallStrainCreepPlasticity {
    /// Allocates a new instance, overriding the inner plastic model's
    /// elasticity with the shared elastic model
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        elastic: Arc<dyn ElasticModel>,
        mut plastic: Box<dyn MaterialModel>,
        creep: Box<dyn CreepModel>,
        cte: Interpolate,
        tol: f64,
        miter: usize,
        verbose: bool,
        sf: f64,
    ) -> Result<Self, Error> {
        plastic.set_elastic_model(elastic.clone())?;
        Ok(SmallStrainCreepPlasticity {
            base: ModelBase::new(elastic, cte),
            plastic,
            creep,
            tol,
            miter,
            verbose,
            sf,
        })
    }
}

impl MaterialModel for SmallStrainCreepPlasticity {
    fn nhist(&self) -> usize {
        6 + self.plastic.nstore()
    }

    fn init_hist(&self, hist: &mut Vector) -> Result<(), Error> {
        let np = self.plastic.nstore();
        hist.fill(0.0);
        let mut inner = Vector::new(np);
        self.plastic.init_hist(&mut inner)?;
        for i in 0..np {
            hist[6 + i] = inner[i];
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
        self.plastic.set_elastic_model(elastic.clone())?;
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
        let np = self.plastic.nstore();
        let dt = time_new - time_old;

        // operators at both temperatures
        let mut dd = Tensor4::new(Mandel::Symmetric);
        self.base.elastic.modulus(temperature_new, &mut dd)?;
        let mut ss = Tensor4::new(Mandel::Symmetric);
        self.base.elastic.compliance(temperature_new, &mut ss)?;

        // mechanical totals (thermal strain removed from the increment)
        let mut deps = Tensor2::new(Mandel::Symmetric);
        self.base
            .mechanical_strain_increment(strain_new, strain_old, temperature_new, temperature_old, &mut deps);
        let mut strain_total_new = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut strain_total_new, 1.0, strain_old, 1.0, &deps);

        // unpack history and estimate the old plastic strain
        let mut creep_old = Tensor2::new(Mandel::Symmetric);
        {
            let v = creep_old.vector_mut();
            for i in 0..6 {
                v[i] = state_old.internal_values[i];
            }
        }
        let mut plastic_state_old = LocalState::new(np);
        plastic_state_old.stress.set_tensor(1.0, &state_old.stress);
        for i in 0..np {
            plastic_state_old.internal_values[i] = state_old.internal_values[6 + i];
        }
        let mut ee_old = Tensor2::new(Mandel::Symmetric);
        self.base.elastic_strains(&state_old.stress, temperature_old, &mut ee_old)?;
        let mut ep_old = Tensor2::new(Mandel::Symmetric);
        {
            let v = ep_old.vector_mut();
            for i in 0..6 {
                v[i] = strain_old.vector()[i] - creep_old.vector()[i] - ee_old.vector()[i];
            }
        }

        // outer Newton on the plastic strain
        let mut system = CreepPlasticitySystem {
            plastic: self.plastic.as_ref(),
            creep: self.creep.as_ref(),
            dd: &dd,
            ss: &ss,
            strain_total_new: &strain_total_new,
            strain_total_old: strain_old,
            creep_old: &creep_old,
            plastic_state_old: &plastic_state_old,
            temperature_new,
            temperature_old,
            time_new,
            time_old,
            tol: self.tol,
            miter: self.miter,
            sf: self.sf,
            creep_new: Tensor2::new(Mandel::Symmetric),
            stress: Tensor2::new(Mandel::Symmetric),
            plastic_state_new: LocalState::new(np),
            stiffness_plastic: Tensor4::new(Mandel::Symmetric),
            dcreep_dstress: Tensor4::new(Mandel::Symmetric),
            dcreep_dstrain: Tensor4::new(Mandel::Symmetric),
        };
        let mut x = Vector::new(6);
        for i in 0..6 {
            x[i] = ep_old.vector()[i];
        }
        newton_solve(&mut system, &mut x, self.tol, self.miter, self.verbose)?;

        // refresh caches at the converged plastic strain
        let mut rr = Vector::new(6);
        let mut jj = Matrix::new(6, 6);
        system.residual_jacobian(&x, &mut rr, &mut jj)?;

        // new stress and history
        state_new.stress.set_tensor(1.0, &system.plastic_state_new.stress);
        for i in 0..6 {
            state_new.internal_values[i] = system.creep_new.vector()[i];
        }
        for i in 0..np {
            state_new.internal_values[6 + i] = system.plastic_state_new.internal_values[i];
        }

        // combined tangent: A = (I + Aᵖ B)⁻¹ Aᵖ with B = (I - Δt ċ_c)⁻¹ Δt ċ_σ
        let cs = system.dcreep_dstress.matrix();
        let ce = system.dcreep_dstrain.matrix();
        let mut lhs = Matrix::new(6, 6);
        for i in 0..6 {
            for j in 0..6 {
                let delta = if i == j { 1.0 } else { 0.0 };
                lhs.set(i, j, delta - dt * ce.get(i, j));
            }
        }
        let mut lhs_inv = Matrix::new(6, 6);
        mat_inverse(&mut lhs_inv, &lhs).map_err(|_| Error::LinalgFailure)?;
        let mut bb = Matrix::new(6, 6);
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += lhs_inv.get(i, k) * dt * cs.get(k, j);
                }
                bb.set(i, j, sum);
            }
        }
        let ap = system.stiffness_plastic.matrix();
        let mut coupled = Matrix::new(6, 6);
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += ap.get(i, k) * bb.get(k, j);
                }
                let delta = if i == j { 1.0 } else { 0.0 };
                coupled.set(i, j, delta + sum);
            }
        }
        let mut coupled_inv = Matrix::new(6, 6);
        mat_inverse(&mut coupled_inv, &coupled).map_err(|_| Error::LinalgFailure)?;
        let mat = stiffness.matrix_mut();
        for i in 0..6 {
            for j in 0..6 {
                let mut sum = 0.0;
                for k in 0..6 {
                    sum += coupled_inv.get(i, k) * ap.get(k, j);
                }
                mat.set(i, j, sum);
            }
        }

        // energy over the total strain increment and dissipation over Δεᵖ + Δεᶜ
        let mut dstrain = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut dstrain, 1.0, strain_new, -1.0, strain_old);
        state_new.strain_energy =
            state_old.strain_energy + trapezoid_energy(&state_old.stress, &state_new.stress, &dstrain);
        let mut dinelastic = Tensor2::new(Mandel::Symmetric);
        {
            let v = dinelastic.vector_mut();
            for i in 0..6 {
                v[i] = (x[i] - ep_old.vector()[i]) + (system.creep_new.vector()[i] - creep_old.vector()[i]);
            }
        }
        state_new.plastic_dissipation =
            state_old.plastic_dissipation + trapezoid_energy(&state_old.stress, &state_new.stress, &dinelastic);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
