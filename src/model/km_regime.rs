use super::{MaterialModel, ModelBase};
use crate::base::Error;
use crate::material::{ElasticModel, Interpolate, LocalState};
use russell_lab::{vec_norm, Norm, Vector};
use russell_tensor::{t2_add, Mandel, Tensor2, Tensor4};
use std::sync::Arc;

/// Combines several integrators based on regimes of rate-dependent behavior
///
/// Following Kocks and Mecking, the normalized activation energy
///
/// ```text
/// g = k_B T / (μ(T) b³) ln(ε̇₀ / ε̇_eff)     with ε̇_eff = ‖dev(Δε)‖/Δt
/// ```
///
/// selects one of N submodels from N-1 ascending cuts g₁ < … < g_{N-1}
/// (clamped at both ends). A typical use switches from rate-independent to
/// rate-dependent response across a critical activation energy. The history
/// is passed verbatim, so all submodels must have compatible hardening.
pub struct KMRegimeModel {
    base: ModelBase,
    models: Vec<Box<dyn MaterialModel>>,
    cuts: Vec<f64>,
    kboltz: f64,
    burgers: f64,
    eps0: f64,
}

impl KMRegimeModel {
    /// Allocates a new instance
    ///
    /// Fails with [Error::IncompatibleModels] unless there are N models and
    /// N-1 ascending cuts and all submodels declare the same history size.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        elastic: Arc<dyn ElasticModel>,
        models: Vec<Box<dyn MaterialModel>>,
        cuts: Vec<f64>,
        kboltz: f64,
        burgers: f64,
        eps0: f64,
        cte: Interpolate,
    ) -> Result<Self, Error> {
        if models.is_empty() || cuts.len() + 1 != models.len() {
            return Err(Error::IncompatibleModels);
        }
        if cuts.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::IncompatibleModels);
        }
        let nhist = models[0].nhist();
        let nstore = models[0].nstore();
        if models.iter().any(|m| m.nhist() != nhist || m.nstore() != nstore) {
            return Err(Error::IncompatibleModels);
        }
        Ok(KMRegimeModel {
            base: ModelBase::new(elastic, cte),
            models,
            cuts,
            kboltz,
            burgers,
            eps0,
        })
    }

    /// Computes the normalized activation energy of the step
    ///
    /// Vanishing strain rates (including Δt = 0) map to +∞, selecting the
    /// last (thermally activated) regime.
    fn activation_energy(&self, strain_new: &Tensor2, strain_old: &Tensor2, temperature: f64, dt: f64) -> f64 {
        if dt <= 0.0 {
            return f64::INFINITY;
        }
        let mut deps = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut deps, 1.0, strain_new, -1.0, strain_old);
        let mut dev = Tensor2::new(Mandel::Symmetric);
        deps.deviator(&mut dev);
        let rate = vec_norm(dev.vector(), Norm::Euc) / dt;
        if rate <= 0.0 {
            return f64::INFINITY;
        }
        let mu = self.base.elastic.shear(temperature);
        let b3 = self.burgers * self.burgers * self.burgers;
        self.kboltz * temperature / (mu * b3) * f64::ln(self.eps0 / rate)
    }

    /// Selects the submodel index for the given activation energy
    fn select(&self, g: f64) -> usize {
        self.cuts.partition_point(|&cut| g >= cut)
    }
}

impl MaterialModel for KMRegimeModel {
    fn nhist(&self) -> usize {
        self.models[0].nhist()
    }

    fn nstore(&self) -> usize {
        self.models[0].nstore()
    }

    fn init_hist(&self, hist: &mut Vector) -> Result<(), Error> {
        self.models[0].init_hist(hist)
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
        for model in self.models.iter_mut() {
            model.set_elastic_model(elastic.clone())?;
        }
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
        let g = self.activation_energy(strain_new, strain_old, temperature_new, time_new - time_old);
        let j = self.select(g);
        self.models[j].update(
            strain_new,
            strain_old,
            temperature_new,
            temperature_old,
            time_new,
            time_old,
            state_old,
            state_new,
            stiffness,
        )
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
