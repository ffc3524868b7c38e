use super::{trapezoid_energy, MaterialModel, ModelBase};
use crate::base::Error;
use crate::material::{ElasticModel, Interpolate, LocalState};
use russell_lab::Vector;
use russell_tensor::{t2_add, t4_ddot_t2, Mandel, Tensor2, Tensor4};
use std::sync::Arc;

/// Implements small-strain linear elasticity
///
/// ```text
/// σₙ₊₁ = σₙ + C(Tₙ₊₁) : (Δε - Δεᶿ)
/// ```
///
/// There is no history; the tangent is the elastic stiffness. This model is
/// primarily a baseline and the inner workhorse of composite models.
pub struct SmallStrainElasticity {
    base: ModelBase,
}

impl SmallStrainElasticity {
    /// Allocates a new instance
    pub fn new(elastic: Arc<dyn ElasticModel>, cte: Interpolate) -> Self {
        SmallStrainElasticity {
            base: ModelBase::new(elastic, cte),
        }
    }
}

impl MaterialModel for SmallStrainElasticity {
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
        // mechanical strain increment
        let mut deps = Tensor2::new(Mandel::Symmetric);
        self.base
            .mechanical_strain_increment(strain_new, strain_old, temperature_new, temperature_old, &mut deps);

        // σₙ₊₁ = σₙ + C : Δε and A = C
        self.base.elastic.modulus(temperature_new, stiffness)?;
        let mut dsigma = Tensor2::new(Mandel::Symmetric);
        t4_ddot_t2(&mut dsigma, 1.0, stiffness, &deps);
        t2_add(&mut state_new.stress, 1.0, &state_old.stress, 1.0, &dsigma);

        // energy over the total strain increment
        let mut dstrain = Tensor2::new(Mandel::Symmetric);
        t2_add(&mut dstrain, 1.0, strain_new, -1.0, strain_old);
        state_new.strain_energy =
            state_old.strain_energy + trapezoid_energy(&state_old.stress, &state_new.stress, &dstrain);
        state_new.plastic_dissipation = state_old.plastic_dissipation;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
