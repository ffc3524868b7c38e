use crate::base::Error;
use crate::material::{ElasticModel, Interpolate, LocalState};
use russell_lab::Vector;
use russell_tensor::{t2_add, t2_ddot_t2, t4_ddot_t2, Mandel, Tensor2, Tensor4};
use std::sync::Arc;

/// Defines the uniform update contract of all material models
///
/// Given the strain increment, temperature change, and time increment at a
/// material point together with the previous stress and internal variables,
/// an implementation computes the updated stress, the updated internal
/// variables, and the consistent algorithmic tangent ∂σₙ₊₁/∂εₙ₊₁. Models are
/// immutable after construction and hold no per-call mutable state, so one
/// instance may be invoked concurrently on disjoint state buffers.
pub trait MaterialModel: Send + Sync {
    /// Returns the number of true material-history variables
    fn nhist(&self) -> usize;

    /// Returns the number of stored internal variables
    fn nstore(&self) -> usize {
        self.nhist()
    }

    /// Initializes the history to the zero/reference state
    fn init_hist(&self, hist: &mut Vector) -> Result<(), Error>;

    /// Allocates a state with initialized history
    fn new_state(&self) -> Result<LocalState, Error> {
        let mut state = LocalState::new(self.nstore());
        self.init_hist(&mut state.internal_values)?;
        Ok(state)
    }

    /// Returns the instantaneous thermal-expansion coefficient α(T)
    fn cte(&self, temperature: f64) -> f64;

    /// Returns the effective shear modulus G(T)
    fn shear(&self, temperature: f64) -> f64;

    /// Returns the effective bulk modulus K(T)
    fn bulk(&self, temperature: f64) -> f64;

    /// Computes the elastic strain for a given stress and temperature
    fn elastic_strains(&self, stress: &Tensor2, temperature: f64, strain: &mut Tensor2) -> Result<(), Error>;

    /// Overrides the elastic model to match another object's
    fn set_elastic_model(&mut self, elastic: Arc<dyn ElasticModel>) -> Result<(), Error>;

    /// Updates the stress, history, energies, and consistent tangent over a step
    #[allow(clippy::too_many_arguments)]
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
    ) -> Result<(), Error>;
}

/// Holds the elastic model and thermal-expansion data shared by all models
pub struct ModelBase {
    /// Holds the (possibly shared) elastic model
    pub elastic: Arc<dyn ElasticModel>,

    /// Holds the instantaneous thermal-expansion coefficient α(T)
    pub cte: Interpolate,
}

impl ModelBase {
    /// Allocates a new instance
    pub fn new(elastic: Arc<dyn ElasticModel>, cte: Interpolate) -> Self {
        ModelBase { elastic, cte }
    }

    /// Computes the volumetric thermal-strain increment coefficient
    ///
    /// The increment is integrated trapezoidally over the temperature change:
    /// Δεᶿ = ½(α(Tₙ) + α(Tₙ₊₁)) ΔT I
    pub fn thermal_strain_coefficient(&self, temperature_new: f64, temperature_old: f64) -> f64 {
        0.5 * (self.cte.value(temperature_new) + self.cte.value(temperature_old)) * (temperature_new - temperature_old)
    }

    /// Computes the mechanical strain increment Δε - Δεᶿ
    pub fn mechanical_strain_increment(
        &self,
        strain_new: &Tensor2,
        strain_old: &Tensor2,
        temperature_new: f64,
        temperature_old: f64,
        out: &mut Tensor2,
    ) {
        t2_add(out, 1.0, strain_new, -1.0, strain_old);
        let coeff = self.thermal_strain_coefficient(temperature_new, temperature_old);
        let v = out.vector_mut();
        for i in 0..3 {
            v[i] -= coeff;
        }
    }

    /// Computes the elastic strain S(T) : σ
    pub fn elastic_strains(&self, stress: &Tensor2, temperature: f64, strain: &mut Tensor2) -> Result<(), Error> {
        let mut cc = Tensor4::new(Mandel::Symmetric);
        self.elastic.compliance(temperature, &mut cc)?;
        t4_ddot_t2(strain, 1.0, &cc, stress);
        Ok(())
    }
}

/// Accumulates the trapezoidal work density ½(σₙ + σₙ₊₁) : Δε
pub fn trapezoid_energy(stress_old: &Tensor2, stress_new: &Tensor2, dstrain: &Tensor2) -> f64 {
    0.5 * (t2_ddot_t2(stress_old, dstrain) + t2_ddot_t2(stress_new, dstrain))
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{trapezoid_energy, ModelBase};
    use crate::material::{Interpolate, IsotropicLinearElasticity};
    use russell_lab::approx_eq;
    use russell_tensor::{Mandel, Tensor2};
    use std::sync::Arc;

    fn sample_base(cte: f64) -> ModelBase {
        let elastic = Arc::new(IsotropicLinearElasticity::new_young_poisson(
            Interpolate::constant(1000.0),
            Interpolate::constant(0.25),
        ));
        ModelBase::new(elastic, Interpolate::constant(cte))
    }

    #[test]
    fn thermal_strain_increment_works() {
        let base = sample_base(1e-5);
        let strain_new = Tensor2::from_matrix(
            &[[2e-3, 0.0, 0.0], [0.0, 1e-3, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let strain_old = Tensor2::new(Mandel::Symmetric);
        let mut deps = Tensor2::new(Mandel::Symmetric);
        base.mechanical_strain_increment(&strain_new, &strain_old, 150.0, 50.0, &mut deps);
        let dtheta = 1e-5 * 100.0;
        approx_eq(deps.vector()[0], 2e-3 - dtheta, 1e-15);
        approx_eq(deps.vector()[1], 1e-3 - dtheta, 1e-15);
        approx_eq(deps.vector()[2], -dtheta, 1e-15);
        assert_eq!(deps.vector()[3], 0.0);
    }

    #[test]
    fn elastic_strains_inverts_hooke() {
        let base = sample_base(0.0);
        let stress = Tensor2::from_matrix(
            &[[30.0, 5.0, 0.0], [5.0, -10.0, 0.0], [0.0, 0.0, 8.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let mut strain = Tensor2::new(Mandel::Symmetric);
        base.elastic_strains(&stress, 20.0, &mut strain).unwrap();
        // ε11 = (σ11 - ν(σ22 + σ33))/E
        approx_eq(strain.vector()[0], (30.0 - 0.25 * (-10.0 + 8.0)) / 1000.0, 1e-14);
    }

    #[test]
    fn trapezoid_energy_works() {
        let stress_old = Tensor2::from_matrix(
            &[[10.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let stress_new = Tensor2::from_matrix(
            &[[30.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        let dstrain = Tensor2::from_matrix(
            &[[1e-2, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            Mandel::Symmetric,
        )
        .unwrap();
        approx_eq(trapezoid_energy(&stress_old, &stress_new, &dstrain), 0.2, 1e-14);
    }
}
