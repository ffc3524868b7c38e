use russell_lab::{vec_copy, Vector};
use russell_tensor::{Mandel, Tensor2};
use serde::{Deserialize, Serialize};

/// Holds the state at a material point between calls
///
/// The internal values form an opaque ordered vector whose semantic slots are
/// model-specific; the host must preserve ordering and length across calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalState {
    /// Holds the stress tensor σ
    pub stress: Tensor2,

    /// Holds the internal variables (model-specific layout)
    pub internal_values: Vector,

    /// Holds the strain energy density u
    pub strain_energy: f64,

    /// Holds the plastic dissipation density p
    pub plastic_dissipation: f64,
}

impl LocalState {
    /// Allocates a new instance with zeroed stress and internal values
    pub fn new(n_internal_values: usize) -> Self {
        LocalState {
            stress: Tensor2::new(Mandel::Symmetric),
            internal_values: Vector::new(n_internal_values),
            strain_energy: 0.0,
            plastic_dissipation: 0.0,
        }
    }

    /// Copies all data from another state into this state
    pub fn mirror(&mut self, other: &LocalState) {
        self.stress.set_tensor(1.0, &other.stress);
        vec_copy(&mut self.internal_values, &other.internal_values).unwrap();
        self.strain_energy = other.strain_energy;
        self.plastic_dissipation = other.plastic_dissipation;
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
