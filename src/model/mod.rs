//! Implements the material models (the integrators)
//!
//! Every model exposes the uniform update contract of [MaterialModel]: given
//! the strains, temperatures, and times at steps n and n+1 plus the previous
//! state, it produces the new stress, internal variables, accumulated
//! energies, and the consistent algorithmic tangent.

mod creep_plasticity;
mod elastic;
mod general_integrator;
mod km_regime;
mod material_model;
mod perfect_plasticity;
mod rate_independent;
pub use crate::model::creep_plasticity::*;
pub use crate::model::elastic::*;
pub use crate::model::general_integrator::*;
pub use crate::model::km_regime::*;
pub use crate::model::material_model::*;
pub use crate::model::perfect_plasticity::*;
pub use crate::model::rate_independent::*;
