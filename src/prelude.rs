//! Re-exports the most commonly used structures and traits
//!
//! This module exists to simplify the `use` statements of host code driving
//! the material models.

pub use crate::base::{status_message, Error, SUCCESS};
pub use crate::material::{
    AssociativeFlowRule, Chaboche, CombinedHardening, CreepModel, ElasticModel, Gamma, HardeningRule, Interpolate,
    IsoReduced, IsotropicLinearElasticity, J2Creep, J2I1Surface, J2Surface, LinearIsotropicHardening,
    LinearKinematicHardening, LocalState, NonAssociativeFlowRule, NonAssociativeHardening, NortonBaileyCreep,
    OverstressFunction, PerzynaFlowRule, PowerLawCreep, PowerLawOverstress, RateIndependentFlowRule, ScalarCreepRule,
    ViscoPlasticFlowRule, VoceIsotropicHardening, YieldSurface,
};
pub use crate::model::{
    GeneralIntegrator, KMRegimeModel, MaterialModel, SmallStrainCreepPlasticity, SmallStrainElasticity,
    SmallStrainPerfectPlasticity, SmallStrainRateIndependentPlasticity,
};
pub use crate::solver::{newton_solve, NonlinearSystem};
