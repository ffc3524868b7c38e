use super::Interpolate;
use crate::base::Error;
use russell_tensor::{Tensor4, IDENTITY2, P_SYMDEV};

/// Defines an alias to IDENTITY2
const I: &[f64; 9] = &IDENTITY2;

/// Defines an alias to P_SYMDEV
const PSD: &[[f64; 9]; 9] = &P_SYMDEV;

/// Produces the elastic stiffness and compliance operators at a given temperature
///
/// The stiffness `C(T)` and compliance `S(T)` are 6×6 operators in the Mandel
/// basis satisfying `C(T)·S(T) = I`.
pub trait ElasticModel: Send + Sync {
    /// Returns the Young modulus E(T)
    fn young(&self, temperature: f64) -> f64;

    /// Returns the Poisson coefficient ν(T)
    fn poisson(&self, temperature: f64) -> f64;

    /// Returns the shear modulus G(T)
    fn shear(&self, temperature: f64) -> f64;

    /// Returns the bulk modulus K(T)
    fn bulk(&self, temperature: f64) -> f64;

    /// Computes the stiffness C(T)
    fn modulus(&self, temperature: f64, dd: &mut Tensor4) -> Result<(), Error>;

    /// Computes the compliance S(T) = C(T)⁻¹
    fn compliance(&self, temperature: f64, cc: &mut Tensor4) -> Result<(), Error>;
}

/// Holds the pair of interpolated moduli parametrizing the isotropic model
#[derive(Clone, Debug)]
enum Moduli {
    YoungPoisson { young: Interpolate, poisson: Interpolate },
    ShearBulk { shear: Interpolate, bulk: Interpolate },
}

/// Implements isotropic linear elasticity with temperature-dependent moduli
///
/// The operators split into orthogonal volumetric and deviatoric projections:
///
/// ```text
/// C(T) = 3K(T) Piso + 2G(T) Psymdev
/// S(T) = Piso/(3K(T)) + Psymdev/(2G(T))
/// ```
///
/// so the compliance is exact (no numerical inversion).
#[derive(Clone, Debug)]
pub struct IsotropicLinearElasticity {
    moduli: Moduli,
}

impl IsotropicLinearElasticity {
    /// Allocates a new instance from the Young modulus and Poisson coefficient
    pub fn new_young_poisson(young: Interpolate, poisson: Interpolate) -> Self {
        IsotropicLinearElasticity {
            moduli: Moduli::YoungPoisson { young, poisson },
        }
    }

    /// Allocates a new instance from the shear and bulk moduli
    pub fn new_shear_bulk(shear: Interpolate, bulk: Interpolate) -> Self {
        IsotropicLinearElasticity {
            moduli: Moduli::ShearBulk { shear, bulk },
        }
    }

    /// Returns the (bulk, shear) pair at the given temperature
    fn bulk_shear(&self, temperature: f64) -> (f64, f64) {
        match &self.moduli {
            Moduli::YoungPoisson { young, poisson } => {
                let e = young.value(temperature);
                let nu = poisson.value(temperature);
                (e / (3.0 * (1.0 - 2.0 * nu)), e / (2.0 * (1.0 + nu)))
            }
            Moduli::ShearBulk { shear, bulk } => (bulk.value(temperature), shear.value(temperature)),
        }
    }
}

impl ElasticModel for IsotropicLinearElasticity {
    fn young(&self, temperature: f64) -> f64 {
        let (kk, gg) = self.bulk_shear(temperature);
        9.0 * kk * gg / (3.0 * kk + gg)
    }

    fn poisson(&self, temperature: f64) -> f64 {
        let (kk, gg) = self.bulk_shear(temperature);
        (3.0 * kk - 2.0 * gg) / (6.0 * kk + 2.0 * gg)
    }

    fn shear(&self, temperature: f64) -> f64 {
        self.bulk_shear(temperature).1
    }

    fn bulk(&self, temperature: f64) -> f64 {
        self.bulk_shear(temperature).0
    }

    fn modulus(&self, temperature: f64, dd: &mut Tensor4) -> Result<(), Error> {
        let (kk, gg) = self.bulk_shear(temperature);
        let mat = dd.matrix_mut();
        for i in 0..6 {
            for j in 0..6 {
                mat.set(i, j, 2.0 * gg * PSD[i][j] + kk * I[i] * I[j]);
            }
        }
        Ok(())
    }

    fn compliance(&self, temperature: f64, cc: &mut Tensor4) -> Result<(), Error> {
        let (kk, gg) = self.bulk_shear(temperature);
        let mat = cc.matrix_mut();
        for i in 0..6 {
            for j in 0..6 {
                mat.set(i, j, PSD[i][j] / (2.0 * gg) + I[i] * I[j] / (9.0 * kk));
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
