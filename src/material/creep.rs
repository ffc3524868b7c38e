use super::Interpolate;
use crate::base::Error;
use russell_tensor::{Tensor2, Tensor4, IDENTITY2, P_SYMDEV, SQRT_2_BY_3};

/// Defines an alias to IDENTITY2
const I: &[f64; 9] = &IDENTITY2;

/// Defines an alias to P_SYMDEV
const PSD: &[[f64; 9]; 9] = &P_SYMDEV;

/// Holds the smallest equivalent creep strain used in rate laws
///
/// Strain-hardening laws with negative strain exponents are singular at zero
/// equivalent strain; the equivalent strain is clamped from below.
const MIN_EQ_STRAIN: f64 = 1e-10;

/// Defines a scalar creep-rate law in terms of equivalent quantities
pub trait ScalarCreepRule: Send + Sync {
    /// Evaluates the equivalent creep rate at (σ_eq, e_eq, t, T)
    fn rate(&self, sigma_eq: f64, eps_eq: f64, time: f64, temperature: f64) -> Result<f64, Error>;

    /// Computes ∂rate/∂σ_eq
    fn drate_dstress(&self, sigma_eq: f64, eps_eq: f64, time: f64, temperature: f64) -> Result<f64, Error>;

    /// Computes ∂rate/∂e_eq
    fn drate_dstrain(&self, sigma_eq: f64, eps_eq: f64, time: f64, temperature: f64) -> Result<f64, Error>;
}

/// Implements power-law creep: rate = A(T) σ_eq^n(T)
#[derive(Clone, Debug)]
pub struct PowerLawCreep {
    aa: Interpolate,
    nn: Interpolate,
}

impl PowerLawCreep {
    /// Allocates a new instance with prefactor A(T) and stress exponent n(T)
    pub fn new(aa: Interpolate, nn: Interpolate) -> Self {
        PowerLawCreep { aa, nn }
    }
}

impl ScalarCreepRule for PowerLawCreep {
    fn rate(&self, sigma_eq: f64, _eps_eq: f64, _time: f64, temperature: f64) -> Result<f64, Error> {
        let aa = self.aa.value(temperature);
        let nn = self.nn.value(temperature);
        Ok(aa * sigma_eq.powf(nn))
    }

    fn drate_dstress(&self, sigma_eq: f64, _eps_eq: f64, _time: f64, temperature: f64) -> Result<f64, Error> {
        let aa = self.aa.value(temperature);
        let nn = self.nn.value(temperature);
        if sigma_eq <= 0.0 {
            return Ok(0.0);
        }
        Ok(aa * nn * sigma_eq.powf(nn - 1.0))
    }

    fn drate_dstrain(&self, _sigma_eq: f64, _eps_eq: f64, _time: f64, _temperature: f64) -> Result<f64, Error> {
        Ok(0.0)
    }
}

/// Implements Norton-Bailey creep in the strain-hardening form
///
/// The time-hardening law e = A σ^n t^m is converted to strain hardening:
///
/// ```text
/// rate = m A^(1/m) σ_eq^(n/m) e_eq^((m-1)/m)
/// ```
#[derive(Clone, Debug)]
pub struct NortonBaileyCreep {
    aa: Interpolate,
    mm: Interpolate,
    nn: Interpolate,
}

impl NortonBaileyCreep {
    /// Allocates a new instance with prefactor A(T), time exponent m(T), and stress exponent n(T)
    pub fn new(aa: Interpolate, mm: Interpolate, nn: Interpolate) -> Self {
        NortonBaileyCreep { aa, mm, nn }
    }

    /// Returns (A, m, n) at the given temperature
    fn coefficients(&self, temperature: f64) -> (f64, f64, f64) {
        (
            self.aa.value(temperature),
            self.mm.value(temperature),
            self.nn.value(temperature),
        )
    }
}

impl ScalarCreepRule for NortonBaileyCreep {
    fn rate(&self, sigma_eq: f64, eps_eq: f64, _time: f64, temperature: f64) -> Result<f64, Error> {
        let (aa, mm, nn) = self.coefficients(temperature);
        let e = f64::max(eps_eq, MIN_EQ_STRAIN);
        Ok(mm * aa.powf(1.0 / mm) * sigma_eq.powf(nn / mm) * e.powf((mm - 1.0) / mm))
    }

    fn drate_dstress(&self, sigma_eq: f64, eps_eq: f64, _time: f64, temperature: f64) -> Result<f64, Error> {
        let (aa, mm, nn) = self.coefficients(temperature);
        if sigma_eq <= 0.0 {
            return Ok(0.0);
        }
        let e = f64::max(eps_eq, MIN_EQ_STRAIN);
        Ok(nn * aa.powf(1.0 / mm) * sigma_eq.powf(nn / mm - 1.0) * e.powf((mm - 1.0) / mm))
    }

    fn drate_dstrain(&self, sigma_eq: f64, eps_eq: f64, _time: f64, temperature: f64) -> Result<f64, Error> {
        let (aa, mm, nn) = self.coefficients(temperature);
        if eps_eq <= MIN_EQ_STRAIN {
            return Ok(0.0);
        }
        Ok((mm - 1.0) * aa.powf(1.0 / mm) * sigma_eq.powf(nn / mm) * eps_eq.powf((mm - 1.0) / mm - 1.0))
    }
}

/// Provides the creep strain rate tensor and its partials
pub trait CreepModel: Send + Sync {
    /// Computes ε̇ᶜ(σ, εᶜ, t, T)
    fn rate(
        &self,
        stress: &Tensor2,
        creep_strain: &Tensor2,
        time: f64,
        temperature: f64,
        out: &mut Tensor2,
    ) -> Result<(), Error>;

    /// Computes ∂ε̇ᶜ/∂σ (6×6)
    fn drate_dstress(
        &self,
        stress: &Tensor2,
        creep_strain: &Tensor2,
        time: f64,
        temperature: f64,
        out: &mut Tensor4,
    ) -> Result<(), Error>;

    /// Computes ∂ε̇ᶜ/∂εᶜ (6×6)
    fn drate_dstrain(
        &self,
        stress: &Tensor2,
        creep_strain: &Tensor2,
        time: f64,
        temperature: f64,
        out: &mut Tensor4,
    ) -> Result<(), Error>;
}

/// Implements J2 (von Mises) creep flowing along the deviatoric direction
///
/// ```text
/// ε̇ᶜ = rate(σ_eq, e_eq, t, T) · (3/2) dev(σ)/σ_eq
/// ```
///
/// with `σ_eq` the von Mises stress and `e_eq = √(2/3)‖εᶜ‖` the equivalent
/// creep strain. The direction makes the equivalent rate of ε̇ᶜ equal the
/// scalar rate.
pub struct J2Creep {
    rule: Box<dyn ScalarCreepRule>,
}

impl J2Creep {
    /// Allocates a new instance over a scalar creep rule
    pub fn new(rule: Box<dyn ScalarCreepRule>) -> Self {
        J2Creep { rule }
    }

    /// Computes (σ_eq, e_eq, n) with n = (3/2) dev(σ)/σ_eq (zeroed at σ_eq = 0)
    fn invariants(stress: &Tensor2, creep_strain: &Tensor2) -> (f64, f64, [f64; 6]) {
        let sigma_eq = stress.invariant_sigma_d();
        let ec = creep_strain.vector();
        let norm_ec = ec.as_data().iter().map(|v| v * v).sum::<f64>().sqrt();
        let eps_eq = SQRT_2_BY_3 * norm_ec;
        let sig = stress.vector();
        let mean = (sig[0] + sig[1] + sig[2]) / 3.0;
        let mut n = [0.0; 6];
        if sigma_eq > 0.0 {
            for i in 0..6 {
                n[i] = 1.5 * (sig[i] - mean * I[i]) / sigma_eq;
            }
        }
        (sigma_eq, eps_eq, n)
    }
}

impl CreepModel for J2Creep {
    fn rate(
        &self,
        stress: &Tensor2,
        creep_strain: &Tensor2,
        time: f64,
        temperature: f64,
        out: &mut Tensor2,
    ) -> Result<(), Error> {
        let (sigma_eq, eps_eq, n) = J2Creep::invariants(stress, creep_strain);
        let v = out.vector_mut();
        if sigma_eq <= 0.0 {
            v.fill(0.0);
            return Ok(());
        }
        let rate = self.rule.rate(sigma_eq, eps_eq, time, temperature)?;
        for i in 0..6 {
            v[i] = rate * n[i];
        }
        Ok(())
    }

    fn drate_dstress(
        &self,
        stress: &Tensor2,
        creep_strain: &Tensor2,
        time: f64,
        temperature: f64,
        out: &mut Tensor4,
    ) -> Result<(), Error> {
        let (sigma_eq, eps_eq, n) = J2Creep::invariants(stress, creep_strain);
        let mat = out.matrix_mut();
        if sigma_eq <= 0.0 {
            mat.fill(0.0);
            return Ok(());
        }
        let rate = self.rule.rate(sigma_eq, eps_eq, time, temperature)?;
        let drate = self.rule.drate_dstress(sigma_eq, eps_eq, time, temperature)?;
        // dσ_eq/dσ = (2/3) n and dnᵢ/dσⱼ = (3/2)(Psymdev[i][j] - (2/3) nᵢ nⱼ)/σ_eq
        for i in 0..6 {
            for j in 0..6 {
                let dn = 1.5 * (PSD[i][j] - 2.0 / 3.0 * n[i] * n[j]) / sigma_eq;
                mat.set(i, j, n[i] * drate * 2.0 / 3.0 * n[j] + rate * dn);
            }
        }
        Ok(())
    }

    fn drate_dstrain(
        &self,
        stress: &Tensor2,
        creep_strain: &Tensor2,
        time: f64,
        temperature: f64,
        out: &mut Tensor4,
    ) -> Result<(), Error> {
        let (sigma_eq, eps_eq, n) = J2Creep::invariants(stress, creep_strain);
        let mat = out.matrix_mut();
        mat.fill(0.0);
        if sigma_eq <= 0.0 || eps_eq <= 0.0 {
            return Ok(());
        }
        let drate = self.rule.drate_dstrain(sigma_eq, eps_eq, time, temperature)?;
        // de_eq/dεᶜ = (2/3) εᶜ/e_eq
        let ec = creep_strain.vector();
        for i in 0..6 {
            for j in 0..6 {
                mat.set(i, j, n[i] * drate * 2.0 / 3.0 * ec[j] / eps_eq);
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
