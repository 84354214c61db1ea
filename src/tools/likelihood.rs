//! Observation densities of the two likelihood families.

use statrs::function::gamma::{
    digamma,
    ln_gamma,
};

use crate::data_structs::LikelihoodFamily;

/// Proportions are kept this far away from `0` and `1` under the beta
/// family.
pub const PROPORTION_EPS: f64 = 1e-6;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

fn clamp_proportion(value: f64) -> f64 { value.clamp(PROPORTION_EPS, 1.0 - PROPORTION_EPS) }

/// Log density of observation `y` with expected value `mu`.
///
/// `dispersion` is the standard deviation for [`LikelihoodFamily::Normal`]
/// and the precision for [`LikelihoodFamily::Beta`]. Invalid dispersion
/// yields `-inf`.
pub fn ln_density(
    family: LikelihoodFamily,
    mu: f64,
    y: f64,
    dispersion: f64,
) -> f64 {
    if !(dispersion > 0.0) || !dispersion.is_finite() {
        return f64::NEG_INFINITY;
    }
    match family {
        LikelihoodFamily::Normal => {
            let z = (y - mu) / dispersion;
            -dispersion.ln() - LN_SQRT_2PI - 0.5 * z * z
        },
        LikelihoodFamily::Beta => {
            let mu = clamp_proportion(mu);
            let y = clamp_proportion(y);
            let a = mu * dispersion;
            let b = (1.0 - mu) * dispersion;
            ln_gamma(dispersion) - ln_gamma(a) - ln_gamma(b)
                + (a - 1.0) * y.ln()
                + (b - 1.0) * (1.0 - y).ln()
        },
    }
}

/// Derivative of [`ln_density`] with respect to `mu`.
///
/// Zero where the beta mean is clamped, matching the flat density there.
pub fn d_ln_density_d_mu(
    family: LikelihoodFamily,
    mu: f64,
    y: f64,
    dispersion: f64,
) -> f64 {
    match family {
        LikelihoodFamily::Normal => (y - mu) / (dispersion * dispersion),
        LikelihoodFamily::Beta => {
            if !(PROPORTION_EPS..=1.0 - PROPORTION_EPS).contains(&mu) {
                return 0.0;
            }
            let y = clamp_proportion(y);
            let a = mu * dispersion;
            let b = (1.0 - mu) * dispersion;
            dispersion * (digamma(b) - digamma(a) + y.ln() - (1.0 - y).ln())
        },
    }
}

/// Sum of [`ln_density`] over the finite observations.
pub fn total_ln_density<I>(
    family: LikelihoodFamily,
    dispersion: f64,
    pairs: I,
) -> f64
where
    I: IntoIterator<Item = (f64, f64)>, {
    pairs
        .into_iter()
        .filter(|(_, y)| y.is_finite())
        .map(|(mu, y)| ln_density(family, mu, y, dispersion))
        .sum()
}
