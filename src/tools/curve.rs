//! Kinetic age curve shared by the site, person and alignment fits.

use crate::data_structs::{
    PersonParams,
    SiteParams,
};

/// Integrated kinetics `g(k, t)`: `t` for `k = 0`, `(1 - exp(-k t)) / k`
/// otherwise. Starts at `0` with unit slope and saturates at `1 / k`.
pub fn kinetic(
    saturation: f64,
    age: f64,
) -> f64 {
    if saturation == 0.0 {
        age
    }
    else {
        -(-saturation * age).exp_m1() / saturation
    }
}

/// Slope `dg/dt` of [`kinetic`].
pub fn kinetic_slope(
    saturation: f64,
    age: f64,
) -> f64 {
    (-saturation * age).exp()
}

/// Expected methylation of a site at `age`.
///
/// Pure function of its inputs, usable to overlay a fitted curve on raw data.
pub fn curve(
    params: &SiteParams,
    age: f64,
) -> f64 {
    params.baseline + params.rate * kinetic(params.saturation, age)
}

/// Expected methylation of a site for a participant with deviation `person`.
pub fn person_curve(
    params: &SiteParams,
    person: &PersonParams,
    age: f64,
) -> f64 {
    curve(params, person.age_scale() * age) + person.bias
}

/// Derivative of [`person_curve`] with respect to the acceleration.
pub fn person_curve_d_acceleration(
    params: &SiteParams,
    person: &PersonParams,
    age: f64,
) -> f64 {
    let scaled_age = person.age_scale() * age;
    params.rate * kinetic_slope(params.saturation, scaled_age) * scaled_age * std::f64::consts::LN_2
}
