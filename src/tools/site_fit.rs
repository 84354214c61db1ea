use itertools::Itertools;
use log::debug;
use ndarray::ArrayView1;
use serde::{
    Deserialize,
    Serialize,
};

use super::curve::kinetic;
use super::likelihood::{
    ln_density,
    PROPORTION_EPS,
};
use super::optim::{
    minimize_nelder_mead,
    minimize_scalar,
    Objective,
    OptimizerSettings,
};
use crate::data_structs::{
    CohortMatrix,
    FitOutcome,
    LikelihoodFamily,
    SiteParams,
};
use crate::error::FailureReason;
use crate::with_field_fn;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;
const MAX_PRECISION: f64 = 1e6;
const MIN_PRECISION: f64 = 1.0;

/// Priors and guards of the site-level fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SitePriors {
    /// Scale of the half-normal prior on the saturation rate.
    pub saturation_scale: f64,
    pub max_saturation:   f64,
    /// Floor of the profiled normal standard deviation.
    pub min_dispersion:   f64,
    pub min_observations: usize,
}

impl SitePriors {
    with_field_fn!(saturation_scale, f64);

    with_field_fn!(max_saturation, f64);

    with_field_fn!(min_dispersion, f64);

    with_field_fn!(min_observations, usize);

    fn saturation_penalty(
        &self,
        saturation: f64,
    ) -> f64 {
        0.5 * (saturation / self.saturation_scale).powi(2)
    }
}

impl Default for SitePriors {
    fn default() -> Self {
        Self {
            saturation_scale: 0.1,
            max_saturation:   1.0,
            min_dispersion:   1e-4,
            min_observations: 3,
        }
    }
}

/// Per-site MAP fit of the kinetic curve on `(age, methylation)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteFitter {
    family:   LikelihoodFamily,
    priors:   SitePriors,
    settings: OptimizerSettings,
}

impl SiteFitter {
    pub fn new(
        family: LikelihoodFamily,
        priors: SitePriors,
        settings: OptimizerSettings,
    ) -> Self {
        Self {
            family,
            priors,
            settings,
        }
    }

    pub fn family(&self) -> LikelihoodFamily { self.family }

    /// Fits every site (row) of `chunk` against the ages of its participants
    /// (columns). The output follows the row order.
    pub fn fit_chunk(
        &self,
        chunk: &CohortMatrix,
    ) -> Vec<(String, FitOutcome<SiteParams>)> {
        let ages = chunk
            .cols()
            .iter()
            .map(|p| p.age)
            .collect_vec();
        chunk
            .rows()
            .iter()
            .enumerate()
            .map(|(i, site)| {
                let outcome = self.fit_site(&site.id, &ages, chunk.row(i));
                (site.id.clone(), outcome)
            })
            .collect()
    }

    /// Fits one site. Missing values and missing ages are skipped.
    pub fn fit_site(
        &self,
        id: &str,
        ages: &[f64],
        values: ArrayView1<'_, f64>,
    ) -> FitOutcome<SiteParams> {
        let result = Observations::collect(ages, values, self.priors.min_observations)
            .and_then(|obs| {
                let normal = fit_normal(&obs, &self.priors)?;
                match self.family {
                    LikelihoodFamily::Normal => Ok(normal),
                    LikelihoodFamily::Beta => fit_beta(&obs, &self.priors, &self.settings, &normal),
                }
            })
            .and_then(|params| {
                if params.is_finite() {
                    Ok(params)
                }
                else {
                    Err(FailureReason::NonFinite)
                }
            });
        match result {
            Ok(params) => FitOutcome::Fitted(params),
            Err(reason) => {
                debug!("Site {id} not fitted: {reason}");
                FitOutcome::failed(id, reason)
            },
        }
    }
}

struct Observations {
    ages:   Vec<f64>,
    values: Vec<f64>,
}

impl Observations {
    fn collect(
        ages: &[f64],
        values: ArrayView1<'_, f64>,
        required: usize,
    ) -> Result<Self, FailureReason> {
        let (ages, values): (Vec<f64>, Vec<f64>) = ages
            .iter()
            .zip(values.iter())
            .filter(|(t, y)| t.is_finite() && y.is_finite())
            .map(|(t, y)| (*t, *y))
            .unzip();
        let found = values.len();
        if found < required.max(2) {
            return Err(FailureReason::TooFewObservations {
                found,
                required: required.max(2),
            });
        }
        let (lo, hi) = ages
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
                (lo.min(*t), hi.max(*t))
            });
        if hi - lo <= 0.0 {
            return Err(FailureReason::DegenerateAges);
        }
        Ok(Self { ages, values })
    }

    fn len(&self) -> f64 { self.values.len() as f64 }
}

/// Least-squares line of `values` on `g(saturation, age)`.
struct LineFit {
    baseline: f64,
    rate:     f64,
    rss:      f64,
}

fn least_squares(
    obs: &Observations,
    saturation: f64,
) -> LineFit {
    let x = obs
        .ages
        .iter()
        .map(|t| kinetic(saturation, *t))
        .collect_vec();
    let n = obs.len();
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = obs.values.iter().sum::<f64>() / n;
    let (sxx, sxy) = x
        .iter()
        .zip(obs.values.iter())
        .fold((0.0, 0.0), |(sxx, sxy), (xi, yi)| {
            (
                sxx + (xi - x_mean).powi(2),
                sxy + (xi - x_mean) * (yi - y_mean),
            )
        });
    let (baseline, rate) = if sxx > f64::EPSILON * (1.0 + x_mean * x_mean) {
        let rate = sxy / sxx;
        (y_mean - rate * x_mean, rate)
    }
    else {
        (y_mean, 0.0)
    };
    let rss = x
        .iter()
        .zip(obs.values.iter())
        .map(|(xi, yi)| (yi - baseline - rate * xi).powi(2))
        .sum();
    LineFit {
        baseline,
        rate,
        rss,
    }
}

fn profiled_sigma(
    obs: &Observations,
    line: &LineFit,
    priors: &SitePriors,
) -> f64 {
    (line.rss / obs.len())
        .sqrt()
        .max(priors.min_dispersion)
}

/// Negative log-posterior with baseline, rate and sigma profiled out.
fn profiled_cost(
    obs: &Observations,
    priors: &SitePriors,
    saturation: f64,
) -> f64 {
    let line = least_squares(obs, saturation);
    let sigma = profiled_sigma(obs, &line, priors);
    let n = obs.len();
    n * sigma.ln() + n * LN_SQRT_2PI + line.rss / (2.0 * sigma * sigma)
        + priors.saturation_penalty(saturation)
}

fn fit_normal(
    obs: &Observations,
    priors: &SitePriors,
) -> Result<SiteParams, FailureReason> {
    let linear_cost = profiled_cost(obs, priors, 0.0);
    let saturation = if priors.max_saturation > 0.0 {
        let (candidate, cost) = minimize_scalar(
            |k| profiled_cost(obs, priors, k),
            0.0,
            priors.max_saturation,
            200,
        )?;
        // The linear limit wins ties.
        if cost < linear_cost {
            candidate
        }
        else {
            0.0
        }
    }
    else {
        0.0
    };
    let line = least_squares(obs, saturation);
    Ok(SiteParams {
        baseline: line.baseline,
        rate: line.rate,
        saturation,
        dispersion: profiled_sigma(obs, &line, priors),
        family: LikelihoodFamily::Normal,
    })
}

struct BetaSiteObjective<'a> {
    obs:    &'a Observations,
    priors: &'a SitePriors,
}

impl Objective for BetaSiteObjective<'_> {
    fn cost(
        &self,
        params: &[f64],
    ) -> f64 {
        let (baseline, rate, saturation, precision) =
            (params[0], params[1], params[2], params[3].exp());
        let ll: f64 = self
            .obs
            .ages
            .iter()
            .zip(self.obs.values.iter())
            .map(|(t, y)| {
                let mu = baseline + rate * kinetic(saturation, *t);
                ln_density(LikelihoodFamily::Beta, mu, *y, precision)
            })
            .sum();
        -ll + self.priors.saturation_penalty(saturation)
    }
}

/// Moment-matched beta precision around the normal curve.
fn seed_precision(
    obs: &Observations,
    normal: &SiteParams,
) -> f64 {
    let mean = obs
        .ages
        .iter()
        .map(|t| {
            normal
                .curve(*t)
                .clamp(PROPORTION_EPS, 1.0 - PROPORTION_EPS)
        })
        .sum::<f64>()
        / obs.len();
    let variance = normal.dispersion.powi(2);
    (mean * (1.0 - mean) / variance - 1.0).clamp(MIN_PRECISION, MAX_PRECISION)
}

fn fit_beta(
    obs: &Observations,
    priors: &SitePriors,
    settings: &OptimizerSettings,
    normal: &SiteParams,
) -> Result<SiteParams, FailureReason> {
    let precision = seed_precision(obs, normal);
    let init = [
        normal.baseline,
        normal.rate,
        normal.saturation,
        precision.ln(),
    ];
    let steps = [
        0.02,
        (normal.rate.abs() * 0.2).max(1e-4),
        (normal.saturation * 0.2).max(0.005),
        0.2,
    ];
    let bounds = [
        (f64::NEG_INFINITY, f64::INFINITY),
        (f64::NEG_INFINITY, f64::INFINITY),
        (0.0, priors.max_saturation),
        (MIN_PRECISION.ln(), MAX_PRECISION.ln()),
    ];
    let objective = BetaSiteObjective { obs, priors };
    let min = minimize_nelder_mead(&objective, &init, &steps, &bounds, settings)?.into_converged()?;
    Ok(SiteParams {
        baseline:   min.params[0],
        rate:       min.params[1],
        saturation: min.params[2],
        dispersion: min.params[3].exp(),
        family:     LikelihoodFamily::Beta,
    })
}
