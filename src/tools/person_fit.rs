use itertools::Itertools;
use log::debug;
use ndarray::ArrayView1;
use serde::{
    Deserialize,
    Serialize,
};

use super::curve::{
    person_curve,
    person_curve_d_acceleration,
};
use super::likelihood::{
    d_ln_density_d_mu,
    ln_density,
};
use super::optim::{
    minimize_lbfgsb,
    minimize_nelder_mead,
    with_fallback,
    Minimum,
    Objective,
    OptimizerSettings,
};
use crate::data_structs::{
    FitOutcome,
    PersonMatrix,
    PersonOptimizer,
    PersonParams,
    SiteParams,
};
use crate::error::FailureReason;
use crate::with_field_fn;

/// Gaussian priors, box and starting point of the person-level fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonPriors {
    pub acceleration_sd:     f64,
    pub bias_sd:             f64,
    pub acceleration_bounds: (f64, f64),
    pub bias_bounds:         (f64, f64),
    pub initial:             PersonParams,
}

impl PersonPriors {
    with_field_fn!(acceleration_sd, f64);

    with_field_fn!(bias_sd, f64);

    with_field_fn!(acceleration_bounds, (f64, f64));

    with_field_fn!(bias_bounds, (f64, f64));

    with_field_fn!(initial, PersonParams);

    fn bounds(&self) -> [(f64, f64); 2] { [self.acceleration_bounds, self.bias_bounds] }

    /// Checks that the box is non-empty and holds the initial guess.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.acceleration_sd > 0.0) || !(self.bias_sd > 0.0) {
            return Err("person prior standard deviations must be positive".into());
        }
        let inside = |(lo, hi): (f64, f64), v: f64| lo <= v && v <= hi;
        if !inside(self.acceleration_bounds, self.initial.acceleration)
            || !inside(self.bias_bounds, self.initial.bias)
        {
            return Err(format!(
                "initial guess {:?} lies outside the person bounds",
                self.initial
            ));
        }
        Ok(())
    }
}

impl Default for PersonPriors {
    fn default() -> Self {
        Self {
            acceleration_sd:     2.0,
            bias_sd:             0.5,
            acceleration_bounds: (-4.0, 4.0),
            bias_bounds:         (-1.0, 1.0),
            initial:             PersonParams::NEUTRAL,
        }
    }
}

/// Fitted parameters of the sites (columns) of a participant-oriented
/// matrix, `None` where a site has none.
pub fn panel_params(matrix: &PersonMatrix) -> Vec<Option<&SiteParams>> {
    matrix
        .cols()
        .iter()
        .map(|site| site.fitted_params())
        .collect_vec()
}

/// One participant's observations against the fitted panel.
pub struct PersonObservations<'a> {
    pub age:    f64,
    pub sites:  Vec<&'a SiteParams>,
    pub values: Vec<f64>,
}

impl<'a> PersonObservations<'a> {
    /// Pairs finite values with their site parameters; unfitted sites
    /// (`None`) are dropped.
    pub fn collect(
        age: f64,
        sites: &[Option<&'a SiteParams>],
        values: ArrayView1<'_, f64>,
    ) -> Self {
        let (sites, values) = sites
            .iter()
            .zip(values.iter())
            .filter_map(|(site, y)| site.filter(|_| y.is_finite()).map(|s| (s, *y)))
            .unzip();
        Self { age, sites, values }
    }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Log-likelihood of the observations for the person deviation `params`.
    pub fn log_likelihood(
        &self,
        params: &PersonParams,
    ) -> f64 {
        self.sites
            .iter()
            .zip(self.values.iter())
            .map(|(site, y)| {
                let mu = person_curve(site, params, self.age);
                ln_density(site.family, mu, *y, site.dispersion)
            })
            .sum()
    }
}

struct PersonObjective<'a, 'b> {
    obs:    &'b PersonObservations<'a>,
    priors: &'b PersonPriors,
}

fn as_params(p: &[f64]) -> PersonParams {
    PersonParams {
        acceleration: p[0],
        bias:         p[1],
    }
}

impl Objective for PersonObjective<'_, '_> {
    fn cost(
        &self,
        p: &[f64],
    ) -> f64 {
        let params = as_params(p);
        -self.obs.log_likelihood(&params)
            + 0.5 * (params.acceleration / self.priors.acceleration_sd).powi(2)
            + 0.5 * (params.bias / self.priors.bias_sd).powi(2)
    }

    fn gradient(
        &self,
        p: &[f64],
    ) -> Vec<f64> {
        let params = as_params(p);
        let (d_acc, d_bias) = self
            .obs
            .sites
            .iter()
            .zip(self.obs.values.iter())
            .fold((0.0, 0.0), |(d_acc, d_bias), (site, y)| {
                let mu = person_curve(site, &params, self.obs.age);
                let score = d_ln_density_d_mu(site.family, mu, *y, site.dispersion);
                (
                    d_acc + score * person_curve_d_acceleration(site, &params, self.obs.age),
                    d_bias + score,
                )
            });
        vec![
            -d_acc + params.acceleration / self.priors.acceleration_sd.powi(2),
            -d_bias + params.bias / self.priors.bias_sd.powi(2),
        ]
    }
}

/// Per-participant MAP fit of acceleration and bias against fixed site
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonFitter {
    optimizer: PersonOptimizer,
    priors:    PersonPriors,
    settings:  OptimizerSettings,
}

impl PersonFitter {
    pub fn new(
        optimizer: PersonOptimizer,
        priors: PersonPriors,
        settings: OptimizerSettings,
    ) -> Self {
        Self {
            optimizer,
            priors,
            settings,
        }
    }

    pub fn priors(&self) -> &PersonPriors { &self.priors }

    /// Fits every participant (row) of `chunk` against the fitted sites among
    /// its columns. The output follows the row order.
    pub fn fit_chunk(
        &self,
        chunk: &PersonMatrix,
    ) -> Vec<(String, FitOutcome<PersonParams>)> {
        let sites = panel_params(chunk);
        chunk
            .rows()
            .iter()
            .enumerate()
            .map(|(i, participant)| {
                let obs = PersonObservations::collect(participant.age, &sites, chunk.row(i));
                (participant.id.clone(), self.fit_person(&participant.id, &obs))
            })
            .collect()
    }

    pub fn fit_person(
        &self,
        id: &str,
        obs: &PersonObservations<'_>,
    ) -> FitOutcome<PersonParams> {
        match self.try_fit(obs) {
            Ok(params) => FitOutcome::Fitted(params),
            Err(reason) => {
                debug!("Participant {id} not fitted: {reason}");
                FitOutcome::failed(id, reason)
            },
        }
    }

    fn try_fit(
        &self,
        obs: &PersonObservations<'_>,
    ) -> Result<PersonParams, FailureReason> {
        if !obs.age.is_finite() {
            return Err(FailureReason::NonFinite);
        }
        if obs.is_empty() {
            return Err(FailureReason::NoFittedSites);
        }
        let objective = PersonObjective {
            obs,
            priors: &self.priors,
        };
        let init = [
            self.priors.initial.acceleration,
            self.priors.initial.bias,
        ];
        let bounds = self.priors.bounds();

        let grad_norm = objective
            .gradient(&init)
            .iter()
            .map(|g| g * g)
            .sum::<f64>()
            .sqrt();
        if grad_norm < self.settings.tolerance {
            return Ok(self.priors.initial);
        }

        let min = match self.optimizer {
            PersonOptimizer::Lbfgsb => {
                with_fallback(
                    minimize_lbfgsb(&objective, &init, &bounds, &self.settings),
                    |reason| {
                        debug!("L-BFGS-B failed ({reason}), retrying with Nelder-Mead");
                        self.nelder_mead(&objective, &init, &bounds)
                    },
                )?
            },
            PersonOptimizer::NelderMead => self.nelder_mead(&objective, &init, &bounds)?,
        }
        .into_converged()?;
        Ok(as_params(&min.params))
    }

    fn nelder_mead(
        &self,
        objective: &PersonObjective<'_, '_>,
        init: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<Minimum, FailureReason> {
        let steps = [0.1, 0.01];
        minimize_nelder_mead(objective, init, &steps, bounds, &self.settings)
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array1;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{
        Distribution,
        Normal,
    };
    use rstest::{
        fixture,
        rstest,
    };

    use super::*;
    use crate::data_structs::LikelihoodFamily;

    #[fixture]
    fn panel() -> Vec<SiteParams> {
        (0..40)
            .map(|i| {
                SiteParams {
                    baseline:   0.2 + 0.01 * (i % 7) as f64,
                    rate:       if i % 2 == 0 { 0.006 } else { -0.004 },
                    saturation: 0.01 * (i % 3) as f64,
                    dispersion: 0.01,
                    family:     LikelihoodFamily::Normal,
                }
            })
            .collect()
    }

    fn fitter(optimizer: PersonOptimizer) -> PersonFitter {
        PersonFitter::new(
            optimizer,
            PersonPriors::default(),
            OptimizerSettings::default(),
        )
    }

    fn observe(
        panel: &[SiteParams],
        truth: &PersonParams,
        age: f64,
        noise_sd: f64,
        seed: u64,
    ) -> Array1<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let noise = Normal::new(0.0, noise_sd).unwrap();
        panel
            .iter()
            .map(|site| person_curve(site, truth, age) + noise.sample(&mut rng))
            .collect()
    }

    #[rstest]
    fn on_curve_participant_is_neutral(panel: Vec<SiteParams>) {
        let values = panel
            .iter()
            .map(|site| site.curve(45.0))
            .collect::<Array1<f64>>();
        let sites = panel.iter().map(Some).collect_vec();
        let obs = PersonObservations::collect(45.0, &sites, values.view());
        let params = fitter(PersonOptimizer::Lbfgsb)
            .fit_person("p", &obs)
            .fitted()
            .copied()
            .unwrap();
        assert_approx_eq!(params.acceleration, 0.0, 1e-9);
        assert_approx_eq!(params.bias, 0.0, 1e-9);
        let shifted = PersonParams {
            acceleration: 0.1,
            bias:         0.01,
        };
        assert!(obs.log_likelihood(&params) > obs.log_likelihood(&shifted));
    }

    #[rstest]
    #[case(PersonOptimizer::Lbfgsb)]
    #[case(PersonOptimizer::NelderMead)]
    fn deviations_are_recovered(
        panel: Vec<SiteParams>,
        #[case] optimizer: PersonOptimizer,
    ) {
        let truth = PersonParams {
            acceleration: 0.5,
            bias:         -0.03,
        };
        let values = observe(&panel, &truth, 50.0, 0.002, 3);
        let sites = panel.iter().map(Some).collect_vec();
        let obs = PersonObservations::collect(50.0, &sites, values.view());
        let params = fitter(optimizer)
            .fit_person("p", &obs)
            .fitted()
            .copied()
            .unwrap();
        assert_approx_eq!(params.acceleration, truth.acceleration, 0.1);
        assert_approx_eq!(params.bias, truth.bias, 0.005);
    }

    #[rstest]
    fn bounds_hold(panel: Vec<SiteParams>) {
        let values = panel
            .iter()
            .map(|site| site.curve(40.0) + 3.0)
            .collect::<Array1<f64>>();
        let sites = panel.iter().map(Some).collect_vec();
        let obs = PersonObservations::collect(40.0, &sites, values.view());
        let params = fitter(PersonOptimizer::Lbfgsb)
            .fit_person("p", &obs)
            .fitted()
            .copied()
            .unwrap();
        assert!(params.bias <= 1.0 && params.bias >= 0.99);
    }

    #[rstest]
    fn unfitted_sites_are_ignored(panel: Vec<SiteParams>) {
        let values = observe(&panel, &PersonParams::NEUTRAL, 30.0, 0.0, 0);
        let sites = panel
            .iter()
            .map(|_| None)
            .collect_vec();
        let obs = PersonObservations::collect(30.0, &sites, values.view());
        assert!(obs.is_empty());
        let outcome = fitter(PersonOptimizer::Lbfgsb).fit_person("p", &obs);
        assert_eq!(
            outcome.failure().map(|f| &f.reason),
            Some(&FailureReason::NoFittedSites)
        );
    }

    #[rstest]
    fn analytic_gradient_matches_numeric(panel: Vec<SiteParams>) {
        let values = observe(&panel, &PersonParams::NEUTRAL, 60.0, 0.01, 5);
        let sites = panel.iter().map(Some).collect_vec();
        let obs = PersonObservations::collect(60.0, &sites, values.view());
        let priors = PersonPriors::default();
        let objective = PersonObjective {
            obs:    &obs,
            priors: &priors,
        };
        let point = [0.3, 0.02];
        let analytic = objective.gradient(&point);
        let h = 1e-6;
        for i in 0..2 {
            let mut up = point;
            up[i] += h;
            let mut down = point;
            down[i] -= h;
            let numeric = (objective.cost(&up) - objective.cost(&down)) / (2.0 * h);
            assert_approx_eq!(analytic[i], numeric, 1e-3 * (1.0 + numeric.abs()));
        }
    }
}
