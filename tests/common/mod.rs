#![allow(dead_code)]
use epiclock::prelude::*;
use ndarray::Array2;
use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use rand_distr::{
    Beta,
    Distribution,
    Normal,
};

/// Synthetic cohort with known site curves and person deviations.
pub struct DemoCohortBuilder {
    pub n_sites:    usize,
    pub n_controls: usize,
    pub n_cases:    usize,
    pub family:     LikelihoodFamily,
    /// Residual sd (normal) or precision (beta).
    pub dispersion: f64,
    pub seed:       u64,
}

pub struct DemoCohort {
    pub cohort:      CohortMatrix,
    pub site_params: Vec<SiteParams>,
    pub persons:     Vec<PersonParams>,
}

impl DemoCohortBuilder {
    pub fn new(
        family: LikelihoodFamily,
        seed: u64,
    ) -> Self {
        let dispersion = match family {
            LikelihoodFamily::Normal => 0.01,
            LikelihoodFamily::Beta => 400.0,
        };
        Self {
            n_sites: 40,
            n_controls: 40,
            n_cases: 20,
            family,
            dispersion,
            seed,
        }
    }

    pub fn sites(
        mut self,
        n: usize,
    ) -> Self {
        self.n_sites = n;
        self
    }

    pub fn participants(
        mut self,
        n_controls: usize,
        n_cases: usize,
    ) -> Self {
        self.n_controls = n_controls;
        self.n_cases = n_cases;
        self
    }

    pub fn build(&self) -> DemoCohort {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let site_params = (0..self.n_sites)
            .map(|i| {
                let rate = rng.gen_range(0.003..0.008);
                SiteParams {
                    baseline: rng.gen_range(0.15..0.35),
                    rate: if i % 2 == 0 { rate } else { -rate / 2.0 },
                    saturation: if i % 3 == 0 { rng.gen_range(0.005..0.02) } else { 0.0 },
                    dispersion: self.dispersion,
                    family: self.family,
                }
            })
            .collect::<Vec<_>>();

        let n = self.n_controls + self.n_cases;
        let participants = (0..n)
            .map(|j| {
                let age = rng.gen_range(20.0..80.0);
                Participant::new(format!("p{j:03}"), age, j < self.n_controls)
            })
            .collect::<Vec<_>>();
        let persons = (0..n)
            .map(|j| {
                if j < self.n_controls {
                    PersonParams::NEUTRAL
                }
                else {
                    PersonParams {
                        acceleration: rng.gen_range(-0.5..0.5),
                        bias: rng.gen_range(-0.03..0.03),
                    }
                }
            })
            .collect::<Vec<_>>();

        let mut values = Array2::zeros((self.n_sites, n));
        for (i, params) in site_params.iter().enumerate() {
            for (j, (participant, person)) in participants.iter().zip(&persons).enumerate() {
                let mu = params.curve(person.age_scale() * participant.age) + person.bias;
                values[[i, j]] = self.sample(&mut rng, mu);
            }
        }
        let sites = (0..self.n_sites)
            .map(|i| Site::new(format!("cg{i:04}")))
            .collect();
        DemoCohort {
            cohort: CohortMatrix::from_parts(values, sites, participants).unwrap(),
            site_params,
            persons,
        }
    }

    fn sample(
        &self,
        rng: &mut ChaCha8Rng,
        mu: f64,
    ) -> f64 {
        match self.family {
            LikelihoodFamily::Normal => {
                Normal::new(mu, self.dispersion)
                    .unwrap()
                    .sample(rng)
            },
            LikelihoodFamily::Beta => {
                let mu = mu.clamp(0.01, 0.99);
                Beta::new(mu * self.dispersion, (1.0 - mu) * self.dispersion)
                    .unwrap()
                    .sample(rng)
            },
        }
    }
}

/// Cohort whose sites already carry the true parameters.
pub fn with_true_params(demo: &DemoCohort) -> CohortMatrix {
    let mut cohort = demo.cohort.clone();
    for (site, params) in cohort
        .rows_mut()
        .iter_mut()
        .zip(&demo.site_params)
    {
        site.params = Some(FitOutcome::Fitted(*params));
    }
    cohort
}

pub fn sequential_config(family: LikelihoodFamily) -> ClockConfig {
    ClockConfig::default()
        .with_family(family)
        .with_n_workers(1)
}
