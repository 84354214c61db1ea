use serde::{
    Deserialize,
    Serialize,
};

use super::enums::{
    LikelihoodFamily,
    QcFlag,
};
use super::matrix::Labeled;
use crate::error::{
    FailureReason,
    OptimizationFailure,
};
use crate::tools::curve;

/// Explicit result of a per-item estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitOutcome<T> {
    Fitted(T),
    Failed(OptimizationFailure),
}

impl<T> FitOutcome<T> {
    pub fn failed<S: Into<String>>(
        item: S,
        reason: FailureReason,
    ) -> Self {
        FitOutcome::Failed(OptimizationFailure::new(item, reason))
    }

    pub fn fitted(&self) -> Option<&T> {
        match self {
            FitOutcome::Fitted(value) => Some(value),
            FitOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&OptimizationFailure> {
        match self {
            FitOutcome::Fitted(_) => None,
            FitOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn is_fitted(&self) -> bool { matches!(self, FitOutcome::Fitted(_)) }

    pub fn map<U, F: FnOnce(T) -> U>(
        self,
        f: F,
    ) -> FitOutcome<U> {
        match self {
            FitOutcome::Fitted(value) => FitOutcome::Fitted(f(value)),
            FitOutcome::Failed(failure) => FitOutcome::Failed(failure),
        }
    }
}

/// Population kinetic parameters of one site.
///
/// The expected methylation at age `t` is `baseline + rate * g(saturation,
/// t)` with `g(0, t) = t` and `g(k, t) = (1 - exp(-k t)) / k` otherwise. The
/// meaning of `dispersion` depends on `family`: residual standard deviation
/// for [`LikelihoodFamily::Normal`], precision for
/// [`LikelihoodFamily::Beta`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteParams {
    pub baseline:   f64,
    pub rate:       f64,
    pub saturation: f64,
    pub dispersion: f64,
    pub family:     LikelihoodFamily,
}

impl SiteParams {
    /// Expected methylation at `age`.
    pub fn curve(
        &self,
        age: f64,
    ) -> f64 {
        curve::curve(self, age)
    }

    /// Copy of the parameters with the whole curve shifted by `offset`.
    pub fn shifted(
        &self,
        offset: f64,
    ) -> Self {
        Self {
            baseline: self.baseline + offset,
            ..*self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.baseline.is_finite()
            && self.rate.is_finite()
            && self.saturation.is_finite()
            && self.dispersion.is_finite()
    }
}

/// Person-level deviation from the population curve.
///
/// `acceleration` is on a log2 scale: the participant ages `2^acceleration`
/// times as fast as the population, `0` is neutral. `bias` is added to every
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonParams {
    pub acceleration: f64,
    pub bias:         f64,
}

impl PersonParams {
    pub const NEUTRAL: PersonParams = PersonParams {
        acceleration: 0.0,
        bias:         0.0,
    };

    /// Multiplier applied to chronological age.
    pub fn age_scale(&self) -> f64 { self.acceleration.exp2() }
}

/// Everything the person stage writes back for one participant, at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonFit {
    pub params:         FitOutcome<PersonParams>,
    pub log_likelihood: f64,
    pub qc:             QcFlag,
}

/// Site-axis metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id:              String,
    /// Control probes are never selected into a clock panel.
    pub control:         bool,
    pub age_correlation: Option<f64>,
    /// Batch offset applied when this site was aligned to a reference.
    pub offset:          Option<f64>,
    pub params:          Option<FitOutcome<SiteParams>>,
}

impl Site {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id:              id.into(),
            control:         false,
            age_correlation: None,
            offset:          None,
            params:          None,
        }
    }

    pub fn with_params(
        mut self,
        params: SiteParams,
    ) -> Self {
        self.params = Some(FitOutcome::Fitted(params));
        self
    }

    pub fn fitted_params(&self) -> Option<&SiteParams> {
        self.params
            .as_ref()
            .and_then(FitOutcome::fitted)
    }
}

impl Labeled for Site {
    fn id(&self) -> &str { &self.id }
}

/// Participant-axis metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id:      String,
    pub age:     f64,
    /// Member of the control cohort used to fit site parameters.
    pub control: bool,
    pub fit:     Option<PersonFit>,
}

impl Participant {
    pub fn new<S: Into<String>>(
        id: S,
        age: f64,
        control: bool,
    ) -> Self {
        Self {
            id: id.into(),
            age,
            control,
            fit: None,
        }
    }

    pub fn person_params(&self) -> Option<&PersonParams> {
        self.fit
            .as_ref()
            .and_then(|fit| fit.params.fitted())
    }
}

impl Labeled for Participant {
    fn id(&self) -> &str { &self.id }
}
