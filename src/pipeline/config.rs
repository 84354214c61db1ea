use serde::{
    Deserialize,
    Serialize,
};

use crate::data_structs::{
    AlignmentTarget,
    LikelihoodFamily,
    PersonOptimizer,
    QcRule,
    SiteSelection,
};
use crate::error::{
    ClockError,
    ClockResult,
};
use crate::tools::{
    OptimizerSettings,
    PersonPriors,
    QcGate,
    SitePriors,
};
use crate::with_field_fn;

/// Everything a run depends on. Passed explicitly into every entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// `0` uses every available core, `1` runs sequentially.
    pub n_workers:         usize,
    pub site_chunk_size:   usize,
    pub person_chunk_size: usize,
    pub family:            LikelihoodFamily,
    pub person_optimizer:  PersonOptimizer,
    pub site_selection:    SiteSelection,
    pub qc_rule:           QcRule,
    pub alignment_target:  AlignmentTarget,
    /// Bound of the beta-family offset search.
    pub max_offset:        f64,
    pub min_offset_obs:    usize,
    pub site_priors:       SitePriors,
    pub person_priors:     PersonPriors,
    pub site_optimizer:    OptimizerSettings,
    pub person_settings:   OptimizerSettings,
}

impl ClockConfig {
    with_field_fn!(n_workers, usize);

    with_field_fn!(site_chunk_size, usize);

    with_field_fn!(person_chunk_size, usize);

    with_field_fn!(family, LikelihoodFamily);

    with_field_fn!(person_optimizer, PersonOptimizer);

    with_field_fn!(site_selection, SiteSelection);

    with_field_fn!(qc_rule, QcRule);

    with_field_fn!(alignment_target, AlignmentTarget);

    with_field_fn!(max_offset, f64);

    with_field_fn!(min_offset_obs, usize);

    with_field_fn!(site_priors, SitePriors);

    with_field_fn!(person_priors, PersonPriors);

    with_field_fn!(site_optimizer, OptimizerSettings);

    with_field_fn!(person_settings, OptimizerSettings);

    pub fn validate(&self) -> ClockResult<()> {
        let invalid = |msg: String| Err(ClockError::InvalidConfig(msg));
        if self.site_chunk_size == 0 || self.person_chunk_size == 0 {
            return invalid("chunk sizes must be positive".into());
        }
        if let SiteSelection::TopByAgeCorrelation { n: 0 } = self.site_selection {
            return invalid("panel size must be positive".into());
        }
        if !(self.max_offset > 0.0) {
            return invalid(format!("max offset {} must be positive", self.max_offset));
        }
        let priors = &self.site_priors;
        if !(priors.saturation_scale > 0.0)
            || !(priors.max_saturation >= 0.0)
            || !(priors.min_dispersion > 0.0)
        {
            return invalid(format!("invalid site priors {priors:?}"));
        }
        for settings in [&self.site_optimizer, &self.person_settings] {
            if settings.max_iters == 0 || !(settings.tolerance > 0.0) || settings.memory == 0 {
                return invalid(format!("invalid optimizer settings {settings:?}"));
            }
        }
        self.person_priors
            .validate()
            .map_err(ClockError::InvalidConfig)?;
        QcGate::new(self.qc_rule)
            .validate()
            .map_err(ClockError::InvalidConfig)?;
        Ok(())
    }

    pub fn to_json(&self) -> ClockResult<String> { Ok(serde_json::to_string_pretty(self)?) }

    pub fn from_json(json: &str) -> ClockResult<Self> { Ok(serde_json::from_str(json)?) }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            n_workers:         0,
            site_chunk_size:   15,
            person_chunk_size: 10,
            family:            LikelihoodFamily::default(),
            person_optimizer:  PersonOptimizer::default(),
            site_selection:    SiteSelection::default(),
            qc_rule:           QcRule::default(),
            alignment_target:  AlignmentTarget::default(),
            max_offset:        0.5,
            min_offset_obs:    1,
            site_priors:       SitePriors::default(),
            person_priors:     PersonPriors::default(),
            site_optimizer:    OptimizerSettings::default().with_max_iters(2_000),
            person_settings:   OptimizerSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(ClockConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = ClockConfig::default().with_person_chunk_size(0);
        assert!(matches!(
            config.validate(),
            Err(ClockError::InvalidConfig(_))
        ));
    }

    #[test]
    fn initial_guess_must_be_inside_bounds() {
        let priors = PersonPriors::default().with_bias_bounds((0.1, 0.2));
        assert!(ClockConfig::default()
            .with_person_priors(priors)
            .validate()
            .is_err());
    }

    #[test]
    fn json_round_trip() {
        let config = ClockConfig::default()
            .with_family(LikelihoodFamily::Normal)
            .with_qc_rule(QcRule::Quantile { q: 0.05 })
            .with_site_selection(SiteSelection::ReusePanel);
        let json = config.to_json().unwrap();
        assert_eq!(ClockConfig::from_json(&json).unwrap(), config);
    }
}
