use itertools::Itertools;
use log::debug;

use super::person_fit::{
    panel_params,
    PersonObservations,
};
use crate::data_structs::{
    FitOutcome,
    PersonMatrix,
    PersonParams,
    QcFlag,
    QcRule,
};
use crate::utils::{
    finite_quantile,
    finite_quartiles,
};

/// Total log-likelihood of a participant's observations under the fitted
/// curve shifted by that participant's deviation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LikelihoodScorer;

impl LikelihoodScorer {
    /// `NaN` for failed fits.
    pub fn score(
        &self,
        obs: &PersonObservations<'_>,
        outcome: &FitOutcome<PersonParams>,
    ) -> f64 {
        outcome
            .fitted()
            .map(|params| obs.log_likelihood(params))
            .unwrap_or(f64::NAN)
    }

    /// Scores every participant (row) of `chunk`; `outcomes` follows the row
    /// order.
    pub fn score_chunk(
        &self,
        chunk: &PersonMatrix,
        outcomes: &[FitOutcome<PersonParams>],
    ) -> Vec<f64> {
        let sites = panel_params(chunk);
        chunk
            .rows()
            .iter()
            .zip(outcomes.iter())
            .enumerate()
            .map(|(i, (participant, outcome))| {
                let obs = PersonObservations::collect(participant.age, &sites, chunk.row(i));
                self.score(&obs, outcome)
            })
            .collect_vec()
    }
}

/// Turns cohort log-likelihoods into advisory [`QcFlag`]s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QcGate {
    rule: QcRule,
}

impl QcGate {
    pub fn new(rule: QcRule) -> Self { Self { rule } }

    pub fn rule(&self) -> QcRule { self.rule }

    pub fn validate(&self) -> Result<(), String> {
        match self.rule {
            QcRule::Fixed { threshold } if threshold.is_nan() => {
                Err("QC threshold must be a number".into())
            },
            QcRule::Quantile { q } if !(0.0..=1.0).contains(&q) => {
                Err(format!("QC quantile {q} is outside [0, 1]"))
            },
            QcRule::Tukey { k } if !(k >= 0.0) => {
                Err(format!("Tukey factor {k} must be non-negative"))
            },
            _ => Ok(()),
        }
    }

    /// Log-likelihood below which a fit is poor, `None` when the cohort has
    /// no finite log-likelihood to derive it from.
    pub fn threshold(
        &self,
        lls: &[f64],
    ) -> Option<f64> {
        match self.rule {
            QcRule::Fixed { threshold } => Some(threshold),
            QcRule::Quantile { q } => finite_quantile(lls, q),
            QcRule::Tukey { k } => {
                finite_quartiles(lls).map(|(q1, q3)| q1 - k * (q3 - q1))
            },
        }
    }

    pub fn classify(
        &self,
        ll: f64,
        threshold: Option<f64>,
    ) -> QcFlag {
        match threshold {
            _ if !ll.is_finite() => QcFlag::Unscored,
            Some(t) if ll < t => QcFlag::Poor,
            _ => QcFlag::Pass,
        }
    }

    /// Flags every log-likelihood against the cohort threshold. Never drops
    /// entries.
    pub fn flag_all(
        &self,
        lls: &[f64],
    ) -> Vec<QcFlag> {
        let threshold = self.threshold(lls);
        debug!("QC rule {:?} threshold {:?}", self.rule, threshold);
        lls.iter()
            .map(|ll| self.classify(*ll, threshold))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(QcRule::Fixed { threshold: -10.0 })]
    #[case(QcRule::Quantile { q: 0.25 })]
    #[case(QcRule::Tukey { k: 1.5 })]
    #[case(QcRule::Tukey { k: 0.0 })]
    fn lower_likelihood_never_ranks_better(#[case] rule: QcRule) {
        let lls = [-3.0, -12.0, -5.0, -50.0, f64::NAN, -4.0, -7.5, -6.0, -200.0];
        let gate = QcGate::new(rule);
        let flags = gate.flag_all(&lls);
        assert_eq!(flags.len(), lls.len());
        for (a, fa) in lls.iter().zip(flags.iter()) {
            for (b, fb) in lls.iter().zip(flags.iter()) {
                if a < b {
                    assert!(fa <= fb, "{a} -> {fa}, {b} -> {fb}");
                }
            }
        }
        assert_eq!(flags[4], QcFlag::Unscored);
    }

    #[test]
    fn tukey_flags_outliers() {
        let lls = [-10.0, -11.0, -9.5, -10.5, -10.2, -60.0];
        let flags = QcGate::new(QcRule::default()).flag_all(&lls);
        assert_eq!(flags[5], QcFlag::Poor);
        assert!(flags[..5]
            .iter()
            .all(|f| *f == QcFlag::Pass));
    }

    #[test]
    fn fixed_threshold() {
        let gate = QcGate::new(QcRule::Fixed { threshold: 0.0 });
        assert_eq!(gate.flag_all(&[-1.0, 1.0]), vec![QcFlag::Poor, QcFlag::Pass]);
    }

    #[test]
    fn no_finite_likelihoods_leaves_everyone_unscored() {
        let gate = QcGate::new(QcRule::Quantile { q: 0.1 });
        assert!(gate.threshold(&[f64::NAN]).is_none());
        assert_eq!(gate.flag_all(&[f64::NAN]), vec![QcFlag::Unscored]);
    }

    #[test]
    fn invalid_rules_are_rejected() {
        assert!(QcGate::new(QcRule::Quantile { q: 1.5 })
            .validate()
            .is_err());
        assert!(QcGate::new(QcRule::Tukey { k: -1.0 })
            .validate()
            .is_err());
        assert!(QcGate::new(QcRule::default())
            .validate()
            .is_ok());
    }
}
