use std::fmt::Display;
use std::str::FromStr;

use serde::{
    Deserialize,
    Serialize,
};

/// One of the two axes of a [`LabeledMatrix`](super::LabeledMatrix).
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum MatrixAxis {
    /// First axis (sites in the cohort orientation).
    Rows,
    /// Second axis (participants in the cohort orientation).
    Columns,
}

impl MatrixAxis {
    pub fn flipped(self) -> Self {
        match self {
            MatrixAxis::Rows => MatrixAxis::Columns,
            MatrixAxis::Columns => MatrixAxis::Rows,
        }
    }

    pub(crate) fn as_ndarray(self) -> ndarray::Axis {
        match self {
            MatrixAxis::Rows => ndarray::Axis(0),
            MatrixAxis::Columns => ndarray::Axis(1),
        }
    }
}

impl Display for MatrixAxis {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            MatrixAxis::Rows => write!(f, "row"),
            MatrixAxis::Columns => write!(f, "column"),
        }
    }
}

/// Noise model relating observed methylation to the expected curve.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "console", derive(clap::ValueEnum))]
pub enum LikelihoodFamily {
    /// Beta-distributed proportions, dispersion is the precision.
    #[default]
    Beta,
    /// Gaussian residuals, dispersion is the standard deviation.
    Normal,
}

impl Display for LikelihoodFamily {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            LikelihoodFamily::Beta => write!(f, "beta"),
            LikelihoodFamily::Normal => write!(f, "normal"),
        }
    }
}

impl FromStr for LikelihoodFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beta" => Ok(LikelihoodFamily::Beta),
            "normal" | "gaussian" => Ok(LikelihoodFamily::Normal),
            other => Err(format!("unknown likelihood family `{other}`")),
        }
    }
}

/// Optimizer used for the person-level fit.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "console", derive(clap::ValueEnum))]
pub enum PersonOptimizer {
    /// Projected L-BFGS with box constraints.
    #[default]
    Lbfgsb,
    /// Derivative-free simplex search.
    NelderMead,
}

impl Display for PersonOptimizer {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            PersonOptimizer::Lbfgsb => write!(f, "L-BFGS-B"),
            PersonOptimizer::NelderMead => write!(f, "Nelder-Mead"),
        }
    }
}

/// How the site panel of a run is chosen.
#[derive(PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteSelection {
    /// Rank sites by Pearson correlation with age and refit the top `n`.
    TopByAgeCorrelation { n: usize },
    /// Keep the sites of a supplied reference panel and reuse its parameters.
    ReusePanel,
}

impl Default for SiteSelection {
    fn default() -> Self {
        SiteSelection::TopByAgeCorrelation { n: 1_000 }
    }
}

/// Threshold rule turning a log-likelihood into a [`QcFlag`].
#[derive(PartialEq, Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QcRule {
    /// Log-likelihoods below `threshold` are poor fits.
    Fixed { threshold: f64 },
    /// Log-likelihoods below the cohort `q`-quantile are poor fits.
    Quantile { q: f64 },
    /// Log-likelihoods below `Q1 - k * IQR` of the cohort are poor fits.
    Tukey { k: f64 },
}

impl Default for QcRule {
    fn default() -> Self {
        QcRule::Tukey { k: 1.5 }
    }
}

/// Advisory classification of a person fit. Ordered from worst to best.
#[derive(
    Eq, Hash, PartialEq, Copy, Clone, Debug, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QcFlag {
    /// The person fit failed, no log-likelihood exists.
    Unscored,
    /// The fit explains the data poorly.
    Poor,
    /// The fit passed the threshold rule.
    Pass,
}

impl Display for QcFlag {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            QcFlag::Unscored => write!(f, "unscored"),
            QcFlag::Poor => write!(f, "poor"),
            QcFlag::Pass => write!(f, "pass"),
        }
    }
}

/// Where a batch offset is applied when aligning an external cohort.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "console", derive(clap::ValueEnum))]
pub enum AlignmentTarget {
    /// Shift the baseline of the reference curve.
    #[default]
    Model,
    /// Subtract the offset from the external cohort's raw values.
    Data,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qc_flags_are_ordered_worst_first() {
        assert!(QcFlag::Unscored < QcFlag::Poor);
        assert!(QcFlag::Poor < QcFlag::Pass);
    }

    #[test]
    fn family_parses_case_insensitively() {
        assert_eq!("Beta".parse::<LikelihoodFamily>(), Ok(LikelihoodFamily::Beta));
        assert_eq!(" normal ".parse::<LikelihoodFamily>(), Ok(LikelihoodFamily::Normal));
        assert!("poisson".parse::<LikelihoodFamily>().is_err());
    }

    #[test]
    fn axis_flip_is_an_involution() {
        assert_eq!(MatrixAxis::Rows.flipped().flipped(), MatrixAxis::Rows);
        assert_eq!(MatrixAxis::Columns.flipped(), MatrixAxis::Rows);
    }
}
