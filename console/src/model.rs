use anyhow::Result;
use clap::{
    Args,
    ValueEnum,
};
use epiclock::prelude::*;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum CliQcRule {
    Fixed,
    Quantile,
    Tukey,
}

/// Model options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub(crate) struct ModelArgs {
    #[clap(short, long, value_enum, default_value_t = LikelihoodFamily::Beta, help_heading = "MODEL ARGS", help = "Likelihood family of the observations.")]
    pub(crate) family: LikelihoodFamily,
    #[clap(long, value_enum, default_value_t = PersonOptimizer::Lbfgsb, help_heading = "MODEL ARGS", help = "Optimizer of the person-level fit.")]
    pub(crate) optimizer: PersonOptimizer,
    #[arg(
        long,
        default_value_t = 15,
        help_heading = "MODEL ARGS",
        help = "Number of sites per parallel chunk."
    )]
    pub(crate) site_chunk: usize,
    #[arg(
        long,
        default_value_t = 10,
        help_heading = "MODEL ARGS",
        help = "Number of participants per parallel chunk."
    )]
    pub(crate) person_chunk: usize,
    #[arg(
        long,
        default_value_t = 2.0,
        help_heading = "MODEL ARGS",
        help = "Prior standard deviation of the log2 acceleration."
    )]
    pub(crate) acceleration_sd: f64,
    #[arg(
        long,
        default_value_t = 0.5,
        help_heading = "MODEL ARGS",
        help = "Prior standard deviation of the additive bias."
    )]
    pub(crate) bias_sd: f64,
    #[arg(
        long,
        default_value_t = 500,
        help_heading = "MODEL ARGS",
        help = "Iteration limit of the person-level optimizer."
    )]
    pub(crate) max_iters: u64,
    #[clap(long, value_enum, default_value_t = CliQcRule::Tukey, help_heading = "QC ARGS", help = "Rule deriving the poor-fit threshold.")]
    pub(crate) qc: CliQcRule,
    #[arg(
        long,
        default_value_t = 1.5,
        help_heading = "QC ARGS",
        help = "Fixed threshold, quantile level or Tukey fence multiplier."
    )]
    pub(crate) qc_value: f64,
}

impl ModelArgs {
    pub(crate) fn qc_rule(&self) -> QcRule {
        match self.qc {
            CliQcRule::Fixed => QcRule::Fixed {
                threshold: self.qc_value,
            },
            CliQcRule::Quantile => QcRule::Quantile { q: self.qc_value },
            CliQcRule::Tukey => QcRule::Tukey { k: self.qc_value },
        }
    }

    pub(crate) fn config(
        &self,
        threads: usize,
    ) -> Result<ClockConfig> {
        let priors = PersonPriors::default()
            .with_acceleration_sd(self.acceleration_sd)
            .with_bias_sd(self.bias_sd);
        let config = ClockConfig::default()
            .with_n_workers(threads)
            .with_family(self.family)
            .with_person_optimizer(self.optimizer)
            .with_site_chunk_size(self.site_chunk)
            .with_person_chunk_size(self.person_chunk)
            .with_person_priors(priors)
            .with_person_settings(OptimizerSettings::default().with_max_iters(self.max_iters))
            .with_qc_rule(self.qc_rule());
        config.validate()?;
        Ok(config)
    }
}
