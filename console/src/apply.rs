use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use epiclock::prelude::*;
use log::info;

use crate::fit::{
    print_summary,
    write_outputs,
    InputArgs,
};
use crate::model::ModelArgs;
use crate::utils::{
    validate_input,
    ProgressObserver,
    UtilsArgs,
};

#[derive(Args, Debug, Clone)]
pub(crate) struct ApplyArgs {
    #[clap(flatten)]
    input: InputArgs,
    #[arg(
        short = 'r',
        long,
        required = true,
        help = "Reference clock: a panel CSV or an annotated .bin artifact."
    )]
    reference: PathBuf,
    #[arg(
        short = 'o',
        long,
        required = true,
        help = "Output prefix. Writes <prefix>.participants.csv, <prefix>.panel.csv, <prefix>.bin and <prefix>.report.json."
    )]
    output: PathBuf,
    #[clap(long, value_enum, default_value_t = AlignmentTarget::Model, help_heading = "ALIGNMENT ARGS", help = "Shift the reference curves or the external values.")]
    target: AlignmentTarget,
    #[arg(
        long,
        default_value_t = 0.5,
        help_heading = "ALIGNMENT ARGS",
        help = "Bound of the beta-family offset search."
    )]
    max_offset: f64,
    #[arg(
        long,
        default_value_t = 1,
        help_heading = "ALIGNMENT ARGS",
        help = "Minimum finite observations to estimate a site offset."
    )]
    min_offset_obs: usize,
    #[clap(flatten)]
    model: ModelArgs,
}

impl ApplyArgs {
    fn reference(&self) -> Result<ReferencePanel> {
        validate_input(&self.reference)?;
        let is_artifact = self
            .reference
            .extension()
            .is_some_and(|ext| ext == "bin");
        let panel = if is_artifact {
            ReferencePanel::from_cohort(&read_cohort(&self.reference)?)?
        }
        else {
            read_panel(&self.reference)?
        };
        info!(
            "Reference clock {} holds {} sites",
            self.reference.display(),
            panel.len()
        );
        Ok(panel)
    }

    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> Result<()> {
        let reference = self.reference()?;
        let config = self
            .model
            .config(utils.threads)?
            .with_alignment_target(self.target)
            .with_max_offset(self.max_offset)
            .with_min_offset_obs(self.min_offset_obs);
        config.validate()?;

        let cohort = self.input.load()?;
        let mut pipeline = ClockPipeline::new(config)?;
        if utils.progress {
            pipeline = pipeline.with_observer(Arc::new(ProgressObserver::default()));
        }
        let run = pipeline.run_external(cohort, &reference)?;

        write_outputs(&self.output, &run)?;
        print_summary(&run);
        Ok(())
    }
}
