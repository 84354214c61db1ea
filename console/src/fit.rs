use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use console::style;
use epiclock::prelude::*;
use itertools::Itertools;
use log::info;

use crate::model::ModelArgs;
use crate::utils::{
    output_path,
    validate_input,
    ProgressObserver,
    UtilsArgs,
};

/// Input tables shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub(crate) struct InputArgs {
    #[arg(required = true, help = "Values CSV: sites as rows, participants as columns.")]
    pub(crate) values: PathBuf,
    #[arg(
        short = 'm',
        long,
        required = true,
        help = "Participant metadata CSV with `age` and an optional `control` column."
    )]
    pub(crate) participants: PathBuf,
    #[arg(long, help = "Site metadata CSV with a `control` column marking control probes.")]
    pub(crate) sites: Option<PathBuf>,
}

impl InputArgs {
    pub(crate) fn load(&self) -> Result<CohortMatrix> {
        validate_input(&self.values)?;
        validate_input(&self.participants)?;
        let sites = match &self.sites {
            Some(path) => {
                validate_input(path)?;
                Some(read_site_metadata(path)?)
            },
            None => None,
        };
        Ok(load_cohort(
            read_values(&self.values)?,
            read_participants(&self.participants)?,
            sites,
        )?)
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct FitArgs {
    #[clap(flatten)]
    input: InputArgs,
    #[arg(
        short = 'o',
        long,
        required = true,
        help = "Output prefix. Writes <prefix>.participants.csv, <prefix>.panel.csv, <prefix>.bin and <prefix>.report.json."
    )]
    output: PathBuf,
    #[arg(
        short = 'n',
        long,
        default_value_t = 1000,
        help = "Number of sites kept by age correlation."
    )]
    top_n: usize,
    #[arg(
        long,
        conflicts_with = "top_n",
        help = "Reuse the sites and parameters of this panel CSV instead of selecting and fitting sites."
    )]
    panel: Option<PathBuf>,
    #[clap(flatten)]
    model: ModelArgs,
}

impl FitArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> Result<()> {
        let panel = match &self.panel {
            Some(path) => {
                validate_input(path)?;
                Some(read_panel(path)?)
            },
            None => None,
        };
        let selection = if panel.is_some() {
            SiteSelection::ReusePanel
        }
        else {
            SiteSelection::TopByAgeCorrelation { n: self.top_n }
        };
        let config = self
            .model
            .config(utils.threads)?
            .with_site_selection(selection);

        let cohort = self.input.load()?;
        let mut pipeline = ClockPipeline::new(config)?;
        if utils.progress {
            pipeline = pipeline.with_observer(Arc::new(ProgressObserver::default()));
        }
        let run = pipeline.run(cohort, panel.as_ref())?;

        write_outputs(&self.output, &run)?;
        print_summary(&run);
        Ok(())
    }
}

pub(crate) fn write_outputs(
    prefix: &std::path::Path,
    run: &ClockRun,
) -> Result<()> {
    export_tables(
        &run.cohort,
        output_path(prefix, "participants.csv")?,
        output_path(prefix, "panel.csv")?,
    )?;
    write_cohort(&run.cohort, output_path(prefix, "bin")?)?;
    let report_path = output_path(prefix, "report.json")?;
    serde_json::to_writer_pretty(File::create(&report_path)?, &run.report)?;
    info!("Run report written to {}", report_path.display());
    Ok(())
}

pub(crate) fn print_summary(run: &ClockRun) {
    let counts = run
        .cohort
        .cols()
        .iter()
        .map(|p| {
            p.fit
                .as_ref()
                .map(|fit| fit.qc)
                .unwrap_or(QcFlag::Unscored)
        })
        .counts();
    println!(
        "[{}] {} participants: {} pass, {} poor, {} unscored",
        style("V").green(),
        run.cohort.n_cols(),
        style(counts.get(&QcFlag::Pass).copied().unwrap_or(0)).green(),
        style(counts.get(&QcFlag::Poor).copied().unwrap_or(0)).yellow(),
        style(counts.get(&QcFlag::Unscored).copied().unwrap_or(0)).red(),
    );
    let n_chunk_errors = run.report.chunk_errors().count();
    if n_chunk_errors > 0 {
        eprintln!(
            "{} chunk(s) failed, see the run report",
            style(n_chunk_errors).red()
        );
    }
}
