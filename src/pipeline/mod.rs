//! Stage orchestration.
//!
//! A [`ClockPipeline`] owns a validated [`ClockConfig`] and a
//! [`ChunkExecutor`]. Every stage chunks the cohort along one axis, runs the
//! per-chunk function on the executor, merges the results positionally
//! (checking ids and counts) and writes them back into the matrix once.
//!
//! - [`ClockPipeline::run`] trains a clock: site selection, site fit on the
//!   controls, person fit and QC on everyone.
//! - [`ClockPipeline::run_external`] applies a reference clock to another
//!   cohort: panel merge, batch offsets, person fit and QC.

mod config;
mod executor;
mod report;

use std::sync::Arc;

use itertools::Itertools;
use log::info;

pub use config::ClockConfig;
pub use executor::{
    merge_chunks,
    ChunkExecutor,
    ChunkObserver,
    ChunkResult,
    ClockStage,
    NoopObserver,
};
pub use report::{
    RunReport,
    StageReport,
};

use crate::data_structs::{
    make_chunks,
    CohortMatrix,
    FitOutcome,
    MatrixAxis,
    PersonFit,
    PersonParams,
    ReferencePanel,
    SiteSelection,
};
use crate::error::{
    ClockError,
    ClockResult,
    FailureReason,
};
use crate::tools::selection::{
    age_correlations,
    restrict_to_panel,
    top_by_age_correlation,
};
use crate::tools::{
    BatchAligner,
    LikelihoodScorer,
    OffsetMap,
    PersonFitter,
    QcGate,
    SiteFitter,
};

/// Annotated cohort and the reports of the run that produced it.
#[derive(Debug, Clone)]
pub struct ClockRun {
    pub cohort: CohortMatrix,
    pub report: RunReport,
}

fn worker_failure<T>(
    id: &str,
    err: &crate::error::ChunkWorkerError,
) -> FitOutcome<T> {
    FitOutcome::failed(id, FailureReason::Worker {
        chunk:   err.chunk,
        message: err.message.clone(),
    })
}

#[derive(Debug)]
pub struct ClockPipeline {
    config:   ClockConfig,
    executor: ChunkExecutor,
}

impl ClockPipeline {
    pub fn new(config: ClockConfig) -> ClockResult<Self> {
        config.validate()?;
        let executor = ChunkExecutor::new(config.n_workers)?;
        info!(
            "Clock pipeline: {} family, {} person optimizer, {} worker(s)",
            config.family,
            config.person_optimizer,
            executor.n_workers()
        );
        Ok(Self { config, executor })
    }

    pub fn with_observer(
        mut self,
        observer: Arc<dyn ChunkObserver>,
    ) -> Self {
        self.executor = self.executor.with_observer(observer);
        self
    }

    pub fn config(&self) -> &ClockConfig { &self.config }

    pub fn executor(&self) -> &ChunkExecutor { &self.executor }

    /// Trains a clock on `cohort`. `panel` is required when the site
    /// selection reuses a fixed panel.
    pub fn run(
        &self,
        mut cohort: CohortMatrix,
        panel: Option<&ReferencePanel>,
    ) -> ClockResult<ClockRun> {
        let mut report = RunReport::default();
        info!(
            "Training clock on {} sites x {} participants",
            cohort.n_rows(),
            cohort.n_cols()
        );

        cohort = match self.config.site_selection {
            SiteSelection::TopByAgeCorrelation { n } => {
                report.push(self.annotate_age_correlation(&mut cohort)?);
                let selected = top_by_age_correlation(&cohort, n);
                info!(
                    "Selected {} of {} sites by age correlation",
                    selected.len(),
                    cohort.n_rows()
                );
                if selected.is_empty() {
                    return Err(ClockError::EmptyPanel("site selection".into()));
                }
                let mut selected = cohort.select_rows(&selected);
                report.push(self.fit_sites(&mut selected)?);
                selected
            },
            SiteSelection::ReusePanel => {
                let panel = panel.ok_or_else(|| {
                    ClockError::InvalidConfig("panel reuse requires a reference panel".into())
                })?;
                panel.check_family(self.config.family)?;
                let (selected, missing) = restrict_to_panel(&cohort, panel);
                report.missing_panel_sites = missing;
                if selected.n_rows() == 0 {
                    return Err(ClockError::EmptyPanel("panel merge".into()));
                }
                selected
            },
        };

        ensure_fitted_sites(&cohort, "site fit")?;
        report.push(self.fit_persons(&mut cohort)?);
        Ok(ClockRun { cohort, report })
    }

    /// Applies the clock in `reference` to an external `cohort`, correcting
    /// per-site batch offsets first.
    pub fn run_external(
        &self,
        cohort: CohortMatrix,
        reference: &ReferencePanel,
    ) -> ClockResult<ClockRun> {
        reference.check_family(self.config.family)?;
        let mut report = RunReport::default();
        info!(
            "Applying a {}-site reference clock to {} participants",
            reference.len(),
            cohort.n_cols()
        );

        let (mut cohort, missing) = restrict_to_panel(&cohort, reference);
        report.missing_panel_sites = missing;
        if cohort.n_rows() == 0 {
            return Err(ClockError::EmptyPanel("panel merge".into()));
        }

        let (offsets, offset_report) = self.fit_offsets(&cohort)?;
        report.push(offset_report);
        offsets.apply(&mut cohort, self.config.alignment_target)?;

        ensure_fitted_sites(&cohort, "batch alignment")?;
        report.push(self.fit_persons(&mut cohort)?);
        Ok(ClockRun { cohort, report })
    }

    /// Stores the Pearson correlation with age on every site record.
    pub fn annotate_age_correlation(
        &self,
        cohort: &mut CohortMatrix,
    ) -> ClockResult<StageReport> {
        let stage = ClockStage::AgeCorrelation;
        let chunks = make_chunks(cohort, MatrixAxis::Rows, self.config.site_chunk_size)?;
        let results = self
            .executor
            .run(stage, &chunks, |chunk| Ok(age_correlations(&chunk.matrix)));
        let (correlations, chunk_errors) =
            merge_chunks(stage, &chunks, results, |_, _| f64::NAN)?;

        let outcomes = cohort
            .rows()
            .iter()
            .zip(correlations.iter())
            .map(|(site, r)| {
                if r.is_finite() {
                    FitOutcome::Fitted(*r)
                }
                else {
                    FitOutcome::failed(&site.id, FailureReason::NonFinite)
                }
            })
            .collect_vec();
        for (site, r) in cohort
            .rows_mut()
            .iter_mut()
            .zip(correlations)
        {
            site.age_correlation = r.is_finite().then_some(r);
        }
        Ok(StageReport::from_outcomes(stage, &outcomes, chunk_errors))
    }

    /// Fits the site parameters on the control participants and replaces
    /// every site's parameters.
    pub fn fit_sites(
        &self,
        cohort: &mut CohortMatrix,
    ) -> ClockResult<StageReport> {
        let stage = ClockStage::SiteFit;
        let controls = cohort.filter_cols(|p| p.control);
        if controls.n_cols() == 0 {
            return Err(ClockError::InvalidConfig(
                "no control participants to fit sites on".into(),
            ));
        }
        info!(
            "Fitting {} sites on {} control participants",
            controls.n_rows(),
            controls.n_cols()
        );
        let fitter = SiteFitter::new(
            self.config.family,
            self.config.site_priors,
            self.config.site_optimizer,
        );
        let chunks = make_chunks(&controls, MatrixAxis::Rows, self.config.site_chunk_size)?;
        let results = self
            .executor
            .run(stage, &chunks, |chunk| Ok(fitter.fit_chunk(&chunk.matrix)));
        let (outcomes, chunk_errors) = merge_chunks(stage, &chunks, results, worker_failure)?;

        let report = StageReport::from_outcomes(stage, &outcomes, chunk_errors);
        for (site, outcome) in cohort
            .rows_mut()
            .iter_mut()
            .zip(outcomes)
        {
            site.params = Some(outcome);
        }
        Ok(report)
    }

    /// Per-site batch offsets of `cohort` against the parameters attached
    /// to its sites.
    pub fn fit_offsets(
        &self,
        cohort: &CohortMatrix,
    ) -> ClockResult<(OffsetMap, StageReport)> {
        let stage = ClockStage::BatchOffset;
        let aligner = BatchAligner::new(self.config.max_offset, self.config.min_offset_obs);
        let chunks = make_chunks(cohort, MatrixAxis::Rows, self.config.site_chunk_size)?;
        let results = self
            .executor
            .run(stage, &chunks, |chunk| Ok(aligner.fit_chunk(&chunk.matrix)));
        let (outcomes, chunk_errors) = merge_chunks(stage, &chunks, results, worker_failure)?;

        let report = StageReport::from_outcomes(stage, &outcomes, chunk_errors);
        let offsets = OffsetMap::new(
            cohort
                .row_ids()
                .map(String::from)
                .zip(outcomes)
                .collect(),
        );
        Ok((offsets, report))
    }

    /// Fits, scores and flags every participant against the fitted sites,
    /// then writes all person records at once.
    pub fn fit_persons(
        &self,
        cohort: &mut CohortMatrix,
    ) -> ClockResult<StageReport> {
        let stage = ClockStage::PersonFit;
        let fitter = PersonFitter::new(
            self.config.person_optimizer,
            self.config.person_priors,
            self.config.person_settings,
        );
        let scorer = LikelihoodScorer;
        let persons = cohort.t();
        let chunks = make_chunks(&persons, MatrixAxis::Rows, self.config.person_chunk_size)?;
        let results = self.executor.run(stage, &chunks, |chunk| {
            let fitted = fitter.fit_chunk(&chunk.matrix);
            let outcomes = fitted
                .iter()
                .map(|(_, outcome)| outcome.clone())
                .collect_vec();
            let lls = scorer.score_chunk(&chunk.matrix, &outcomes);
            Ok(fitted
                .into_iter()
                .zip(lls)
                .map(|((id, outcome), ll)| (id, (outcome, ll)))
                .collect())
        });
        let (fits, chunk_errors): (Vec<(FitOutcome<PersonParams>, f64)>, _) =
            merge_chunks(stage, &chunks, results, |id, err| {
                (worker_failure(id, err), f64::NAN)
            })?;

        let lls = fits.iter().map(|(_, ll)| *ll).collect_vec();
        let flags = QcGate::new(self.config.qc_rule).flag_all(&lls);
        let report = StageReport::from_outcomes(
            stage,
            fits.iter().map(|(outcome, _)| outcome),
            chunk_errors,
        );

        for (participant, ((params, log_likelihood), qc)) in cohort
            .cols_mut()
            .iter_mut()
            .zip(fits.into_iter().zip(flags))
        {
            participant.fit = Some(PersonFit {
                params,
                log_likelihood,
                qc,
            });
        }
        Ok(report)
    }
}

fn ensure_fitted_sites(
    cohort: &CohortMatrix,
    after: &str,
) -> ClockResult<()> {
    let n_fitted = cohort
        .rows()
        .iter()
        .filter(|site| site.fitted_params().is_some())
        .count();
    if n_fitted == 0 {
        return Err(ClockError::EmptyPanel(after.to_string()));
    }
    info!("{n_fitted} of {} sites carry fitted parameters", cohort.n_rows());
    Ok(())
}
