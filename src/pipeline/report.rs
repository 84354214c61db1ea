use log::{
    info,
    warn,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::executor::ClockStage;
use crate::data_structs::FitOutcome;
use crate::error::{
    ChunkWorkerError,
    OptimizationFailure,
};

/// Summary of one parallel stage: what was attempted, what failed and which
/// chunks broke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage:        ClockStage,
    pub n_items:      usize,
    pub n_fitted:     usize,
    pub failures:     Vec<OptimizationFailure>,
    pub chunk_errors: Vec<ChunkWorkerError>,
}

impl StageReport {
    pub fn from_outcomes<'a, T: 'a, I>(
        stage: ClockStage,
        outcomes: I,
        chunk_errors: Vec<ChunkWorkerError>,
    ) -> Self
    where
        I: IntoIterator<Item = &'a FitOutcome<T>>, {
        let mut n_items = 0;
        let mut failures = Vec::new();
        for outcome in outcomes {
            n_items += 1;
            if let Some(failure) = outcome.failure() {
                failures.push(failure.clone());
            }
        }
        Self {
            stage,
            n_items,
            n_fitted: n_items - failures.len(),
            failures,
            chunk_errors,
        }
    }

    pub fn n_failed(&self) -> usize { self.failures.len() }

    pub fn is_clean(&self) -> bool { self.failures.is_empty() && self.chunk_errors.is_empty() }

    pub(crate) fn log(&self) {
        info!(
            "{}: {} of {} items fitted",
            self.stage, self.n_fitted, self.n_items
        );
        if !self.failures.is_empty() {
            warn!(
                "{}: {} items failed (first: {})",
                self.stage,
                self.failures.len(),
                self.failures[0]
            );
        }
        for err in &self.chunk_errors {
            warn!("{err}");
        }
    }
}

/// Stage reports of a whole run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub stages:              Vec<StageReport>,
    /// Reference sites that were absent from the analysed matrix.
    pub missing_panel_sites: Vec<String>,
}

impl RunReport {
    pub(crate) fn push(
        &mut self,
        report: StageReport,
    ) {
        report.log();
        self.stages.push(report);
    }

    pub fn stage(
        &self,
        stage: ClockStage,
    ) -> Option<&StageReport> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
    }

    pub fn chunk_errors(&self) -> impl Iterator<Item = &ChunkWorkerError> + '_ {
        self.stages
            .iter()
            .flat_map(|r| r.chunk_errors.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &OptimizationFailure> + '_ {
        self.stages
            .iter()
            .flat_map(|r| r.failures.iter())
    }
}
