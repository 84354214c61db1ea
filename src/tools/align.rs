//! Batch offsets mapping an external cohort onto a reference clock.

use itertools::Itertools;
use log::debug;
use ndarray::{
    ArrayView1,
    Axis,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::likelihood::total_ln_density;
use super::optim::minimize_scalar;
use crate::data_structs::{
    AlignmentTarget,
    CohortMatrix,
    FitOutcome,
    Labeled,
    LikelihoodFamily,
    SiteParams,
};
use crate::error::{
    ClockError,
    ClockResult,
    FailureReason,
};

/// Per-site additive correction, positional over the site axis it was
/// computed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetMap {
    site_ids: Vec<String>,
    offsets:  Vec<FitOutcome<f64>>,
}

impl OffsetMap {
    pub fn new(entries: Vec<(String, FitOutcome<f64>)>) -> Self {
        let (site_ids, offsets) = entries.into_iter().unzip();
        Self { site_ids, offsets }
    }

    /// All-zero offsets for the sites of `matrix`.
    pub fn zeros(matrix: &CohortMatrix) -> Self {
        Self::new(
            matrix
                .row_ids()
                .map(|id| (id.to_string(), FitOutcome::Fitted(0.0)))
                .collect(),
        )
    }

    pub fn len(&self) -> usize { self.offsets.len() }

    pub fn is_empty(&self) -> bool { self.offsets.is_empty() }

    pub fn site_ids(&self) -> &[String] { &self.site_ids }

    pub fn offsets(&self) -> &[FitOutcome<f64>] { &self.offsets }

    pub fn get(
        &self,
        site_id: &str,
    ) -> Option<&FitOutcome<f64>> {
        self.site_ids
            .iter()
            .position(|id| id == site_id)
            .map(|i| &self.offsets[i])
    }

    fn check_order(
        &self,
        matrix: &CohortMatrix,
    ) -> ClockResult<()> {
        if let Some((position, (expected, found))) = self
            .site_ids
            .iter()
            .map(String::as_str)
            .zip_longest(matrix.row_ids())
            .map(|pair| {
                match pair {
                    itertools::EitherOrBoth::Both(a, b) => (a, b),
                    itertools::EitherOrBoth::Left(a) => (a, ""),
                    itertools::EitherOrBoth::Right(b) => ("", b),
                }
            })
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(ClockError::OrderingViolation {
                stage: "offset application".into(),
                chunk: 0,
                position,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Applies the offsets to `matrix` according to `target`. Sites whose
    /// offset could not be estimated lose their parameters.
    pub fn apply(
        &self,
        matrix: &mut CohortMatrix,
        target: AlignmentTarget,
    ) -> ClockResult<()> {
        self.check_order(matrix)?;
        if target == AlignmentTarget::Data {
            for (mut row, offset) in matrix
                .values_mut()
                .axis_iter_mut(Axis(0))
                .zip(self.offsets.iter())
            {
                if let FitOutcome::Fitted(delta) = offset {
                    row.mapv_inplace(|v| v - delta);
                }
            }
        }
        for (site, offset) in matrix
            .rows_mut()
            .iter_mut()
            .zip(self.offsets.iter())
        {
            match offset {
                FitOutcome::Fitted(delta) => {
                    site.offset = Some(*delta);
                    if target == AlignmentTarget::Model {
                        site.params = site
                            .params
                            .take()
                            .map(|params| params.map(|p| p.shifted(*delta)));
                    }
                },
                FitOutcome::Failed(failure) => {
                    site.offset = None;
                    site.params = Some(FitOutcome::Failed(failure.clone()));
                },
            }
        }
        Ok(())
    }
}

/// MAP offset between an external cohort's values and a reference curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchAligner {
    max_offset:       f64,
    min_observations: usize,
}

impl BatchAligner {
    pub fn new(
        max_offset: f64,
        min_observations: usize,
    ) -> Self {
        Self {
            max_offset,
            min_observations,
        }
    }

    /// Offsets for every site (row) of `chunk`, against all of its
    /// participants. Sites without reference parameters fail.
    pub fn fit_chunk(
        &self,
        chunk: &CohortMatrix,
    ) -> Vec<(String, FitOutcome<f64>)> {
        let ages = chunk
            .cols()
            .iter()
            .map(|p| p.age)
            .collect_vec();
        chunk
            .rows()
            .iter()
            .enumerate()
            .map(|(i, site)| {
                let outcome = match site.fitted_params() {
                    Some(params) => self.fit_site(site.id(), params, &ages, chunk.row(i)),
                    None => FitOutcome::failed(site.id(), FailureReason::NoFittedSites),
                };
                (site.id.clone(), outcome)
            })
            .collect()
    }

    pub fn fit_site(
        &self,
        id: &str,
        params: &SiteParams,
        ages: &[f64],
        values: ArrayView1<'_, f64>,
    ) -> FitOutcome<f64> {
        match self.try_fit(params, ages, values) {
            Ok(offset) => FitOutcome::Fitted(offset),
            Err(reason) => {
                debug!("Offset for site {id} not estimated: {reason}");
                FitOutcome::failed(id, reason)
            },
        }
    }

    fn try_fit(
        &self,
        params: &SiteParams,
        ages: &[f64],
        values: ArrayView1<'_, f64>,
    ) -> Result<f64, FailureReason> {
        let pairs = ages
            .iter()
            .zip(values.iter())
            .filter(|(t, y)| t.is_finite() && y.is_finite())
            .map(|(t, y)| (params.curve(*t), *y))
            .collect_vec();
        let required = self.min_observations.max(1);
        if pairs.len() < required {
            return Err(FailureReason::TooFewObservations {
                found: pairs.len(),
                required,
            });
        }
        let offset = match params.family {
            LikelihoodFamily::Normal => {
                pairs
                    .iter()
                    .map(|(mu, y)| y - mu)
                    .sum::<f64>()
                    / pairs.len() as f64
            },
            LikelihoodFamily::Beta => {
                let (offset, _) = minimize_scalar(
                    |delta| {
                        -total_ln_density(
                            params.family,
                            params.dispersion,
                            pairs.iter().map(|(mu, y)| (mu + delta, *y)),
                        )
                    },
                    -self.max_offset,
                    self.max_offset,
                    200,
                )?;
                offset
            },
        };
        if offset.is_finite() {
            Ok(offset)
        }
        else {
            Err(FailureReason::NonFinite)
        }
    }
}
