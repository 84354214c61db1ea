use std::collections::HashMap;
use std::collections::HashSet;

use itertools::Itertools;
use ndarray::{
    Array2,
    ArrayView1,
    ArrayView2,
    Axis,
};
use serde::{
    Deserialize,
    Serialize,
};

use super::enums::MatrixAxis;
use crate::error::DataAlignmentError;

/// A metadata record bound to one row or column by its identifier.
pub trait Labeled {
    fn id(&self) -> &str;
}

/// Values matrix with one metadata table per axis.
///
/// Row `i` of `values` belongs to `rows[i]` and column `j` to `cols[j]`;
/// every operation keeps that binding. Identifiers are unique per axis.
/// [`LabeledMatrix::transpose`] swaps both the values and the metadata, so
/// code written against the row axis runs unchanged on the column axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMatrix<R, C> {
    values: Array2<f64>,
    rows:   Vec<R>,
    cols:   Vec<C>,
}

impl<R, C> LabeledMatrix<R, C>
where
    R: Labeled + Clone,
    C: Labeled + Clone,
{
    /// Builds a matrix from a values table and two metadata tables keyed by
    /// id. The metadata may come in any order; it is rearranged to follow
    /// `row_ids`/`col_ids`. Both id sets must match exactly.
    pub fn try_new(
        values: Array2<f64>,
        row_ids: &[String],
        col_ids: &[String],
        rows: Vec<R>,
        cols: Vec<C>,
    ) -> Result<Self, DataAlignmentError> {
        check_length(MatrixAxis::Rows, values.nrows(), row_ids.len())?;
        check_length(MatrixAxis::Columns, values.ncols(), col_ids.len())?;
        let rows = align_metadata(MatrixAxis::Rows, row_ids, rows)?;
        let cols = align_metadata(MatrixAxis::Columns, col_ids, cols)?;
        Ok(Self { values, rows, cols })
    }

    /// Builds a matrix whose metadata already follows the values order.
    pub fn from_parts(
        values: Array2<f64>,
        rows: Vec<R>,
        cols: Vec<C>,
    ) -> Result<Self, DataAlignmentError> {
        check_length(MatrixAxis::Rows, values.nrows(), rows.len())?;
        check_length(MatrixAxis::Columns, values.ncols(), cols.len())?;
        check_unique(MatrixAxis::Rows, rows.iter().map(Labeled::id))?;
        check_unique(MatrixAxis::Columns, cols.iter().map(Labeled::id))?;
        Ok(Self { values, rows, cols })
    }

    pub fn n_rows(&self) -> usize { self.rows.len() }

    pub fn n_cols(&self) -> usize { self.cols.len() }

    pub fn len_of(
        &self,
        axis: MatrixAxis,
    ) -> usize {
        match axis {
            MatrixAxis::Rows => self.n_rows(),
            MatrixAxis::Columns => self.n_cols(),
        }
    }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() || self.cols.is_empty() }

    pub fn values(&self) -> ArrayView2<'_, f64> { self.values.view() }

    pub fn values_mut(&mut self) -> &mut Array2<f64> { &mut self.values }

    pub fn rows(&self) -> &[R] { &self.rows }

    pub fn cols(&self) -> &[C] { &self.cols }

    /// Mutable row metadata. Ids must not be changed through this.
    pub fn rows_mut(&mut self) -> &mut [R] { &mut self.rows }

    /// Mutable column metadata. Ids must not be changed through this.
    pub fn cols_mut(&mut self) -> &mut [C] { &mut self.cols }

    pub fn row(
        &self,
        index: usize,
    ) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    pub fn col(
        &self,
        index: usize,
    ) -> ArrayView1<'_, f64> {
        self.values.column(index)
    }

    pub fn row_ids(&self) -> impl Iterator<Item = &str> + '_ { self.rows.iter().map(Labeled::id) }

    pub fn col_ids(&self) -> impl Iterator<Item = &str> + '_ { self.cols.iter().map(Labeled::id) }

    pub fn ids(
        &self,
        axis: MatrixAxis,
    ) -> Vec<String> {
        match axis {
            MatrixAxis::Rows => self.row_ids().map(String::from).collect(),
            MatrixAxis::Columns => self.col_ids().map(String::from).collect(),
        }
    }

    pub fn position_of_row(
        &self,
        id: &str,
    ) -> Option<usize> {
        self.rows.iter().position(|r| r.id() == id)
    }

    /// New matrix holding the given rows, in the given order.
    pub fn select_rows(
        &self,
        indices: &[usize],
    ) -> Self {
        Self {
            values: self.values.select(Axis(0), indices),
            rows:   indices
                .iter()
                .map(|&i| self.rows[i].clone())
                .collect(),
            cols:   self.cols.clone(),
        }
    }

    /// New matrix holding the given columns, in the given order.
    pub fn select_cols(
        &self,
        indices: &[usize],
    ) -> Self {
        Self {
            values: self.values.select(Axis(1), indices),
            rows:   self.rows.clone(),
            cols:   indices
                .iter()
                .map(|&j| self.cols[j].clone())
                .collect(),
        }
    }

    pub fn select(
        &self,
        axis: MatrixAxis,
        indices: &[usize],
    ) -> Self {
        match axis {
            MatrixAxis::Rows => self.select_rows(indices),
            MatrixAxis::Columns => self.select_cols(indices),
        }
    }

    /// Boolean selection along `axis`; `mask` must cover the whole axis.
    pub fn select_mask(
        &self,
        axis: MatrixAxis,
        mask: &[bool],
    ) -> Result<Self, DataAlignmentError> {
        check_length(axis, self.len_of(axis), mask.len())?;
        let indices = mask
            .iter()
            .positions(|keep| *keep)
            .collect_vec();
        Ok(self.select(axis, &indices))
    }

    pub fn filter_rows<F: Fn(&R) -> bool>(
        &self,
        predicate: F,
    ) -> Self {
        let indices = self
            .rows
            .iter()
            .positions(predicate)
            .collect_vec();
        self.select_rows(&indices)
    }

    pub fn filter_cols<F: Fn(&C) -> bool>(
        &self,
        predicate: F,
    ) -> Self {
        let indices = self
            .cols
            .iter()
            .positions(predicate)
            .collect_vec();
        self.select_cols(&indices)
    }

    /// Contiguous range `start..end` along `axis`.
    pub fn slice(
        &self,
        axis: MatrixAxis,
        start: usize,
        end: usize,
    ) -> Self {
        let indices = (start..end).collect_vec();
        self.select(axis, &indices)
    }

    /// Swaps the axes: rows become columns together with their metadata.
    pub fn transpose(self) -> LabeledMatrix<C, R> {
        LabeledMatrix {
            values: self.values.reversed_axes(),
            rows:   self.cols,
            cols:   self.rows,
        }
    }

    /// Transposed copy, leaving `self` untouched.
    pub fn t(&self) -> LabeledMatrix<C, R> {
        LabeledMatrix {
            values: self.values.t().to_owned(),
            rows:   self.cols.clone(),
            cols:   self.rows.clone(),
        }
    }

    /// Concatenates matrices along `axis`. All parts must share the other
    /// axis exactly (same ids in the same order).
    pub fn concat(
        axis: MatrixAxis,
        parts: &[Self],
    ) -> Result<Self, crate::error::ClockError> {
        let first = parts.first().ok_or_else(|| {
            crate::error::ClockError::InvalidConfig("cannot concatenate zero matrices".into())
        })?;
        let shared = axis.flipped();
        let shared_ids = first.ids(shared);
        for part in parts.iter().skip(1) {
            let ids = part.ids(shared);
            if ids != shared_ids {
                let found = ids
                    .iter()
                    .zip(shared_ids.iter())
                    .find(|(a, b)| a != b)
                    .map(|(a, _)| a.clone())
                    .unwrap_or_default();
                return Err(DataAlignmentError::IdMismatch {
                    axis: shared,
                    n_missing: ids.len().abs_diff(shared_ids.len()),
                    missing_example: found,
                    n_extra: 0,
                    extra_example: String::new(),
                }
                .into());
            }
        }
        let views = parts
            .iter()
            .map(|p| p.values.view())
            .collect_vec();
        let values = ndarray::concatenate(axis.as_ndarray(), &views)?;
        let (rows, cols) = match axis {
            MatrixAxis::Rows => (
                parts
                    .iter()
                    .flat_map(|p| p.rows.iter().cloned())
                    .collect_vec(),
                first.cols.clone(),
            ),
            MatrixAxis::Columns => (
                first.rows.clone(),
                parts
                    .iter()
                    .flat_map(|p| p.cols.iter().cloned())
                    .collect_vec(),
            ),
        };
        Ok(Self::from_parts(values, rows, cols)?)
    }
}

fn check_length(
    axis: MatrixAxis,
    values: usize,
    metadata: usize,
) -> Result<(), DataAlignmentError> {
    if values != metadata {
        return Err(DataAlignmentError::LengthMismatch {
            axis,
            values,
            metadata,
        });
    }
    Ok(())
}

fn check_unique<'a, I: Iterator<Item = &'a str>>(
    axis: MatrixAxis,
    ids: I,
) -> Result<(), DataAlignmentError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(DataAlignmentError::DuplicateId {
                axis,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Reorders `records` to follow `ids`, requiring exact set equality.
fn align_metadata<T: Labeled>(
    axis: MatrixAxis,
    ids: &[String],
    records: Vec<T>,
) -> Result<Vec<T>, DataAlignmentError> {
    check_unique(axis, ids.iter().map(String::as_str))?;
    check_unique(axis, records.iter().map(Labeled::id))?;

    let mut by_id: HashMap<String, T> = records
        .into_iter()
        .map(|r| (r.id().to_string(), r))
        .collect();

    let missing = ids
        .iter()
        .filter(|id| !by_id.contains_key(id.as_str()))
        .collect_vec();
    let id_set: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut extra = by_id
        .keys()
        .filter(|id| !id_set.contains(id.as_str()))
        .cloned()
        .collect_vec();
    extra.sort();

    if !missing.is_empty() || !extra.is_empty() {
        return Err(DataAlignmentError::IdMismatch {
            axis,
            n_missing: missing.len(),
            missing_example: missing
                .first()
                .map(|s| s.to_string())
                .unwrap_or_default(),
            n_extra: extra.len(),
            extra_example: extra
                .first()
                .cloned()
                .unwrap_or_default(),
        });
    }

    Ok(ids
        .iter()
        .filter_map(|id| by_id.remove(id.as_str()))
        .collect())
}
