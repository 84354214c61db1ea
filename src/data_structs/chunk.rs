use itertools::Itertools;

use super::enums::MatrixAxis;
use super::matrix::{
    Labeled,
    LabeledMatrix,
};
use crate::error::{
    ClockError,
    ClockResult,
};

/// A contiguous slice of a [`LabeledMatrix`] along one axis.
///
/// `index` is the position of the chunk in its sequence and `offset` the
/// position of its first item on the parent axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<R, C> {
    pub index:  usize,
    pub offset: usize,
    pub axis:   MatrixAxis,
    pub matrix: LabeledMatrix<R, C>,
}

impl<R, C> Chunk<R, C>
where
    R: Labeled + Clone,
    C: Labeled + Clone,
{
    pub fn len(&self) -> usize { self.matrix.len_of(self.axis) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Ids of the items this chunk carries along its axis.
    pub fn item_ids(&self) -> Vec<String> { self.matrix.ids(self.axis) }
}

/// Partitions `matrix` along `axis` into consecutive chunks of `size` items;
/// the last chunk may be shorter.
///
/// Column chunks are produced by transposing, chunking rows and transposing
/// each chunk back, so both axes go through the same code path.
pub fn make_chunks<R, C>(
    matrix: &LabeledMatrix<R, C>,
    axis: MatrixAxis,
    size: usize,
) -> ClockResult<Vec<Chunk<R, C>>>
where
    R: Labeled + Clone,
    C: Labeled + Clone, {
    if size == 0 {
        return Err(ClockError::InvalidConfig(
            "chunk size must be positive".into(),
        ));
    }
    match axis {
        MatrixAxis::Rows => Ok(chunk_rows(matrix, size)),
        MatrixAxis::Columns => {
            let transposed = matrix.t();
            Ok(chunk_rows(&transposed, size)
                .into_iter()
                .map(|chunk| {
                    Chunk {
                        index:  chunk.index,
                        offset: chunk.offset,
                        axis:   MatrixAxis::Columns,
                        matrix: chunk.matrix.transpose(),
                    }
                })
                .collect_vec())
        },
    }
}

fn chunk_rows<R, C>(
    matrix: &LabeledMatrix<R, C>,
    size: usize,
) -> Vec<Chunk<R, C>>
where
    R: Labeled + Clone,
    C: Labeled + Clone, {
    let n = matrix.n_rows();
    (0..n)
        .step_by(size)
        .enumerate()
        .map(|(index, start)| {
            let end = (start + size).min(n);
            Chunk {
                index,
                offset: start,
                axis: MatrixAxis::Rows,
                matrix: matrix.slice(MatrixAxis::Rows, start, end),
            }
        })
        .collect_vec()
}

/// Reassembles the parent matrix from its chunks, in order.
pub fn reassemble<R, C>(chunks: &[Chunk<R, C>]) -> ClockResult<LabeledMatrix<R, C>>
where
    R: Labeled + Clone,
    C: Labeled + Clone, {
    let axis = chunks
        .first()
        .map(|c| c.axis)
        .ok_or_else(|| ClockError::InvalidConfig("no chunks to reassemble".into()))?;
    let parts = chunks
        .iter()
        .map(|c| c.matrix.clone())
        .collect_vec();
    LabeledMatrix::concat(axis, &parts)
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rstest::rstest;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag(String);

    impl Labeled for Tag {
        fn id(&self) -> &str { &self.0 }
    }

    fn matrix(
        n_rows: usize,
        n_cols: usize,
    ) -> LabeledMatrix<Tag, Tag> {
        let values = Array2::from_shape_fn((n_rows, n_cols), |(i, j)| (i * 100 + j) as f64);
        LabeledMatrix::from_parts(
            values,
            (0..n_rows)
                .map(|i| Tag(format!("r{i}")))
                .collect(),
            (0..n_cols)
                .map(|j| Tag(format!("c{j}")))
                .collect(),
        )
        .unwrap()
    }

    #[rstest]
    #[case(MatrixAxis::Rows, 1)]
    #[case(MatrixAxis::Rows, 4)]
    #[case(MatrixAxis::Rows, 23)]
    #[case(MatrixAxis::Rows, 50)]
    #[case(MatrixAxis::Columns, 3)]
    #[case(MatrixAxis::Columns, 10)]
    #[case(MatrixAxis::Columns, 11)]
    fn chunks_reconstruct_the_axis(
        #[case] axis: MatrixAxis,
        #[case] size: usize,
    ) {
        let m = matrix(23, 11);
        let chunks = make_chunks(&m, axis, size).unwrap();
        let n = m.len_of(axis);

        assert_eq!(chunks.len(), n.div_ceil(size));
        assert!(chunks
            .iter()
            .enumerate()
            .all(|(i, c)| c.index == i));
        assert!(chunks
            .iter()
            .rev()
            .skip(1)
            .all(|c| c.len() == size));
        assert_eq!(chunks.iter().map(Chunk::len).sum::<usize>(), n);
        assert_eq!(
            chunks
                .iter()
                .flat_map(Chunk::item_ids)
                .collect_vec(),
            m.ids(axis)
        );
        assert_eq!(reassemble(&chunks).unwrap(), m);
    }

    #[test]
    fn column_chunks_keep_row_axis_whole() {
        let m = matrix(3, 7);
        let chunks = make_chunks(&m, MatrixAxis::Columns, 3).unwrap();
        assert_eq!(chunks[2].offset, 6);
        assert_eq!(chunks[2].matrix.n_rows(), 3);
        assert_eq!(chunks[2].matrix.values()[[1, 0]], 106.0);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(make_chunks(&matrix(2, 2), MatrixAxis::Rows, 0).is_err());
    }
}
