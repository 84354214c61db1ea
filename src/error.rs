//! Error taxonomy of the inference engine.
//!
//! Only [`DataAlignmentError`] and the configuration/IO variants of
//! [`ClockError`] are fatal. [`OptimizationFailure`] and [`ChunkWorkerError`]
//! are isolated to the item or chunk that produced them and are reported
//! through [`StageReport`](crate::pipeline::StageReport).

use std::fmt::Display;

use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

use crate::data_structs::MatrixAxis;

pub type ClockResult<T> = Result<T, ClockError>;

/// Raised when matrix identifiers and metadata identifiers disagree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataAlignmentError {
    #[error(
        "{axis} ids do not match metadata: {n_missing} matrix ids have no \
         metadata (e.g. `{missing_example}`), {n_extra} metadata rows have no \
         matrix entry (e.g. `{extra_example}`)"
    )]
    IdMismatch {
        axis:            MatrixAxis,
        n_missing:       usize,
        missing_example: String,
        n_extra:         usize,
        extra_example:   String,
    },

    #[error("duplicate {axis} id `{id}`")]
    DuplicateId { axis: MatrixAxis, id: String },

    #[error("{axis} length mismatch: values have {values} entries, metadata has {metadata}")]
    LengthMismatch {
        axis:     MatrixAxis,
        values:   usize,
        metadata: usize,
    },
}

/// Why a single site, person or offset could not be estimated.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    #[error("only {found} finite observations, at least {required} required")]
    TooFewObservations { found: usize, required: usize },

    #[error("ages carry no variance")]
    DegenerateAges,

    #[error("no fitted site parameters available")]
    NoFittedSites,

    #[error("optimizer did not converge: {status}")]
    DidNotConverge { status: String },

    #[error("solver error: {0}")]
    Solver(String),

    #[error("non-finite estimate")]
    NonFinite,

    #[error("worker for chunk {chunk} failed: {message}")]
    Worker { chunk: usize, message: String },
}

/// A failed per-item optimisation. Never aborts the enclosing chunk.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("`{item}` was not fitted: {reason}")]
pub struct OptimizationFailure {
    pub item:   String,
    pub reason: FailureReason,
}

impl OptimizationFailure {
    pub fn new<S: Into<String>>(
        item: S,
        reason: FailureReason,
    ) -> Self {
        Self {
            item: item.into(),
            reason,
        }
    }
}

/// An uncaught failure inside a worker while processing one chunk.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{stage} chunk {chunk} (items `{first_item}`..`{last_item}`, {n_items} total) failed: {message}")]
pub struct ChunkWorkerError {
    pub stage:      String,
    pub chunk:      usize,
    pub first_item: String,
    pub last_item:  String,
    pub n_items:    usize,
    pub message:    String,
}

#[derive(Error, Debug)]
pub enum ClockError {
    #[error(transparent)]
    DataAlignment(#[from] DataAlignmentError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "ordering invariant violated in {stage} at chunk {chunk}, position \
         {position}: expected `{expected}`, found `{found}`"
    )]
    OrderingViolation {
        stage:    String,
        chunk:    usize,
        position: usize,
        expected: String,
        found:    String,
    },

    #[error("reference panel was fitted with the {found} family, configuration requests {expected}")]
    FamilyMismatch { expected: String, found: String },

    #[error("no sites left to fit after {0}")]
    EmptyPanel(String),

    #[error("malformed input {path}: {message}")]
    MalformedInput { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl ClockError {
    pub(crate) fn malformed<P: Display, M: Display>(
        path: P,
        message: M,
    ) -> Self {
        ClockError::MalformedInput {
            path:    path.to_string(),
            message: message.to_string(),
        }
    }
}
