//! Estimation stages of the clock.
//!
//! Each stage exposes a `fit_chunk` function that maps one chunk of a
//! [`LabeledMatrix`](crate::data_structs::LabeledMatrix) to per-item results
//! in chunk order, which is what the
//! [`ChunkExecutor`](crate::pipeline::ChunkExecutor) dispatches.

pub mod align;
pub mod curve;
pub mod likelihood;
pub mod optim;
pub mod person_fit;
pub mod qc;
pub mod selection;
pub mod site_fit;

pub use align::{
    BatchAligner,
    OffsetMap,
};
pub use curve::curve;
pub use optim::OptimizerSettings;
pub use person_fit::{
    PersonFitter,
    PersonObservations,
    PersonPriors,
};
pub use qc::{
    LikelihoodScorer,
    QcGate,
};
pub use site_fit::{
    SiteFitter,
    SitePriors,
};
