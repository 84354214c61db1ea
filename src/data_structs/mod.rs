//! Core data structures of the `epiclock` crate.
//!
//! - [`LabeledMatrix`]: a values matrix with one metadata table per axis.
//!   In the cohort orientation rows are sites ([`Site`]) and columns are
//!   participants ([`Participant`]); [`LabeledMatrix::transpose`] flips the
//!   orientation so participant-wise code reads like site-wise code.
//! - [`Chunk`] and [`make_chunks`]: ordered, contiguous partitions of one
//!   axis, the unit of parallel dispatch.
//! - Parameter sets ([`SiteParams`], [`PersonParams`]) and the explicit
//!   per-item result [`FitOutcome`].
//! - [`ReferencePanel`]: the fitted site parameters of a clock, reusable on
//!   other cohorts.
//! - Configuration enums ([`LikelihoodFamily`], [`PersonOptimizer`],
//!   [`SiteSelection`], [`QcRule`], [`AlignmentTarget`]) and the advisory
//!   [`QcFlag`].

mod chunk;
mod enums;
mod matrix;
mod panel;
mod records;

pub use chunk::{
    make_chunks,
    reassemble,
    Chunk,
};
pub use enums::{
    AlignmentTarget,
    LikelihoodFamily,
    MatrixAxis,
    PersonOptimizer,
    QcFlag,
    QcRule,
    SiteSelection,
};
pub use matrix::{
    Labeled,
    LabeledMatrix,
};
pub use panel::ReferencePanel;
pub use records::{
    FitOutcome,
    Participant,
    PersonFit,
    PersonParams,
    Site,
    SiteParams,
};

/// Cohort orientation: sites on rows, participants on columns.
pub type CohortMatrix = LabeledMatrix<Site, Participant>;

/// Participant orientation used by the person stage.
pub type PersonMatrix = LabeledMatrix<Participant, Site>;
