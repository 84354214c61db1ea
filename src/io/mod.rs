//! Reading and writing of cohort tables, reference panels and annotated
//! artifacts.
//!
//! - [`tables`]: CSV loaders for the values matrix, participant and site
//!   metadata and reference panels.
//! - [`export`]: flat CSV exports of fitted participants and sites.
//! - [`artifact`]: the full annotated cohort as a bincode file.

pub mod artifact;
pub mod export;
pub mod tables;

pub use artifact::{
    read_cohort,
    write_cohort,
};
pub use export::{
    export_tables,
    write_panel,
    write_participants,
};
pub use tables::{
    load_cohort,
    read_panel,
    read_participants,
    read_site_metadata,
    read_values,
    ValuesTable,
};
