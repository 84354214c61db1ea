//! # epiclock
//!
//! `epiclock` estimates person-level biological-age deviations from a
//! methylation matrix. Every CpG site follows a population kinetic curve of
//! age; every participant deviates from it by an **acceleration** (a log2
//! multiplier on age) and a **bias** (an additive shift). Both levels are
//! fitted by maximum-a-posteriori optimisation.
//!
//! ## Key Features
//!
//! * **Two-stage MAP inference**: site parameters are fitted on a control
//!   cohort, then every participant is fitted against the fixed sites. Beta
//!   (proportions) and normal likelihood families share one parameter
//!   schema.
//! * **Chunked parallel execution**: stages partition the matrix into
//!   ordered chunks and dispatch them on a Rayon pool with a sequential
//!   fallback. Results are merged in submission order and checked against
//!   the dispatched ids.
//! * **Isolated failures**: an item that does not converge yields an
//!   explicit [`FitOutcome::Failed`](data_structs::FitOutcome) record; a
//!   chunk that errors or panics is reported without stopping the batch.
//! * **Quality control**: every person fit is scored by its log-likelihood
//!   and flagged against a fixed, quantile or Tukey threshold.
//! * **Cross-cohort calibration**: per-site batch offsets align an external
//!   cohort to a reference clock before its participants are fitted.
//!
//! ## Structure
//!
//! * [`data_structs`]: the labeled matrix, chunks, axis records, parameter
//!   sets and configuration enums.
//! * [`tools`]: the kinetic curve, likelihoods, optimizer adapters and the
//!   per-chunk fitters.
//! * [`pipeline`]: configuration, the chunk executor and stage
//!   orchestration.
//! * [`io`]: CSV tables and the binary annotated artifact.
//! * [`utils`]: statistics helpers and builder macros.
//! * [`exports`]: re-exported dependencies.
//!
//! ## Usage
//!
//! ```no_run
//! use epiclock::prelude::*;
//!
//! # fn main() -> Result<(), ClockError> {
//! let cohort = load_cohort(
//!     read_values("values.csv")?,
//!     read_participants("participants.csv")?,
//!     None,
//! )?;
//! let config = ClockConfig::default()
//!     .with_family(LikelihoodFamily::Beta)
//!     .with_n_workers(4);
//! let run = ClockPipeline::new(config)?.run(cohort, None)?;
//! write_cohort(&run.cohort, "annotated.bin")?;
//! # Ok(())
//! # }
//! ```

pub mod data_structs;
pub mod error;
pub mod exports;
pub mod io;
pub mod pipeline;
pub mod prelude;
pub mod tools;
pub mod utils;
