//! Re-exports of the crates that appear in the public API or that
//! front-ends need to drive the library.

pub use {
    anyhow,
    argmin,
    itertools,
    log,
    ndarray,
    pretty_env_logger,
    rayon,
    serde,
    statrs,
};
