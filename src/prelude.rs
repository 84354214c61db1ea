pub use crate::data_structs::{
    make_chunks,
    AlignmentTarget,
    Chunk,
    CohortMatrix,
    FitOutcome,
    Labeled,
    LabeledMatrix,
    LikelihoodFamily,
    MatrixAxis,
    Participant,
    PersonFit,
    PersonMatrix,
    PersonOptimizer,
    PersonParams,
    QcFlag,
    QcRule,
    ReferencePanel,
    Site,
    SiteParams,
    SiteSelection,
};
pub use crate::error::{
    ChunkWorkerError,
    ClockError,
    ClockResult,
    DataAlignmentError,
    FailureReason,
    OptimizationFailure,
};
pub use crate::io::{
    export_tables,
    load_cohort,
    read_cohort,
    read_panel,
    read_participants,
    read_site_metadata,
    read_values,
    write_cohort,
    write_panel,
    write_participants,
};
pub use crate::pipeline::{
    ChunkExecutor,
    ChunkObserver,
    ClockConfig,
    ClockPipeline,
    ClockRun,
    ClockStage,
    NoopObserver,
    RunReport,
    StageReport,
};
pub use crate::tools::{
    BatchAligner,
    LikelihoodScorer,
    OffsetMap,
    OptimizerSettings,
    PersonFitter,
    PersonPriors,
    QcGate,
    SiteFitter,
    SitePriors,
};
