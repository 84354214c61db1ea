use std::any::Any;
use std::fmt;
use std::panic::{
    catch_unwind,
    AssertUnwindSafe,
};
use std::sync::Arc;

use itertools::Itertools;
use log::{
    debug,
    warn,
};
use rayon::prelude::*;
use rayon::{
    ThreadPool,
    ThreadPoolBuilder,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::data_structs::{
    Chunk,
    Labeled,
};
use crate::error::{
    ChunkWorkerError,
    ClockError,
    ClockResult,
};

/// Parallel stages of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockStage {
    AgeCorrelation,
    SiteFit,
    BatchOffset,
    PersonFit,
}

impl ClockStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::AgeCorrelation => "age correlation",
            Self::SiteFit => "site fit",
            Self::BatchOffset => "batch offset",
            Self::PersonFit => "person fit",
        }
    }
}

impl fmt::Display for ClockStage {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Receives progress notifications from the executor. Called from worker
/// threads.
pub trait ChunkObserver: Send + Sync {
    fn on_stage_start(
        &self,
        stage: ClockStage,
        total_chunks: usize,
    ) {
        let _ = (stage, total_chunks);
    }

    fn on_chunk_done(
        &self,
        stage: ClockStage,
        chunk: usize,
    ) {
        let _ = (stage, chunk);
    }

    fn on_stage_finish(
        &self,
        stage: ClockStage,
    ) {
        let _ = stage;
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct NoopObserver;

impl ChunkObserver for NoopObserver {}

/// Outcome of one chunk: its items in order, or the worker failure.
pub type ChunkResult<T> = Result<Vec<(String, T)>, ChunkWorkerError>;

/// Dispatches a pure function over ordered chunks.
///
/// With more than one worker the chunks run on an owned rayon pool, with one
/// worker they run in the calling thread; the outputs are identical. Results
/// always come back in submission order.
pub struct ChunkExecutor {
    pool:     Option<ThreadPool>,
    observer: Arc<dyn ChunkObserver>,
}

impl fmt::Debug for ChunkExecutor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ChunkExecutor")
            .field("n_workers", &self.n_workers())
            .finish()
    }
}

impl ChunkExecutor {
    /// `0` workers uses every available core, `1` runs sequentially.
    pub fn new(n_workers: usize) -> ClockResult<Self> {
        let pool = if n_workers == 1 {
            None
        }
        else {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(n_workers)
                    .thread_name(|i| format!("epiclock-worker-{i}"))
                    .build()?,
            )
        };
        Ok(Self {
            pool,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn sequential() -> Self {
        Self {
            pool:     None,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(
        mut self,
        observer: Arc<dyn ChunkObserver>,
    ) -> Self {
        self.observer = observer;
        self
    }

    pub fn n_workers(&self) -> usize {
        self.pool
            .as_ref()
            .map(ThreadPool::current_num_threads)
            .unwrap_or(1)
    }

    pub fn is_sequential(&self) -> bool { self.pool.is_none() }

    /// Runs `f` on every chunk. A chunk whose function errors or panics
    /// yields a [`ChunkWorkerError`] in its slot; the other chunks are not
    /// affected.
    pub fn run<R, C, T, F>(
        &self,
        stage: ClockStage,
        chunks: &[Chunk<R, C>],
        f: F,
    ) -> Vec<ChunkResult<T>>
    where
        R: Labeled + Clone + Sync,
        C: Labeled + Clone + Sync,
        T: Send,
        F: Fn(&Chunk<R, C>) -> ClockResult<Vec<(String, T)>> + Sync, {
        self.observer
            .on_stage_start(stage, chunks.len());
        debug!(
            "Dispatching {} chunks of {stage} on {} worker(s)",
            chunks.len(),
            self.n_workers()
        );
        let job = |chunk: &Chunk<R, C>| {
            let result = self.run_chunk(stage, chunk, &f);
            self.observer
                .on_chunk_done(stage, chunk.index);
            result
        };
        let results = match &self.pool {
            Some(pool) => pool.install(|| chunks.par_iter().map(job).collect::<Vec<_>>()),
            None => chunks.iter().map(job).collect_vec(),
        };
        self.observer.on_stage_finish(stage);
        results
    }

    fn run_chunk<R, C, T, F>(
        &self,
        stage: ClockStage,
        chunk: &Chunk<R, C>,
        f: &F,
    ) -> ChunkResult<T>
    where
        R: Labeled + Clone,
        C: Labeled + Clone,
        F: Fn(&Chunk<R, C>) -> ClockResult<Vec<(String, T)>>, {
        let message = match catch_unwind(AssertUnwindSafe(|| f(chunk))) {
            Ok(Ok(items)) => return Ok(items),
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("worker panicked: {}", panic_message(payload.as_ref())),
        };
        let ids = chunk.item_ids();
        let err = ChunkWorkerError {
            stage: stage.to_string(),
            chunk: chunk.index,
            first_item: ids.first().cloned().unwrap_or_default(),
            last_item: ids.last().cloned().unwrap_or_default(),
            n_items: ids.len(),
            message,
        };
        warn!("{err}");
        Err(err)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    }
    else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    }
    else {
        "unknown panic payload".to_string()
    }
}

/// Concatenates chunk results positionally, checking that every chunk
/// returned exactly its own items in order. Items of failed chunks are
/// filled in with `on_failure`.
pub fn merge_chunks<R, C, T, F>(
    stage: ClockStage,
    chunks: &[Chunk<R, C>],
    results: Vec<ChunkResult<T>>,
    on_failure: F,
) -> ClockResult<(Vec<T>, Vec<ChunkWorkerError>)>
where
    R: Labeled + Clone,
    C: Labeled + Clone,
    F: Fn(&str, &ChunkWorkerError) -> T, {
    if results.len() != chunks.len() {
        return Err(ClockError::OrderingViolation {
            stage:    stage.to_string(),
            chunk:    results.len().min(chunks.len()),
            position: 0,
            expected: format!("{} chunks", chunks.len()),
            found:    format!("{} chunks", results.len()),
        });
    }
    let mut merged = Vec::with_capacity(chunks.iter().map(Chunk::len).sum());
    let mut errors = Vec::new();
    for (chunk, result) in chunks.iter().zip(results) {
        let expected_ids = chunk.item_ids();
        match result {
            Ok(items) => {
                if items.len() != expected_ids.len() {
                    return Err(ClockError::OrderingViolation {
                        stage:    stage.to_string(),
                        chunk:    chunk.index,
                        position: items.len().min(expected_ids.len()),
                        expected: format!("{} items", expected_ids.len()),
                        found:    format!("{} items", items.len()),
                    });
                }
                for (position, (expected, (found, value))) in
                    expected_ids.iter().zip(items).enumerate()
                {
                    if *expected != found {
                        return Err(ClockError::OrderingViolation {
                            stage: stage.to_string(),
                            chunk: chunk.index,
                            position,
                            expected: expected.clone(),
                            found,
                        });
                    }
                    merged.push(value);
                }
            },
            Err(err) => {
                merged.extend(
                    expected_ids
                        .iter()
                        .map(|id| on_failure(id.as_str(), &err)),
                );
                errors.push(err);
            },
        }
    }
    Ok((merged, errors))
}
