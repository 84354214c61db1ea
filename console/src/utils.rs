use std::path::Path;
use std::sync::Mutex;

use anyhow::{
    anyhow,
    Result,
};
use clap::Args;
use console::style;
use epiclock::exports::log::LevelFilter;
use epiclock::exports::pretty_env_logger;
use epiclock::pipeline::{
    ChunkObserver,
    ClockStage,
};
use indicatif::{
    ProgressBar,
    ProgressStyle,
};

#[derive(Args, Debug, Clone)]
pub(crate) struct UtilsArgs {
    #[arg(
        short,
        long,
        default_value_t = false,
        help_heading = "UTILS",
        help = "Print debug messages."
    )]
    pub(crate) verbose: bool,
    #[arg(
        short = 't',
        long,
        default_value_t = 0,
        help_heading = "UTILS",
        help = "Number of worker threads. 0 uses every core, 1 runs sequentially."
    )]
    pub(crate) threads: usize,
    #[arg(
        long,
        default_value_t = false,
        help_heading = "UTILS",
        help = "Display progress bars."
    )]
    pub(crate) progress: bool,
}

impl UtilsArgs {
    pub(crate) fn setup(&self) -> Result<()> {
        let level = if self.verbose {
            LevelFilter::Debug
        }
        else {
            LevelFilter::Info
        };
        pretty_env_logger::formatted_builder()
            .filter_level(level)
            .try_init()?;
        Ok(())
    }
}

pub(crate) fn init_pbar(total: usize) -> Result<ProgressBar> {
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}, ETA: {eta}] [{bar:40.cyan/blue}] {pos:>5.green}/{len:5} {msg}")?
            .progress_chars("#>-"),
    );
    progress_bar.set_message("Processing...");
    Ok(progress_bar)
}

/// Draws one progress bar per stage, advanced once per finished chunk.
#[derive(Default)]
pub(crate) struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    fn with_bar<F: FnOnce(&ProgressBar)>(
        &self,
        f: F,
    ) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar)
            }
        }
    }
}

impl ChunkObserver for ProgressObserver {
    fn on_stage_start(
        &self,
        stage: ClockStage,
        total_chunks: usize,
    ) {
        let bar = init_pbar(total_chunks).unwrap_or_else(|_| ProgressBar::new(total_chunks as u64));
        bar.set_message(stage.to_string());
        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_chunk_done(
        &self,
        _stage: ClockStage,
        _chunk: usize,
    ) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_stage_finish(
        &self,
        stage: ClockStage,
    ) {
        self.with_bar(|bar| bar.finish_with_message(format!("{stage} done")));
    }
}

pub(crate) fn validate_input(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!(
            "Path {} does not exist.",
            style(path.display()).red()
        ));
    }
    if !path.is_file() {
        return Err(anyhow!(
            "Path {} is not a file.",
            style(path.display()).red()
        ));
    }
    Ok(())
}

/// Output paths are `<prefix>.<suffix>`; the parent directory must exist.
pub(crate) fn output_path(
    prefix: &Path,
    suffix: &str,
) -> Result<std::path::PathBuf> {
    if let Some(parent) = prefix.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(anyhow!(
                "Output directory {} does not exist.",
                style(parent.display()).red()
            ));
        }
    }
    Ok(format!("{}.{suffix}", prefix.display()).into())
}
