use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use plate_corpus::core::{BuildConfig, DatasetError, Problem, Split};

#[derive(Parser, Debug)]
#[command(
    name = "plate-corpus",
    version,
    about = "Build and sample licence-plate classification corpora from labelled video"
)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decompose labelled videos into per-problem image corpora.
    Build(BuildArgs),
    /// Sample one problem/split back into memory and report class counts.
    Load(LoadArgs),
}

/// Flags layered over the JSON config file (or the defaults).
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub video_root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub output_root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub split_ratio: Option<f64>,

    #[arg(long, global = true)]
    pub sample_percent: Option<f64>,

    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[arg(long, global = true)]
    pub workers: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// A single video (with `<video>.json`) or a directory to walk.
    /// Defaults to the configured video root.
    pub path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    #[arg(long)]
    pub problem: Problem,

    #[arg(long, default_value_t = Split::Train)]
    pub split: Split,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<BuildConfig, DatasetError> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::load(path)?,
            None => BuildConfig::default(),
        };
        if let Some(root) = &self.video_root {
            config.video_root = root.clone();
        }
        if let Some(root) = &self.output_root {
            config.output_root = Some(root.clone());
        }
        if let Some(ratio) = self.split_ratio {
            config.split_ratio = ratio;
        }
        if let Some(percent) = self.sample_percent {
            config.sample_percent = percent;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate()?;
        Ok(config)
    }
}
