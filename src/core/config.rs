use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::error::DatasetError;
use super::split::{DEFAULT_SEED, DEFAULT_SPLIT_RATIO};
use super::video::{ColorMode, ImageShape};

static DEFAULT_VIDEO_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Videos")
        .join("353_recordings")
});

pub const DEFAULT_SAMPLE_PERCENT: f64 = 0.1;
const OUTPUT_DIR_NAME: &str = "images";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Tree scanned for videos with `<video>.json` sidecars.
    pub video_root: PathBuf,
    /// Corpus destination; `<video_root>/images` when unset.
    pub output_root: Option<PathBuf>,
    /// Train weight; test gets `1 - split_ratio`.
    pub split_ratio: f64,
    /// Fraction of each class to load.
    pub sample_percent: f64,
    pub seed: u64,
    pub workers: usize,
    pub image_shape: ImageShape,
    pub color_mode: ColorMode,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            video_root: DEFAULT_VIDEO_ROOT.clone(),
            output_root: None,
            split_ratio: DEFAULT_SPLIT_RATIO,
            sample_percent: DEFAULT_SAMPLE_PERCENT,
            seed: DEFAULT_SEED,
            workers: num_cpus::get(),
            image_shape: ImageShape::default(),
            color_mode: ColorMode::default(),
        }
    }
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| self.video_root.join(OUTPUT_DIR_NAME))
    }

    pub fn train_weight(&self) -> f64 {
        self.split_ratio
    }

    pub fn test_weight(&self) -> f64 {
        1.0 - self.split_ratio
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        if !(0.0..=1.0).contains(&self.split_ratio) {
            return Err(DatasetError::InvalidConfig(format!(
                "split_ratio must be in [0, 1], got {}",
                self.split_ratio
            )));
        }
        if !(self.sample_percent > 0.0 && self.sample_percent <= 1.0) {
            return Err(DatasetError::InvalidConfig(format!(
                "sample_percent must be in (0, 1], got {}",
                self.sample_percent
            )));
        }
        if self.workers == 0 {
            return Err(DatasetError::InvalidConfig("workers must be at least 1".into()));
        }
        let shape = self.image_shape;
        if shape.height == 0 || shape.width == 0 {
            return Err(DatasetError::InvalidConfig(format!(
                "image_shape must be non-empty, got {}x{}",
                shape.height, shape.width
            )));
        }
        Ok(())
    }
}
