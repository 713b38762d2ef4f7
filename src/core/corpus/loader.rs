//! 语料加载：按类别分层抽样，解码为固定尺寸帧 + one-hot 标签

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use walkdir::WalkDir;

use super::writer::PARTIAL_SUFFIX;
use crate::core::error::DatasetError;
use crate::core::onehot;
use crate::core::split::DEFAULT_SEED;
use crate::core::video::{ColorMode, Frame, ImageShape};

/// 样本与标签平行数组：`samples[i]` 的标签是 `labels[i]`
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub shape: ImageShape,
    pub classes: Vec<String>,
    pub samples: Vec<Frame>,
    pub labels: Vec<Vec<f32>>,
    pub sources: Vec<PathBuf>,
}

impl LoadedDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 解码全部标签，损坏的标签返回 `AmbiguousLabel`
    pub fn verify_labels(&self) -> Result<(), DatasetError> {
        for label in &self.labels {
            onehot::decode(label)?;
        }
        Ok(())
    }

    pub fn class_counts(&self) -> Result<Vec<usize>, DatasetError> {
        let mut counts = vec![0; self.classes.len()];
        for label in &self.labels {
            let index = onehot::decode(label)?;
            if let Some(count) = counts.get_mut(index) {
                *count += 1;
            }
        }
        Ok(counts)
    }
}

pub struct CorpusLoader {
    shape: ImageShape,
    mode: ColorMode,
    rng: StdRng,
}

impl CorpusLoader {
    pub fn new(shape: ImageShape) -> Self {
        Self {
            shape,
            mode: ColorMode::Rgb,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn expected_shape(&self) -> ImageShape {
        self.shape.with_color_mode(self.mode)
    }

    /// 输出顺序与 `classes` 一致，不跨类别打乱
    pub fn load<S: AsRef<str>>(
        &mut self,
        root: &Path,
        classes: &[S],
        sample_percent: f64,
    ) -> Result<LoadedDataset, DatasetError> {
        if !(sample_percent > 0.0 && sample_percent <= 1.0) {
            return Err(DatasetError::InvalidConfig(format!(
                "sample_percent must be in (0, 1], got {}",
                sample_percent
            )));
        }

        let mut files = Vec::new();
        let mut class_indices = Vec::new();
        for (index, class) in classes.iter().enumerate() {
            let all_files = list_all_files(&root.join(class.as_ref()))?;
            let wanted = sample_size(sample_percent, all_files.len());
            let sample: Vec<PathBuf> = all_files
                .choose_multiple(&mut self.rng, wanted)
                .cloned()
                .collect();
            debug!(
                "class {}: sampled {} of {} files",
                class.as_ref(),
                sample.len(),
                all_files.len()
            );
            class_indices.extend(std::iter::repeat(index).take(sample.len()));
            files.extend(sample);
        }

        let shape = self.expected_shape();
        let mut samples = Vec::with_capacity(files.len());
        let mut labels = Vec::with_capacity(files.len());
        for (i, (file, class_index)) in files.iter().zip(&class_indices).enumerate() {
            samples.push(self.read_sample(file, i as u64, shape)?);
            labels.push(onehot::encode(*class_index, classes.len())?);
        }

        info!(
            "📦 Loaded {} samples from {} ({} classes, {:.0}% per class)",
            samples.len(),
            root.display(),
            classes.len(),
            sample_percent * 100.0
        );
        Ok(LoadedDataset {
            shape,
            classes: classes.iter().map(|c| c.as_ref().to_string()).collect(),
            samples,
            labels,
            sources: files,
        })
    }

    fn read_sample(&self, file: &Path, index: u64, shape: ImageShape) -> Result<Frame, DatasetError> {
        let image = image::open(file).map_err(|e| DatasetError::ImageRead {
            path: file.to_path_buf(),
            reason: e.to_string(),
        })?;
        let frame = Frame::from_image(image, index, self.mode);
        if frame.shape() != shape {
            return Err(DatasetError::ImageRead {
                path: file.to_path_buf(),
                reason: format!(
                    "shape {}x{}x{} does not match expected {}x{}x{}",
                    frame.height, frame.width, frame.channels, shape.height, shape.width, shape.channels
                ),
            });
        }
        Ok(frame)
    }
}

/// `ceil(p * n)`，不超过 `n`
pub fn sample_size(sample_percent: f64, file_count: usize) -> usize {
    ((sample_percent * file_count as f64).ceil() as usize).min(file_count)
}

/// `root` 下全部文件（已排序），目录不存在时为空
pub fn list_all_files(root: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !root.is_dir() {
        debug!("no class directory at {}", root.display());
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_SUFFIX) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    Ok(files)
}
