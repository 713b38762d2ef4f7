//! 语料构建 / 加载入口
//!
//! ```no_run
//! use plate_corpus::api::corpus::CorpusBuild;
//! use plate_corpus::core::pipeline::NoProgress;
//! use plate_corpus::core::BuildConfig;
//!
//! let build = CorpusBuild::create(BuildConfig::default()).unwrap();
//! let report = build.build_tree(&NoProgress).unwrap();
//! println!("{} files written", report.written());
//! ```

use std::path::Path;

use log::info;

use crate::core::classes::{Problem, Split};
use crate::core::config::BuildConfig;
use crate::core::corpus::{CorpusLayout, CorpusLoader, LoadedDataset};
use crate::core::error::DatasetError;
use crate::core::labels::sidecar_path;
use crate::core::pipeline::{
    canonical_or_given, discover_videos, BuildProgress, BuildReport, CorpusBuilder, LabelledVideo,
};
use crate::core::video::ImageSequenceOpener;

/// 命令行路径的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    Video(LabelledVideo),
    Tree(std::path::PathBuf),
}

/// 解析命令行路径：带标注文件的视频，或待遍历的目录
///
/// 来源标识相对 `video_root` 计算，单独构建和整树构建得到同一标识。
pub fn resolve_target(path: &Path, video_root: &Path) -> Result<BuildTarget, DatasetError> {
    if !path.exists() {
        return Err(DatasetError::VideoOpen {
            path: path.to_path_buf(),
            reason: "no such file or directory".into(),
        });
    }
    let path = canonical_or_given(path);
    let root = canonical_or_given(video_root);
    if let Some(video) = LabelledVideo::from_video(&path, Some(&root)) {
        return Ok(BuildTarget::Video(video));
    }
    if path.is_dir() {
        return Ok(BuildTarget::Tree(path));
    }
    Err(DatasetError::MalformedLabel {
        path: sidecar_path(&path),
        reason: "label file not found".into(),
    })
}

/// 语料构建器 - 帧目录视频 + 侧车标签
pub struct CorpusBuild {
    builder: CorpusBuilder<ImageSequenceOpener>,
}

impl CorpusBuild {
    /// 校验配置并创建构建器（不触碰磁盘）
    pub fn create(config: BuildConfig) -> Result<Self, DatasetError> {
        let builder = CorpusBuilder::new(config, ImageSequenceOpener::default())?;
        info!(
            "🎬 CorpusBuild: output {}",
            builder.layout().root().display()
        );
        Ok(Self { builder })
    }

    pub fn config(&self) -> &BuildConfig {
        self.builder.config()
    }

    /// 按配置的 `video_root` 解析命令行路径
    pub fn resolve(&self, path: &Path) -> Result<BuildTarget, DatasetError> {
        resolve_target(path, &self.config().video_root)
    }

    /// 遍历配置的 `video_root`
    pub fn build_tree(&self, progress: &dyn BuildProgress) -> Result<BuildReport, DatasetError> {
        self.builder.run(progress)
    }

    pub fn build_target(
        &self,
        target: &BuildTarget,
        progress: &dyn BuildProgress,
    ) -> Result<BuildReport, DatasetError> {
        self.builder.prepare()?;
        let videos = match target {
            BuildTarget::Video(video) => vec![video.clone()],
            BuildTarget::Tree(dir) => {
                let config = self.builder.config();
                discover_videos(
                    dir,
                    &canonical_or_given(&config.video_root),
                    Some(config.output_root().as_path()),
                )?
            }
        };
        self.builder.build_all(&videos, progress)
    }
}

impl Drop for CorpusBuild {
    fn drop(&mut self) {
        info!("🗑️ CorpusBuild: released");
    }
}

/// 按配置的抽样比例、尺寸和颜色模式加载一个 `problem/split` 切片
pub fn load_split(
    config: &BuildConfig,
    problem: Problem,
    split: Split,
) -> Result<LoadedDataset, DatasetError> {
    config.validate()?;
    let layout = CorpusLayout::new(config.output_root());
    let mut loader = CorpusLoader::new(config.image_shape)
        .with_seed(config.seed)
        .with_color_mode(config.color_mode);
    let dataset = loader.load(
        &layout.split_dir(problem, split),
        problem.classes(),
        config.sample_percent,
    )?;
    dataset.verify_labels()?;
    Ok(dataset)
}
