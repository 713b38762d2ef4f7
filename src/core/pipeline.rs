//! 语料构建流水线：发现标注视频 → 逐帧拆解 → 写入语料目录

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::classes::{Problem, Split};
use super::config::BuildConfig;
use super::corpus::{CorpusLayout, CorpusWriter, WriteOutcome};
use super::decompose::{missing_frames, DecompositionStats, LabelDecomposer, LabelledFrames};
use super::error::DatasetError;
use super::labels::{sidecar_path, LabelDocument};
use super::split::SplitAssigner;
use super::video::VideoOpener;

const SOURCE_SEPARATOR: &str = "-";
const DETACHED_MARKER: char = '~';

/// 视频及其标注文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelledVideo {
    pub video_path: PathBuf,
    pub label_path: PathBuf,
    pub source_id: String,
}

impl LabelledVideo {
    /// 视频或 `<video>.json` 缺失时返回 `None`
    pub fn from_video(video_path: &Path, root: Option<&Path>) -> Option<Self> {
        let label_path = sidecar_path(video_path);
        if !video_path.exists() || !label_path.is_file() {
            return None;
        }
        Some(Self {
            video_path: video_path.to_path_buf(),
            label_path,
            source_id: source_id(video_path, root),
        })
    }
}

/// 视频来源标识：相对 `root` 的路径，分隔符压平为 `-`
///
/// 路径片段内的 `%`、`-`、`~` 会被转义，所以不同路径不会得到同一标识。
/// 不在 `root` 之下的视频得到 `~<哈希>-<文件名>` 形式的独立标识。
pub fn source_id(video_path: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|r| video_path.strip_prefix(r).ok())
        .filter(|rel| !rel.as_os_str().is_empty());
    match relative {
        Some(rel) => rel
            .components()
            .map(|c| escape_component(&c.as_os_str().to_string_lossy()))
            .collect::<Vec<_>>()
            .join(SOURCE_SEPARATOR),
        None => {
            let name = video_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let digest = Sha256::digest(video_path.to_string_lossy().as_bytes());
            let tag: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
            format!(
                "{}{}{}{}",
                DETACHED_MARKER,
                tag,
                SOURCE_SEPARATOR,
                escape_component(&name)
            )
        }
    }
}

fn escape_component(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '-' => escaped.push_str("%2D"),
            '~' => escaped.push_str("%7E"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// 解析符号链接和 `..` 后的路径，不存在时原样返回
pub fn canonical_or_given(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// `walk_root` 下所有带标注文件的条目（按文件名排序）
///
/// 来源标识相对 `id_root` 计算；不进入视频目录内部，跳过 `exclude`（语料目录本身）。
pub fn discover_videos(
    walk_root: &Path,
    id_root: &Path,
    exclude: Option<&Path>,
) -> Result<Vec<LabelledVideo>, DatasetError> {
    let excluded = exclude.and_then(|p| fs::canonicalize(p).ok());
    let mut walker = WalkDir::new(walk_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match &excluded {
            Some(excluded) if entry.file_type().is_dir() => fs::canonicalize(entry.path())
                .map(|p| &p != excluded)
                .unwrap_or(true),
            _ => true,
        });

    let mut videos = Vec::new();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            continue;
        }
        if let Some(video) = LabelledVideo::from_video(path, Some(id_root)) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            videos.push(video);
        }
    }
    ensure_unique_sources(&videos)?;
    info!("🔍 Found {} labelled videos under {}", videos.len(), walk_root.display());
    Ok(videos)
}

/// 来源标识重复的两个视频会写到同一批语料路径
pub fn ensure_unique_sources(videos: &[LabelledVideo]) -> Result<(), DatasetError> {
    let mut seen: HashMap<&str, &Path> = HashMap::with_capacity(videos.len());
    for video in videos {
        if let Some(first) = seen.insert(&video.source_id, &video.video_path) {
            return Err(DatasetError::DuplicateSource {
                source_id: video.source_id.clone(),
                first: first.to_path_buf(),
                second: video.video_path.clone(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoReport {
    pub source_id: String,
    pub labelled_frames: usize,
    pub stats: DecompositionStats,
    pub written: usize,
    pub already_present: usize,
    pub train: usize,
    pub test: usize,
    pub missing_frames: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoOutcome {
    Built(VideoReport),
    /// 帧源未能打开
    Skipped { source_id: String },
    /// 标注文档有误，批处理继续
    Failed { source_id: String, reason: String },
}

impl VideoOutcome {
    pub fn source_id(&self) -> &str {
        match self {
            Self::Built(report) => &report.source_id,
            Self::Skipped { source_id } | Self::Failed { source_id, .. } => source_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub outcomes: Vec<VideoOutcome>,
}

impl BuildReport {
    pub fn built(&self) -> impl Iterator<Item = &VideoReport> {
        self.outcomes.iter().filter_map(|o| match o {
            VideoOutcome::Built(report) => Some(report),
            _ => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, VideoOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, VideoOutcome::Skipped { .. }))
            .count()
    }

    pub fn examples(&self, problem: Problem) -> usize {
        self.built().map(|r| r.stats.count(problem)).sum()
    }

    pub fn written(&self) -> usize {
        self.built().map(|r| r.written).sum()
    }

    pub fn already_present(&self) -> usize {
        self.built().map(|r| r.already_present).sum()
    }
}

/// 进度回调，可能被多个 worker 线程同时调用
pub trait BuildProgress: Sync {
    fn frame_done(&self, _source_id: &str, _frame_index: u64) {}

    fn video_done(&self, _outcome: &VideoOutcome) {}
}

pub struct NoProgress;

impl BuildProgress for NoProgress {}

pub struct CorpusBuilder<O: VideoOpener> {
    config: BuildConfig,
    opener: O,
    writer: CorpusWriter,
}

impl<O: VideoOpener> CorpusBuilder<O> {
    pub fn new(config: BuildConfig, opener: O) -> Result<Self, DatasetError> {
        config.validate()?;
        let writer = CorpusWriter::new(CorpusLayout::new(config.output_root()));
        Ok(Self {
            config,
            opener,
            writer,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn layout(&self) -> &CorpusLayout {
        self.writer.layout()
    }

    pub fn prepare(&self) -> Result<(), DatasetError> {
        self.writer.layout().ensure_output_dirs()
    }

    pub fn discover(&self) -> Result<Vec<LabelledVideo>, DatasetError> {
        discover_videos(
            &self.config.video_root,
            &self.config.video_root,
            Some(self.config.output_root().as_path()),
        )
    }

    /// 整树构建：建目录、发现视频、逐个构建
    pub fn run(&self, progress: &dyn BuildProgress) -> Result<BuildReport, DatasetError> {
        self.prepare()?;
        let videos = self.discover()?;
        self.build_all(&videos, progress)
    }

    /// 在 `workers` 个线程上并行构建，每个视频独立的划分随机流，结果与调度无关
    pub fn build_all(
        &self,
        videos: &[LabelledVideo],
        progress: &dyn BuildProgress,
    ) -> Result<BuildReport, DatasetError> {
        ensure_unique_sources(videos)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| DatasetError::InvalidConfig(e.to_string()))?;

        let outcomes = pool.install(|| {
            videos
                .par_iter()
                .map(|video| {
                    let outcome = self.build_video(video, progress)?;
                    progress.video_done(&outcome);
                    Ok(outcome)
                })
                .collect::<Result<Vec<_>, DatasetError>>()
        })?;

        let report = BuildReport { outcomes };
        info!(
            "✅ Build finished: {} written, {} already present, {} failed, {} skipped",
            report.written(),
            report.already_present(),
            report.failed_count(),
            report.skipped_count()
        );
        Ok(report)
    }

    pub fn build_video(
        &self,
        video: &LabelledVideo,
        progress: &dyn BuildProgress,
    ) -> Result<VideoOutcome, DatasetError> {
        let labels = match LabelDocument::load(&video.label_path) {
            Ok(labels) => labels,
            Err(e) if e.is_per_video() => {
                error!("❌ {}: {}", video.source_id, e);
                return Ok(VideoOutcome::Failed {
                    source_id: video.source_id.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let mut source = self.opener.open(&video.video_path)?;
        if !source.is_opened() {
            warn!("⚠️ {}: video did not open, skipping", video.source_id);
            return Ok(VideoOutcome::Skipped {
                source_id: video.source_id.clone(),
            });
        }

        info!(
            "🎬 Building {} ({} labelled of {} frames)",
            video.source_id,
            labels.frame_count(),
            source.frame_count()
        );

        let mut splits = SplitAssigner::for_source(
            self.config.seed,
            &video.source_id,
            self.config.train_weight(),
            self.config.test_weight(),
        )?;
        let mut decomposer = LabelDecomposer::new(&labels);
        let mut report = VideoReport {
            source_id: video.source_id.clone(),
            labelled_frames: labels.frame_count(),
            ..Default::default()
        };

        for frame in LabelledFrames::new(source.as_mut(), &labels) {
            let frame = frame?;
            for example in decomposer.decompose(&frame, &video.source_id, &mut splits) {
                match self.writer.write(&example)? {
                    WriteOutcome::Written(_) => report.written += 1,
                    WriteOutcome::AlreadyPresent(_) => report.already_present += 1,
                }
                match example.split {
                    Split::Train => report.train += 1,
                    Split::Test => report.test += 1,
                }
            }
            progress.frame_done(&video.source_id, frame.frame_index);
        }

        report.missing_frames = missing_frames(&labels, source.frame_count());
        source.release();

        if !report.missing_frames.is_empty() {
            warn!(
                "⚠️ {}: {} labelled frames are beyond the end of the video: {:?}",
                video.source_id,
                report.missing_frames.len(),
                report.missing_frames
            );
        }
        report.stats = decomposer.into_stats();
        debug_assert_eq!(
            report.stats.count(Problem::Ids) + report.missing_frames.len(),
            report.labelled_frames
        );

        info!(
            "✓ {}: {} examples ({} train / {} test), {} new files",
            video.source_id,
            report.stats.total_examples(),
            report.train,
            report.test,
            report.written
        );
        Ok(VideoOutcome::Built(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::{Frame, FrameSource, MemorySource};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Every path opens as a solid-colour video of a fixed length.
    struct SyntheticOpener {
        frames: u64,
    }

    impl VideoOpener for SyntheticOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, DatasetError> {
            if path.extension().and_then(|e| e.to_str()) == Some("broken") {
                return Ok(Box::new(MemorySource::closed()));
            }
            let frames = (0..self.frames)
                .map(|i| Frame::new(4, 3, 3, vec![i as u8; 36], i).unwrap())
                .collect();
            Ok(Box::new(MemorySource::new(frames)))
        }
    }

    /// Records in a shared flag when its source is released.
    struct TrackedOpener {
        frames: u64,
        fail_at: Option<u64>,
        released: Arc<AtomicBool>,
    }

    struct TrackedSource {
        inner: MemorySource,
        fail_at: Option<u64>,
        released: Arc<AtomicBool>,
    }

    impl VideoOpener for TrackedOpener {
        fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>, DatasetError> {
            let frames = (0..self.frames)
                .map(|i| Frame::new(4, 3, 3, vec![i as u8; 36], i).unwrap())
                .collect();
            Ok(Box::new(TrackedSource {
                inner: MemorySource::new(frames),
                fail_at: self.fail_at,
                released: Arc::clone(&self.released),
            }))
        }
    }

    impl FrameSource for TrackedSource {
        fn is_opened(&self) -> bool {
            self.inner.is_opened()
        }

        fn frame_count(&self) -> u64 {
            self.inner.frame_count()
        }

        fn read_frame(&mut self, index: u64) -> Result<Frame, DatasetError> {
            if self.fail_at == Some(index) {
                return Err(DatasetError::InvalidFrame(format!("decoder lost frame {}", index)));
            }
            self.inner.read_frame(index)
        }

        fn release(&mut self) {
            self.inner.release();
            self.released.store(true, Ordering::SeqCst);
        }
    }

    impl Drop for TrackedSource {
        fn drop(&mut self) {
            self.release();
        }
    }

    fn tracked(frames: u64, fail_at: Option<u64>) -> (TrackedOpener, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let opener = TrackedOpener {
            frames,
            fail_at,
            released: Arc::clone(&released),
        };
        (opener, released)
    }

    struct CountingProgress {
        frames: AtomicUsize,
        videos: AtomicUsize,
    }

    impl BuildProgress for CountingProgress {
        fn frame_done(&self, _source_id: &str, _frame_index: u64) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }

        fn video_done(&self, _outcome: &VideoOutcome) {
            self.videos.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn add_video(root: &Path, name: &str, labels: &str) -> PathBuf {
        let video = root.join(name);
        if let Some(parent) = video.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&video, b"").unwrap();
        fs::write(sidecar_path(&video), labels).unwrap();
        video
    }

    fn config_for(root: &Path, workers: usize) -> BuildConfig {
        BuildConfig {
            video_root: root.to_path_buf(),
            output_root: None,
            workers,
            ..Default::default()
        }
    }

    fn list_corpus(root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(root).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_source_id_flattens_relative_path() {
        let root = Path::new("/videos");
        assert_eq!(source_id(Path::new("/videos/day1/run.mp4"), Some(root)), "day1-run.mp4");
        assert_eq!(source_id(Path::new("/videos/run.mp4"), Some(root)), "run.mp4");
        assert_eq!(source_id(Path::new("/videos/day1-run.mp4"), Some(root)), "day1%2Drun.mp4");
    }

    #[test]
    fn test_source_id_outside_root_is_detached() {
        let root = Path::new("/videos");
        let outside = source_id(Path::new("/elsewhere/run.mp4"), Some(root));
        let other = source_id(Path::new("/other/run.mp4"), None);
        assert!(outside.starts_with('~'));
        assert!(outside.ends_with("-run.mp4"));
        assert_ne!(outside, other);
        assert_ne!(outside, source_id(Path::new("/videos/run.mp4"), Some(root)));
        assert_eq!(outside, source_id(Path::new("/elsewhere/run.mp4"), None));
    }

    #[test]
    fn test_source_id_is_one_to_one() {
        let root = Path::new("/v");
        let paths = [
            "/v/day1/run",
            "/v/day1-run",
            "/v/day1--run",
            "/v/a-/b",
            "/v/a/-b",
            "/v/a%2Db",
            "/v/~x-run",
        ];
        let mut ids: Vec<String> = paths.iter().map(|p| source_id(Path::new(p), Some(root))).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), paths.len());
    }

    #[test]
    fn test_discover_skips_unlabelled_and_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        add_video(root, "a.mp4", "{}");
        add_video(root, "sub/b.mp4", "{}");
        fs::write(root.join("c.mp4"), b"").unwrap();
        add_video(root, "images/ids/train/0/x.png", "{}");

        let videos = discover_videos(root, root, Some(root.join("images").as_path())).unwrap();
        let ids: Vec<_> = videos.iter().map(|v| v.source_id.as_str()).collect();
        assert_eq!(ids, ["a.mp4", "sub-b.mp4"]);
        assert_eq!(videos[0].label_path, root.join("a.mp4.json"));

        let nested = discover_videos(&root.join("sub"), root, None).unwrap();
        assert_eq!(nested[0].source_id, "sub-b.mp4");
    }

    #[test]
    fn test_lookalike_paths_build_separately() {
        let dir = tempfile::tempdir().unwrap();
        let labels = r#"{"plates": {}, "frames": {"0": 0, "1": 0}}"#;
        add_video(dir.path(), "day1/run", labels);
        add_video(dir.path(), "day1-run", labels);

        let builder = CorpusBuilder::new(config_for(dir.path(), 2), SyntheticOpener { frames: 2 }).unwrap();
        let report = builder.run(&NoProgress).unwrap();

        let mut ids: Vec<&str> = report.outcomes.iter().map(|o| o.source_id()).collect();
        ids.sort();
        assert_eq!(ids, ["day1%2Drun", "day1-run"]);
        assert_eq!(report.examples(Problem::Ids), 4);
        assert_eq!(report.written(), 4);
        assert_eq!(report.already_present(), 0);
        assert_eq!(list_corpus(builder.layout().root()).len(), 4);
    }

    #[test]
    fn test_duplicate_source_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = add_video(dir.path(), "a/run.mp4", "{}");
        let b = add_video(dir.path(), "b/run.mp4", "{}");
        let videos: Vec<LabelledVideo> = [a, b]
            .into_iter()
            .map(|path| LabelledVideo {
                label_path: sidecar_path(&path),
                video_path: path,
                source_id: "run.mp4".to_string(),
            })
            .collect();

        let builder = CorpusBuilder::new(config_for(dir.path(), 1), SyntheticOpener { frames: 1 }).unwrap();
        match builder.build_all(&videos, &NoProgress) {
            Err(DatasetError::DuplicateSource { source_id, .. }) => assert_eq!(source_id, "run.mp4"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!builder.layout().root().exists());
    }

    #[test]
    fn test_build_scenario_counts() {
        let dir = tempfile::tempdir().unwrap();
        add_video(
            dir.path(),
            "clip.mp4",
            r#"{"plates": {"1": "AB12"}, "frames": {"0": 1, "5": 0, "10.0": 1}}"#,
        );
        let builder = CorpusBuilder::new(config_for(dir.path(), 1), SyntheticOpener { frames: 11 }).unwrap();
        let progress = CountingProgress {
            frames: AtomicUsize::new(0),
            videos: AtomicUsize::new(0),
        };
        let report = builder.run(&progress).unwrap();

        assert_eq!(report.examples(Problem::Ids), 3);
        let characters: usize = [Problem::Letter1, Problem::Letter2, Problem::Number1, Problem::Number2]
            .into_iter()
            .map(|p| report.examples(p))
            .sum();
        assert_eq!(characters, 8);
        assert_eq!(report.written(), 11);
        assert_eq!(progress.frames.load(Ordering::SeqCst), 3);
        assert_eq!(progress.videos.load(Ordering::SeqCst), 1);

        let files = list_corpus(builder.layout().root());
        assert_eq!(files.len(), 11);
        let mut ids_files: Vec<_> = files
            .iter()
            .filter(|f| f.starts_with("ids"))
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        ids_files.sort();
        assert_eq!(
            ids_files,
            ["0_clip.mp4_0005.png", "1_clip.mp4_0000.png", "1_clip.mp4_0010.png"]
        );
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        add_video(
            dir.path(),
            "clip.mp4",
            r#"{"plates": {"1": "AB12", "2": "CD34"}, "frames": {"0": 1, "1": 2, "3": 0, "4": 2}}"#,
        );
        let builder = CorpusBuilder::new(config_for(dir.path(), 2), SyntheticOpener { frames: 5 }).unwrap();
        let first = builder.run(&NoProgress).unwrap();
        let before = list_corpus(builder.layout().root());
        let bytes_before: Vec<Vec<u8>> = before
            .iter()
            .map(|f| fs::read(builder.layout().root().join(f)).unwrap())
            .collect();

        let second = builder.run(&NoProgress).unwrap();
        let after = list_corpus(builder.layout().root());
        assert_eq!(before, after);
        assert_eq!(second.written(), 0);
        assert_eq!(second.already_present(), first.written());
        for (file, bytes) in after.iter().zip(bytes_before) {
            assert_eq!(fs::read(builder.layout().root().join(file)).unwrap(), bytes);
        }
    }

    #[test]
    fn test_partitioning_independent_of_worker_count() {
        let labels = r#"{"plates": {"3": "KL56"}, "frames": {"0": 3, "1": 3, "2": 0, "3": 3}}"#;
        let mut layouts = Vec::new();
        let mut dirs = Vec::new();
        for workers in [1, 4] {
            let dir = tempfile::tempdir().unwrap();
            for name in ["a.mp4", "b.mp4", "c.mp4"] {
                add_video(dir.path(), name, labels);
            }
            let builder =
                CorpusBuilder::new(config_for(dir.path(), workers), SyntheticOpener { frames: 4 }).unwrap();
            builder.run(&NoProgress).unwrap();
            layouts.push(list_corpus(builder.layout().root()));
            dirs.push(dir);
        }
        assert_eq!(layouts[0], layouts[1]);
    }

    #[test]
    fn test_malformed_labels_do_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        add_video(dir.path(), "bad.mp4", r#"{"frames": {"3.7": 2}}"#);
        add_video(dir.path(), "good.mp4", r#"{"plates": {}, "frames": {"0": 0}}"#);
        add_video(dir.path(), "dead.broken", r#"{"plates": {}, "frames": {"0": 0}}"#);

        let builder = CorpusBuilder::new(config_for(dir.path(), 1), SyntheticOpener { frames: 2 }).unwrap();
        let report = builder.run(&NoProgress).unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.examples(Problem::Ids), 1);
        match &report.outcomes[0] {
            VideoOutcome::Failed { source_id, reason } => {
                assert_eq!(source_id, "bad.mp4");
                assert!(reason.contains("plates"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_frames_reported() {
        let dir = tempfile::tempdir().unwrap();
        add_video(dir.path(), "short.mp4", r#"{"plates": {}, "frames": {"1": 0, "9": 0}}"#);
        let builder = CorpusBuilder::new(config_for(dir.path(), 1), SyntheticOpener { frames: 3 }).unwrap();
        let report = builder.run(&NoProgress).unwrap();
        let video = report.built().next().unwrap();
        assert_eq!(video.missing_frames, vec![9]);
        assert_eq!(video.stats.count(Problem::Ids), 1);
        assert_eq!(video.train + video.test, 1);
    }

    #[test]
    fn test_undecodable_sidecar_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let bad = add_video(dir.path(), "a_bad.mp4", "{}");
        let mut bytes = br#"{"plates": {}, "frames": {"0": 0}}"#.to_vec();
        bytes.push(0xFF);
        fs::write(sidecar_path(&bad), bytes).unwrap();
        add_video(dir.path(), "b_good.mp4", r#"{"plates": {}, "frames": {"0": 0}}"#);

        let builder = CorpusBuilder::new(config_for(dir.path(), 2), SyntheticOpener { frames: 1 }).unwrap();
        let report = builder.run(&NoProgress).unwrap();

        assert_eq!(report.failed_count(), 1);
        assert!(matches!(&report.outcomes[0], VideoOutcome::Failed { source_id, .. } if source_id == "a_bad.mp4"));
        assert_eq!(report.built().count(), 1);
        assert_eq!(report.written(), 1);
    }

    #[test]
    fn test_source_released_after_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let video = add_video(dir.path(), "clip.mp4", r#"{"plates": {}, "frames": {"0": 0}}"#);
        let output = dir.path().join("images");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("ids"), b"").unwrap();

        let (opener, released) = tracked(2, None);
        let builder = CorpusBuilder::new(config_for(dir.path(), 1), opener).unwrap();
        let target = LabelledVideo::from_video(&video, Some(dir.path())).unwrap();
        let result = builder.build_video(&target, &NoProgress);

        assert!(matches!(result, Err(DatasetError::ImageWrite { .. })));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_source_released_after_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let video = add_video(dir.path(), "clip.mp4", r#"{"plates": {}, "frames": {"0": 0, "1": 0}}"#);

        let (opener, released) = tracked(3, Some(1));
        let builder = CorpusBuilder::new(config_for(dir.path(), 1), opener).unwrap();
        let target = LabelledVideo::from_video(&video, Some(dir.path())).unwrap();
        let result = builder.build_video(&target, &NoProgress);

        assert!(matches!(result, Err(DatasetError::InvalidFrame(_))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_source_released_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let video = add_video(dir.path(), "clip.mp4", r#"{"plates": {}, "frames": {"0": 0}}"#);

        let (opener, released) = tracked(1, None);
        let builder = CorpusBuilder::new(config_for(dir.path(), 1), opener).unwrap();
        let target = LabelledVideo::from_video(&video, Some(dir.path())).unwrap();
        assert!(matches!(
            builder.build_video(&target, &NoProgress),
            Ok(VideoOutcome::Built(_))
        ));
        assert!(released.load(Ordering::SeqCst));
    }
}
