use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("malformed label document {}: {reason}", path.display())]
    MalformedLabel { path: PathBuf, reason: String },
    #[error("failed to write image {}: {reason}", path.display())]
    ImageWrite { path: PathBuf, reason: String },
    #[error("failed to read image {}: {reason}", path.display())]
    ImageRead { path: PathBuf, reason: String },
    #[error("one-hot label has {nonzero} nonzero entries, expected exactly 1")]
    AmbiguousLabel { nonzero: usize },
    #[error("failed to open video {}: {reason}", path.display())]
    VideoOpen { path: PathBuf, reason: String },
    #[error("source id {source_id:?} is shared by {} and {}", first.display(), second.display())]
    DuplicateSource {
        source_id: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatasetError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedLabel {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 是否只影响单个视频（批处理可以跳过继续）
    pub fn is_per_video(&self) -> bool {
        matches!(self, Self::MalformedLabel { .. })
    }
}
