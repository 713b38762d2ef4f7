use std::fs::{self, OpenOptions};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::ImageOutputFormat;
use log::{debug, info};

use crate::core::classes::{Problem, Split};
use crate::core::decompose::ClassificationExample;
use crate::core::error::DatasetError;
use crate::core::video::Frame;

pub(crate) const PARTIAL_SUFFIX: &str = "partial";

/// `<root>/<problem>/<split>/<class>/<class>_<source>_<frame:04>.png`
#[derive(Debug, Clone)]
pub struct CorpusLayout {
    root: PathBuf,
}

impl CorpusLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_dir(&self, problem: Problem, split: Split) -> PathBuf {
        self.root.join(problem.as_str()).join(split.as_str())
    }

    pub fn class_dir(&self, problem: Problem, split: Split, class_label: &str) -> PathBuf {
        self.split_dir(problem, split).join(class_label)
    }

    pub fn file_name(class_label: &str, source: &str, frame_index: u64) -> String {
        format!("{}_{}_{:04}.png", class_label, source, frame_index)
    }

    pub fn example_path(&self, example: &ClassificationExample<'_>) -> PathBuf {
        self.class_dir(example.problem, example.split, &example.class_label)
            .join(Self::file_name(
                &example.class_label,
                example.source,
                example.frame_index,
            ))
    }

    /// Creates every `problem/split/class` directory. Safe to call repeatedly.
    pub fn ensure_output_dirs(&self) -> Result<(), DatasetError> {
        let mut created = 0usize;
        for problem in Problem::ALL {
            for split in Split::ALL {
                for class in problem.classes() {
                    fs::create_dir_all(self.class_dir(problem, split, class))?;
                    created += 1;
                }
            }
        }
        info!(
            "📁 Output directories ready under {} ({} class dirs)",
            self.root.display(),
            created
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    AlreadyPresent(PathBuf),
}

impl WriteOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(path) | Self::AlreadyPresent(path) => path,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Append-only PNG writer. An existing file is never replaced.
#[derive(Debug, Clone)]
pub struct CorpusWriter {
    layout: CorpusLayout,
}

impl CorpusWriter {
    pub fn new(layout: CorpusLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &CorpusLayout {
        &self.layout
    }

    pub fn write(&self, example: &ClassificationExample<'_>) -> Result<WriteOutcome, DatasetError> {
        let path = self.layout.example_path(example);
        if path.exists() {
            debug!("already present: {}", path.display());
            return Ok(WriteOutcome::AlreadyPresent(path));
        }

        let write_error = |reason: String| DatasetError::ImageWrite {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        let bytes = encode_png(example.pixels).map_err(|e| write_error(e.to_string()))?;

        // The canonical name only ever appears with complete contents.
        let partial = path.with_extension(PARTIAL_SUFFIX);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial)
            .map_err(|e| write_error(e.to_string()))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| write_error(e.to_string()))?;
        drop(file);
        fs::rename(&partial, &path).map_err(|e| write_error(e.to_string()))?;

        debug!("wrote {}", path.display());
        Ok(WriteOutcome::Written(path))
    }
}

fn encode_png(frame: &Frame) -> Result<Vec<u8>, DatasetError> {
    let image = frame.to_image()?;
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .map_err(|e| DatasetError::InvalidFrame(e.to_string()))?;
    Ok(buffer.into_inner())
}
