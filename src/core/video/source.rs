//! 帧源：视频解码层对外暴露的最小接口

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::frame::{ColorMode, Frame};
use crate::core::error::DatasetError;

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 顺序或按下标读取已解码的帧
///
/// 实现需在 `Drop` 中释放解码资源，任何退出路径都会释放。
pub trait FrameSource: Send {
    fn is_opened(&self) -> bool;

    fn frame_count(&self) -> u64;

    fn read_frame(&mut self, index: u64) -> Result<Frame, DatasetError>;

    /// 跳过不需要的帧：只能前进的解码器仍需读取，可按下标访问的帧源无需处理
    fn skip_frame(&mut self, _index: u64) -> Result<(), DatasetError> {
        Ok(())
    }

    fn release(&mut self) {}
}

pub trait VideoOpener: Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, DatasetError>;
}

/// 惰性、只前进的全帧遍历
pub struct FrameIter<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    next: u64,
    total: u64,
}

impl<S: FrameSource + ?Sized> Iterator for FrameIter<'_, S> {
    type Item = Result<Frame, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.source.read_frame(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.next) as usize;
        (remaining, Some(remaining))
    }
}

pub trait FrameSourceExt: FrameSource {
    fn frames(&mut self) -> FrameIter<'_, Self> {
        let total = if self.is_opened() { self.frame_count() } else { 0 };
        FrameIter {
            source: self,
            next: 0,
            total,
        }
    }
}

impl<S: FrameSource + ?Sized> FrameSourceExt for S {}

/// 解码后的帧图片目录，按文件名排序即帧顺序
pub struct ImageSequenceSource {
    path: PathBuf,
    frames: Vec<PathBuf>,
    mode: ColorMode,
    opened: bool,
}

impl ImageSequenceSource {
    pub fn open(path: &Path, mode: ColorMode) -> Result<Self, DatasetError> {
        if !path.is_dir() {
            warn!("⚠️ Not a frame directory, cannot open: {}", path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                frames: Vec::new(),
                mode,
                opened: false,
            });
        }

        let entries = fs::read_dir(path).map_err(|e| DatasetError::VideoOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file = entry.path();
            if file.is_file() && is_frame_file(&file) {
                frames.push(file);
            }
        }
        frames.sort();

        info!(
            "🎬 Opened frame sequence {} ({} frames)",
            path.display(),
            frames.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            frames,
            mode,
            opened: true,
        })
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn read_frame(&mut self, index: u64) -> Result<Frame, DatasetError> {
        let file = self.frames.get(index as usize).ok_or_else(|| {
            DatasetError::InvalidFrame(format!(
                "frame {} out of range for {} ({} frames)",
                index,
                self.path.display(),
                self.frames.len()
            ))
        })?;
        let image = image::open(file).map_err(|e| DatasetError::ImageRead {
            path: file.clone(),
            reason: e.to_string(),
        })?;
        Ok(Frame::from_image(image, index, self.mode))
    }

    fn release(&mut self) {
        if self.opened {
            self.opened = false;
            self.frames.clear();
            debug!("🗑️ Released frame sequence {}", self.path.display());
        }
    }
}

impl Drop for ImageSequenceSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSequenceOpener {
    pub mode: ColorMode,
}

impl VideoOpener for ImageSequenceOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, DatasetError> {
        Ok(Box::new(ImageSequenceSource::open(path, self.mode)?))
    }
}

/// 内存帧源，用于测试和上层直接喂帧
pub struct MemorySource {
    frames: Vec<Frame>,
    opened: bool,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            opened: true,
        }
    }

    pub fn closed() -> Self {
        Self {
            frames: Vec::new(),
            opened: false,
        }
    }
}

impl FrameSource for MemorySource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn read_frame(&mut self, index: u64) -> Result<Frame, DatasetError> {
        self.frames.get(index as usize).cloned().ok_or_else(|| {
            DatasetError::InvalidFrame(format!(
                "frame {} out of range ({} frames)",
                index,
                self.frames.len()
            ))
        })
    }

    fn release(&mut self) {
        self.opened = false;
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frames(dir: &Path, count: u32) {
        for i in 0..count {
            let img = RgbImage::from_pixel(8, 6, Rgb([i as u8 * 10, 0, 0]));
            img.save(dir.join(format!("frame_{:05}.png", i))).unwrap();
        }
    }

    #[test]
    fn test_image_sequence_reads_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), ColorMode::Rgb).unwrap();
        assert!(source.is_opened());
        assert_eq!(source.frame_count(), 3);

        let frames: Vec<Frame> = source.frames().collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].frame_number, 2);
        assert_eq!(frames[2].data[0], 20);
        assert_eq!((frames[0].width, frames[0].height, frames[0].channels), (8, 6, 3));
    }

    #[test]
    fn test_missing_directory_is_not_opened() {
        let dir = tempfile::tempdir().unwrap();
        let mut source =
            ImageSequenceSource::open(&dir.path().join("nope"), ColorMode::Rgb).unwrap();
        assert!(!source.is_opened());
        assert_eq!(source.frames().count(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);
        let mut source = ImageSequenceSource::open(dir.path(), ColorMode::Greyscale).unwrap();
        assert_eq!(source.read_frame(1).unwrap().channels, 1);
        source.release();
        source.release();
        assert!(!source.is_opened());
        assert!(source.read_frame(0).is_err());
    }

    #[test]
    fn test_corrupt_frame_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0000.png"), b"not a png").unwrap();
        let mut source = ImageSequenceSource::open(dir.path(), ColorMode::Rgb).unwrap();
        match source.read_frame(0) {
            Err(DatasetError::ImageRead { .. }) => {}
            other => panic!("unexpected: {:?}", other.map(|f| f.frame_number)),
        }
    }

    #[test]
    fn test_boxed_source_iterates() {
        let frames = (0..4)
            .map(|i| Frame::new(2, 2, 1, vec![i as u8; 4], i).unwrap())
            .collect();
        let mut source: Box<dyn FrameSource> = Box::new(MemorySource::new(frames));
        let numbers: Vec<u64> = source
            .frames()
            .map(|f| f.unwrap().frame_number)
            .collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        assert_eq!(MemorySource::closed().frames().count(), 0);
    }
}
