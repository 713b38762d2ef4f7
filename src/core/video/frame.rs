use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::core::error::DatasetError;

/// 像素通道模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Rgb,
    Greyscale,
}

impl ColorMode {
    pub fn channels(self) -> u8 {
        match self {
            Self::Rgb => 3,
            Self::Greyscale => 1,
        }
    }
}

/// 固定帧尺寸 `(height, width, channels)`，与训练数组一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
    pub channels: u8,
}

impl ImageShape {
    pub fn new(height: u32, width: u32, channels: u8) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize
    }

    pub fn with_color_mode(self, mode: ColorMode) -> Self {
        Self {
            channels: mode.channels(),
            ..self
        }
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self::new(720, 1280, 3)
    }
}

/// 帧数据结构（RGB 或灰度，行优先）
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
        frame_number: u64,
    ) -> Result<Self, DatasetError> {
        if channels != 1 && channels != 3 {
            return Err(DatasetError::InvalidFrame(format!(
                "unsupported channel count {}",
                channels
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(DatasetError::InvalidFrame(format!(
                "frame {} has {} bytes, expected {} for {}x{}x{}",
                frame_number,
                data.len(),
                expected,
                width,
                height,
                channels
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
            frame_number,
        })
    }

    pub fn from_image(image: DynamicImage, frame_number: u64, mode: ColorMode) -> Self {
        let (width, height, channels, data) = match mode {
            ColorMode::Rgb => {
                let rgb = image.into_rgb8();
                (rgb.width(), rgb.height(), 3, rgb.into_raw())
            }
            ColorMode::Greyscale => {
                let luma = image.into_luma8();
                (luma.width(), luma.height(), 1, luma.into_raw())
            }
        };
        Self {
            width,
            height,
            channels,
            data,
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn shape(&self) -> ImageShape {
        ImageShape::new(self.height, self.width, self.channels)
    }

    pub fn to_image(&self) -> Result<DynamicImage, DatasetError> {
        let invalid =
            || DatasetError::InvalidFrame(format!("frame {} buffer size mismatch", self.frame_number));
        match self.channels {
            3 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(invalid),
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(invalid),
            other => Err(DatasetError::InvalidFrame(format!(
                "unsupported channel count {}",
                other
            ))),
        }
    }
}
