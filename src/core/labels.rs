//! 视频标注文档（`<video>.json`）的解析与校验

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::classes::ID_CLASSES;
use super::error::DatasetError;

static PLATE_TEXT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[0-9]{2}$").expect("valid plate pattern"));

const INLINE_ORIGIN: &str = "<inline>";

/// 画面中的车牌编号，0 表示无车牌
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlateId(u8);

impl PlateId {
    pub const NONE: PlateId = PlateId(0);
    pub const MAX: u8 = (ID_CLASSES.len() - 1) as u8;

    pub fn new(id: u8) -> Option<Self> {
        (id <= Self::MAX).then_some(Self(id))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PlateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 两个大写字母加两个数字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateText(String);

impl PlateText {
    pub const LEN: usize = 4;

    pub fn parse(text: &str) -> Option<Self> {
        PLATE_TEXT_PATTERN
            .is_match(text)
            .then(|| Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 第 `position`（0..4）个字符，作为类别标签
    pub fn char_at(&self, position: usize) -> &str {
        &self.0[position..position + 1]
    }
}

impl fmt::Display for PlateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
struct RawLabelDocument {
    plates: Option<BTreeMap<String, String>>,
    frames: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelDocument {
    plates: BTreeMap<PlateId, PlateText>,
    frames: BTreeMap<u64, PlateId>,
}

/// 标注文件路径：`<video_path>.json`
pub fn sidecar_path(video: &Path) -> PathBuf {
    let mut name = video.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

impl LabelDocument {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let bytes = fs::read(path)
            .map_err(|e| DatasetError::malformed(path, format!("unreadable: {}", e)))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| DatasetError::malformed(path, format!("invalid JSON: {}", e)))?;
        Self::parse(value, path)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DatasetError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| DatasetError::malformed(INLINE_ORIGIN, format!("invalid JSON: {}", e)))?;
        Self::parse(value, Path::new(INLINE_ORIGIN))
    }

    pub fn from_value(value: Value) -> Result<Self, DatasetError> {
        Self::parse(value, Path::new(INLINE_ORIGIN))
    }

    fn parse(value: Value, origin: &Path) -> Result<Self, DatasetError> {
        let raw: RawLabelDocument = serde_json::from_value(value)
            .map_err(|e| DatasetError::malformed(origin, e.to_string()))?;

        let raw_plates = raw
            .plates
            .ok_or_else(|| DatasetError::malformed(origin, "missing \"plates\" key"))?;
        let raw_frames = raw
            .frames
            .ok_or_else(|| DatasetError::malformed(origin, "missing \"frames\" key"))?;

        let mut plates = BTreeMap::new();
        for (key, text) in raw_plates {
            let id = parse_plate_key(&key).map_err(|reason| DatasetError::malformed(origin, reason))?;
            let plate = PlateText::parse(&text).ok_or_else(|| {
                DatasetError::malformed(
                    origin,
                    format!("plate {} has invalid text {:?}, expected two letters then two digits", id, text),
                )
            })?;
            plates.insert(id, plate);
        }

        let mut frames = BTreeMap::new();
        for (key, value) in raw_frames {
            let index =
                parse_frame_key(&key).map_err(|reason| DatasetError::malformed(origin, reason))?;
            let plate = value
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .and_then(PlateId::new)
                .ok_or_else(|| {
                    DatasetError::malformed(
                        origin,
                        format!("frame {:?} has invalid plate id {}", key, value),
                    )
                })?;

            match frames.insert(index, plate) {
                Some(previous) if previous != plate => {
                    return Err(DatasetError::malformed(
                        origin,
                        format!(
                            "frame keys truncating to {} disagree: plate {} vs {}",
                            index, previous, plate
                        ),
                    ));
                }
                Some(_) => debug!("frame key {:?} collapsed into index {}", key, index),
                None => {}
            }
        }

        Ok(Self { plates, frames })
    }

    pub fn plates(&self) -> &BTreeMap<PlateId, PlateText> {
        &self.plates
    }

    pub fn frames(&self) -> &BTreeMap<u64, PlateId> {
        &self.frames
    }

    pub fn plate_text(&self, id: PlateId) -> Option<&PlateText> {
        self.plates.get(&id)
    }

    pub fn plate_for_frame(&self, index: u64) -> Option<PlateId> {
        self.frames.get(&index).copied()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn last_frame_index(&self) -> Option<u64> {
        self.frames.keys().next_back().copied()
    }
}

fn parse_plate_key(key: &str) -> Result<PlateId, String> {
    let id: i64 = key
        .trim()
        .parse()
        .map_err(|_| format!("plate key {:?} is not an integer", key))?;
    if id == 0 {
        return Err("plate id 0 means \"no plate\" and cannot carry text".to_string());
    }
    u8::try_from(id)
        .ok()
        .and_then(PlateId::new)
        .ok_or_else(|| format!("plate id {} outside 0..={}", id, PlateId::MAX))
}

/// 帧键可能是小数时间戳，取截断后的整数
fn parse_frame_key(key: &str) -> Result<u64, String> {
    let value: f64 = key
        .trim()
        .parse()
        .map_err(|_| format!("frame key {:?} is not a number", key))?;
    if !value.is_finite() || value < 0.0 || value >= u64::MAX as f64 {
        return Err(format!("frame key {:?} is not a valid frame index", key));
    }
    Ok(value.trunc() as u64)
}
