//! 标注帧拆解：一帧 → 1~5 个分类样本

use std::collections::BTreeMap;

use log::{debug, warn};

use super::classes::{Problem, Split, PLATE_PROBLEMS};
use super::error::DatasetError;
use super::labels::{LabelDocument, PlateId, PlateText};
use super::split::SplitAssigner;
use super::video::{Frame, FrameSource};

#[derive(Debug, Clone, PartialEq)]
pub struct LabelledFrame {
    pub frame_index: u64,
    pub plate_id: PlateId,
    pub pixels: Frame,
}

/// 单个分类样本，写入某个问题的类别目录
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationExample<'a> {
    pub problem: Problem,
    pub class_label: String,
    pub split: Split,
    pub source: &'a str,
    pub frame_index: u64,
    pub pixels: &'a Frame,
}

/// 车牌号对应的字符标签
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharacterLabels<'d> {
    NoPlate,
    Registered(&'d PlateText),
    /// `frames` 里出现但 `plates` 里没有文本的车牌号
    Unregistered(PlateId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecompositionStats {
    pub frames: usize,
    pub examples: BTreeMap<Problem, usize>,
    pub skipped_character_frames: usize,
}

impl DecompositionStats {
    pub fn count(&self, problem: Problem) -> usize {
        self.examples.get(&problem).copied().unwrap_or(0)
    }

    pub fn total_examples(&self) -> usize {
        self.examples.values().sum()
    }
}

pub struct LabelDecomposer<'d> {
    labels: &'d LabelDocument,
    stats: DecompositionStats,
}

impl<'d> LabelDecomposer<'d> {
    pub fn new(labels: &'d LabelDocument) -> Self {
        Self {
            labels,
            stats: DecompositionStats::default(),
        }
    }

    pub fn character_labels(&self, plate_id: PlateId) -> CharacterLabels<'d> {
        if plate_id.is_none() {
            return CharacterLabels::NoPlate;
        }
        match self.labels.plate_text(plate_id) {
            Some(text) => CharacterLabels::Registered(text),
            None => CharacterLabels::Unregistered(plate_id),
        }
    }

    /// 每个样本各自抽取划分，顺序为先 `ids` 后四个字符位
    pub fn decompose<'a>(
        &mut self,
        frame: &'a LabelledFrame,
        source: &'a str,
        splits: &mut SplitAssigner,
    ) -> Vec<ClassificationExample<'a>> {
        let mut examples = Vec::with_capacity(1 + PLATE_PROBLEMS.len());
        let mut emit = |problem: Problem, class_label: String| {
            examples.push(ClassificationExample {
                problem,
                class_label,
                split: splits.assign(),
                source,
                frame_index: frame.frame_index,
                pixels: &frame.pixels,
            });
        };

        emit(Problem::Ids, frame.plate_id.to_string());

        match self.character_labels(frame.plate_id) {
            CharacterLabels::NoPlate => {}
            CharacterLabels::Registered(text) => {
                for (position, problem) in PLATE_PROBLEMS.into_iter().enumerate() {
                    emit(problem, text.char_at(position).to_string());
                }
            }
            CharacterLabels::Unregistered(plate_id) => {
                warn!(
                    "⚠️ {} frame {}: plate {} has no registered text, character labels skipped",
                    source, frame.frame_index, plate_id
                );
                self.stats.skipped_character_frames += 1;
            }
        }

        self.stats.frames += 1;
        for example in &examples {
            *self.stats.examples.entry(example.problem).or_insert(0) += 1;
        }
        debug!(
            "{} frame {} -> {} examples",
            source,
            frame.frame_index,
            examples.len()
        );
        examples
    }

    pub fn stats(&self) -> &DecompositionStats {
        &self.stats
    }

    pub fn into_stats(self) -> DecompositionStats {
        self.stats
    }
}

/// 按帧序遍历帧源，只产出标注文档里有的帧，到最后一个标注帧为止
pub struct LabelledFrames<'s, 'd, S: FrameSource + ?Sized> {
    source: &'s mut S,
    labels: &'d LabelDocument,
    next: u64,
    end: u64,
}

impl<'s, 'd, S: FrameSource + ?Sized> LabelledFrames<'s, 'd, S> {
    pub fn new(source: &'s mut S, labels: &'d LabelDocument) -> Self {
        let available = if source.is_opened() {
            source.frame_count()
        } else {
            0
        };
        let end = labels
            .last_frame_index()
            .map(|last| available.min(last + 1))
            .unwrap_or(0);
        Self {
            source,
            labels,
            next: 0,
            end,
        }
    }
}

impl<S: FrameSource + ?Sized> Iterator for LabelledFrames<'_, '_, S> {
    type Item = Result<LabelledFrame, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let index = self.next;
            self.next += 1;
            match self.labels.plate_for_frame(index) {
                Some(plate_id) => {
                    return Some(self.source.read_frame(index).map(|pixels| LabelledFrame {
                        frame_index: index,
                        plate_id,
                        pixels,
                    }));
                }
                None => {
                    if let Err(e) = self.source.skip_frame(index) {
                        return Some(Err(e));
                    }
                }
            }
        }
        None
    }
}

/// 超出视频长度的标注帧号
pub fn missing_frames(labels: &LabelDocument, frame_count: u64) -> Vec<u64> {
    labels
        .frames()
        .range(frame_count..)
        .map(|(index, _)| *index)
        .collect()
}
