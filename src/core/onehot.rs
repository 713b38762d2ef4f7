//! One-hot 编解码

use super::classes::ID_CLASSES;
use super::error::DatasetError;

pub fn encode(index: usize, cardinality: usize) -> Result<Vec<f32>, DatasetError> {
    if index >= cardinality {
        return Err(DatasetError::InvalidConfig(format!(
            "class index {} out of range for {} classes",
            index, cardinality
        )));
    }
    let mut hot = vec![0.0; cardinality];
    hot[index] = 1.0;
    Ok(hot)
}

/// 唯一非零项的下标
pub fn decode(vector: &[f32]) -> Result<usize, DatasetError> {
    let mut found = None;
    let mut nonzero = 0;
    for (i, v) in vector.iter().enumerate() {
        if *v != 0.0 {
            nonzero += 1;
            found.get_or_insert(i);
        }
    }
    match (nonzero, found) {
        (1, Some(index)) => Ok(index),
        _ => Err(DatasetError::AmbiguousLabel { nonzero }),
    }
}

/// 0 => 无车牌，n => 第 n 个车牌
pub fn encode_plate_id(plate_id: u8) -> Result<Vec<f32>, DatasetError> {
    encode(plate_id as usize, ID_CLASSES.len())
}

pub fn decode_plate_id(vector: &[f32]) -> Result<u8, DatasetError> {
    if vector.len() != ID_CLASSES.len() {
        return Err(DatasetError::InvalidConfig(format!(
            "plate id vector has {} entries, expected {}",
            vector.len(),
            ID_CLASSES.len()
        )));
    }
    Ok(decode(vector)? as u8)
}
