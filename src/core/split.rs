//! 训练/测试集划分（带种子的加权随机）

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::classes::Split;
use super::error::DatasetError;

pub const DEFAULT_SEED: u64 = 1337;
pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;

/// 每次调用从自带种子的随机流抽取一次划分
///
/// 不按类别或来源视频分层，同一视频的样本可能同时进入训练集和测试集。
pub struct SplitAssigner {
    rng: StdRng,
    train_weight: f64,
    test_weight: f64,
    draws: u64,
}

impl SplitAssigner {
    pub fn new(seed: u64, train_weight: f64, test_weight: f64) -> Result<Self, DatasetError> {
        validate_weights(train_weight, test_weight)?;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            train_weight,
            test_weight,
            draws: 0,
        })
    }

    /// `ratio` 归训练集，其余归测试集
    pub fn from_ratio(seed: u64, ratio: f64) -> Result<Self, DatasetError> {
        Self::new(seed, ratio, 1.0 - ratio)
    }

    /// 单个来源视频的独立随机流，只由主种子决定，与处理顺序无关
    pub fn for_source(
        master_seed: u64,
        source_id: &str,
        train_weight: f64,
        test_weight: f64,
    ) -> Result<Self, DatasetError> {
        let seed = derive_seed(master_seed, source_id);
        debug!("split seed for {}: {:#018x}", source_id, seed);
        Self::new(seed, train_weight, test_weight)
    }

    pub fn assign(&mut self) -> Split {
        let (train, test) = (self.train_weight, self.test_weight);
        self.draw(train, test)
    }

    pub fn assign_split(&mut self, train_weight: f64, test_weight: f64) -> Result<Split, DatasetError> {
        validate_weights(train_weight, test_weight)?;
        Ok(self.draw(train_weight, test_weight))
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    fn draw(&mut self, train_weight: f64, test_weight: f64) -> Split {
        self.draws += 1;
        let point = self.rng.gen::<f64>() * (train_weight + test_weight);
        if point < train_weight {
            Split::Train
        } else {
            Split::Test
        }
    }
}

pub fn derive_seed(master_seed: u64, source_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(master_seed.to_le_bytes());
    hasher.update(source_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn validate_weights(train_weight: f64, test_weight: f64) -> Result<(), DatasetError> {
    let valid = |w: f64| w.is_finite() && w >= 0.0;
    if !valid(train_weight) || !valid(test_weight) || train_weight + test_weight <= 0.0 {
        return Err(DatasetError::InvalidConfig(format!(
            "split weights must be non-negative with a positive sum, got {}/{}",
            train_weight, test_weight
        )));
    }
    Ok(())
}
