//! 分类问题与类别表

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DatasetError;

pub const ID_CLASSES: [&str; 9] = ["0", "1", "2", "3", "4", "5", "6", "7", "8"];

pub const LETTER_CLASSES: [&str; 26] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R",
    "S", "T", "U", "V", "W", "X", "Y", "Z",
];

pub const DIGIT_CLASSES: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// 字符问题，按车牌文本中的位置排列
pub const PLATE_PROBLEMS: [Problem; 4] = [
    Problem::Letter1,
    Problem::Letter2,
    Problem::Number1,
    Problem::Number2,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    Ids,
    #[serde(rename = "letter_1")]
    Letter1,
    #[serde(rename = "letter_2")]
    Letter2,
    #[serde(rename = "number_1")]
    Number1,
    #[serde(rename = "number_2")]
    Number2,
}

impl Problem {
    pub const ALL: [Problem; 5] = [
        Problem::Ids,
        Problem::Letter1,
        Problem::Letter2,
        Problem::Number1,
        Problem::Number2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ids => "ids",
            Self::Letter1 => "letter_1",
            Self::Letter2 => "letter_2",
            Self::Number1 => "number_1",
            Self::Number2 => "number_2",
        }
    }

    /// 该问题的固定类别表，顺序即 one-hot 下标
    pub fn classes(self) -> &'static [&'static str] {
        match self {
            Self::Ids => &ID_CLASSES,
            Self::Letter1 | Self::Letter2 => &LETTER_CLASSES,
            Self::Number1 | Self::Number2 => &DIGIT_CLASSES,
        }
    }

    pub fn class_index(self, label: &str) -> Option<usize> {
        self.classes().iter().position(|c| *c == label)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Problem {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Problem::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DatasetError::InvalidConfig(format!("unknown problem: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            other => Err(DatasetError::InvalidConfig(format!(
                "unknown split: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_round_trip_names() {
        for problem in Problem::ALL {
            assert_eq!(problem.as_str().parse::<Problem>().unwrap(), problem);
        }
        assert!("letter_3".parse::<Problem>().is_err());
    }

    #[test]
    fn test_class_alphabets() {
        assert_eq!(Problem::Ids.classes().len(), 9);
        assert_eq!(Problem::Letter2.classes().len(), 26);
        assert_eq!(Problem::Number1.classes().len(), 10);
        assert_eq!(Problem::Letter1.class_index("C"), Some(2));
        assert_eq!(Problem::Number2.class_index("A"), None);
    }

    #[test]
    fn test_plate_problem_order() {
        let names: Vec<_> = PLATE_PROBLEMS.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, ["letter_1", "letter_2", "number_1", "number_2"]);
    }

    #[test]
    fn test_problem_serde_names() {
        let json = serde_json::to_string(&Problem::Number1).unwrap();
        assert_eq!(json, "\"number_1\"");
        let split: Split = serde_json::from_str("\"test\"").unwrap();
        assert_eq!(split, Split::Test);
    }
}
