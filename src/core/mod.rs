pub mod classes;
pub mod config;
pub mod corpus;
pub mod decompose;
pub mod error;
pub mod labels;
pub mod onehot;
pub mod pipeline;
pub mod split;
pub mod video;

pub use classes::{Problem, Split, PLATE_PROBLEMS};
pub use config::BuildConfig;
pub use error::DatasetError;
pub use labels::{LabelDocument, PlateId, PlateText};
pub use split::SplitAssigner;
