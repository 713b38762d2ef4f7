pub mod loader;
pub mod writer;

pub use loader::{list_all_files, sample_size, CorpusLoader, LoadedDataset};
pub use writer::{CorpusLayout, CorpusWriter, WriteOutcome};
