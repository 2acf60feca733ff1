pub mod ndjson_file;
pub mod raw;
pub mod sample;

pub use ndjson_file::NdjsonFileSource;
pub use raw::{RawDataset, RawEslPeriod, RawSdatDocument};
pub use sample::sample_dataset;
