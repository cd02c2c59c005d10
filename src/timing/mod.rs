//! The statistical timing-oracle engine: payload templating, probing,
//! Welch's-t-test significance, adaptive delay calibration, binary-search
//! character extraction, and bounded-concurrency scheduling.

pub mod calibrator;
pub mod extractor;
pub mod oracle;
pub mod payload;
pub mod probe;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod traditional;

pub use calibrator::{CalibrationOutcome, Calibrator};
pub use extractor::{
    extract_database_name, extract_table_names, BinarySearchExtractor, CharacterExtractor,
};
pub use oracle::Oracle;
pub use payload::PayloadTemplate;
pub use scheduler::ParallelScheduler;
pub use session::{ExtractionSession, ExtractionTarget, TraceStep};
pub use stats::TimingAnalyzer;
pub use traditional::TraditionalExtractor;
