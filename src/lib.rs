//! Multi-resolution waveform aggregation.
//!
//! A single streaming pass over decoded audio fills a ladder of block-reduced
//! series (one per logic kind and power-of-two block size), so a waveform
//! view can change zoom level without touching the audio again.

pub mod aggregate;
pub mod audio;
pub mod engine;
pub mod error;

pub use aggregate::channel::{Channel, ChannelSnapshot};
pub use aggregate::ladder::{LevelLayout, ResolutionLadder};
pub use aggregate::logic::{AggregationLogic, LogicKind};
pub use aggregate::scale::{level_for_length, level_for_range, DataRange};
pub use audio::decode::SymphoniaSource;
pub use audio::source::{AudioFormat, BlockHandler, Downmix, MemorySource, SampleSource};
pub use engine::queue::{QueueToken, TaskQueue};
pub use engine::{
    AnalysisEngine, AnalysisSettings, EngineBuilder, EngineObserver, EngineState, ReadOutcome,
    PROGRESS_UNITS,
};
pub use error::{ConfigError, EngineError, RangeError, SourceError};
