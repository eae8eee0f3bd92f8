use thiserror::Error;

/// Rejected channel or ladder configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block size must be greater than zero")]
    ZeroBlockSize,
    #[error("total count must be greater than zero")]
    ZeroTotalCount,
    #[error("requested output count must be greater than zero")]
    ZeroOutputCount,
    #[error("estimated total sample count must be greater than zero")]
    NoSamples,
    #[error("ladder needs at least one level and one logic kind")]
    EmptyLadder,
    #[error("block size overflows at level {0}")]
    LevelOverflow(usize),
}

/// Malformed display window.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RangeError {
    #[error("location {0} is outside [0, 1)")]
    Location(f64),
    #[error("length {0} is outside (0, 1]")]
    Length(f64),
    #[error("location {location} + length {length} exceeds 1")]
    Overrun { location: f64, length: f64 },
}

/// Failure reported by a [`crate::SampleSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("samples were already delivered once")]
    Exhausted,
}

/// Errors surfaced by [`crate::AnalysisEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio format unknown; call prepare first")]
    NotPrepared,
    #[error("asset duration unknown; cannot size the ladder")]
    UnknownDuration,
    #[error("invalid read request: {0}")]
    InvalidRequest(#[from] ConfigError),
    #[error("sample source failed: {0}")]
    Source(#[from] SourceError),
    #[error("sample source is not available to the worker")]
    SourceUnavailable,
    #[error("the analysis pass failed; a new engine is required")]
    PassFailed,
}
