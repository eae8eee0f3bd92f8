use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The reduction rules a channel can apply to a block of samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicKind {
    /// Largest absolute amplitude in the block.
    #[serde(alias = "max-abs", alias = "peak")]
    Max,
    /// Arithmetic mean of the block.
    #[serde(alias = "avg", alias = "mean")]
    Average,
}

impl LogicKind {
    pub const ALL: [LogicKind; 2] = [LogicKind::Max, LogicKind::Average];

    /// Stable identifier used in channel names and config files.
    pub fn name(self) -> &'static str {
        match self {
            LogicKind::Max => "max",
            LogicKind::Average => "average",
        }
    }
}

impl fmt::Display for LogicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogicKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" | "max-abs" | "peak" => Ok(LogicKind::Max),
            "average" | "avg" | "mean" => Ok(LogicKind::Average),
            other => Err(format!("unknown logic kind: {}", other)),
        }
    }
}

/// Incremental per-block accumulator for one [`LogicKind`].
#[derive(Clone, Debug, PartialEq)]
pub enum AggregationLogic {
    MaxAbsolute { peak: f32 },
    // f64 sum keeps deep levels (very long blocks) exact enough
    Average { sum: f64, count: u64 },
}

impl AggregationLogic {
    pub fn new(kind: LogicKind) -> Self {
        match kind {
            LogicKind::Max => AggregationLogic::MaxAbsolute { peak: 0.0 },
            LogicKind::Average => AggregationLogic::Average { sum: 0.0, count: 0 },
        }
    }

    pub fn kind(&self) -> LogicKind {
        match self {
            AggregationLogic::MaxAbsolute { .. } => LogicKind::Max,
            AggregationLogic::Average { .. } => LogicKind::Average,
        }
    }

    /// Clear accumulated state for a new block.
    ///
    /// The max accumulator restarts at `0.0`, the smallest value of the
    /// absolute-amplitude domain.
    pub fn reset(&mut self) {
        match self {
            AggregationLogic::MaxAbsolute { peak } => *peak = 0.0,
            AggregationLogic::Average { sum, count } => {
                *sum = 0.0;
                *count = 0;
            }
        }
    }

    /// Fold one sample into the current block.
    #[inline]
    pub fn accept(&mut self, sample: f32) {
        match self {
            AggregationLogic::MaxAbsolute { peak } => *peak = peak.max(sample.abs()),
            AggregationLogic::Average { sum, count } => {
                *sum += sample as f64;
                *count += 1;
            }
        }
    }

    /// Reduced value of the samples accepted since the last [`reset`](Self::reset).
    pub fn current_value(&self) -> f32 {
        match self {
            AggregationLogic::MaxAbsolute { peak } => *peak,
            AggregationLogic::Average { sum, count } => (*sum / (*count).max(1) as f64) as f32,
        }
    }
}
