use serde::Serialize;

use super::logic::{AggregationLogic, LogicKind};
use super::scale::DataRange;
use crate::error::ConfigError;

/// Accumulator emitting one reduced value per `block_size` samples, up to
/// `total_count` values.
#[derive(Clone, Debug)]
pub struct Channel {
    identifier: String,
    logic: AggregationLogic,
    block_size: usize,
    total_count: usize,
    consumed_in_block: usize,
    outputs: Vec<f32>,
    finalized: bool,
}

impl Channel {
    pub fn new(
        kind: LogicKind,
        identifier: impl Into<String>,
        block_size: usize,
        total_count: usize,
    ) -> Result<Self, ConfigError> {
        let mut channel = Self {
            identifier: identifier.into(),
            logic: AggregationLogic::new(kind),
            block_size: 1,
            total_count: 1,
            consumed_in_block: 0,
            outputs: Vec::new(),
            finalized: false,
        };
        channel.configure(block_size, total_count)?;
        Ok(channel)
    }

    /// Reset all counters and discard prior outputs.
    pub fn configure(&mut self, block_size: usize, total_count: usize) -> Result<(), ConfigError> {
        if block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if total_count == 0 {
            return Err(ConfigError::ZeroTotalCount);
        }
        self.block_size = block_size;
        self.total_count = total_count;
        self.consumed_in_block = 0;
        self.outputs = Vec::with_capacity(total_count);
        self.finalized = false;
        self.logic.reset();
        Ok(())
    }

    /// Feed one sample. Input past capacity or after [`finalize`](Self::finalize)
    /// is dropped.
    #[inline]
    pub fn handle_value(&mut self, sample: f32) {
        if self.finalized || self.is_full() {
            return;
        }
        self.logic.accept(sample);
        self.consumed_in_block += 1;
        if self.consumed_in_block == self.block_size {
            self.outputs.push(self.logic.current_value());
            self.logic.reset();
            self.consumed_in_block = 0;
        }
    }

    /// Seal the channel at end of stream, emitting a trailing partial block.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        if !self.is_full() && self.consumed_in_block > 0 {
            self.outputs.push(self.logic.current_value());
            self.logic.reset();
            self.consumed_in_block = 0;
        }
        self.finalized = true;
    }

    pub fn is_full(&self) -> bool {
        self.outputs.len() == self.total_count
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn kind(&self) -> LogicKind {
        self.logic.kind()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn outputs(&self) -> &[f32] {
        &self.outputs
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            identifier: self.identifier.clone(),
            kind: self.kind(),
            block_size: self.block_size,
            total_count: self.total_count,
            values: self.outputs.clone(),
            complete: self.finalized,
        }
    }
}

/// Owned copy of a channel's outputs handed to renderers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub identifier: String,
    pub kind: LogicKind,
    pub block_size: usize,
    pub total_count: usize,
    pub values: Vec<f32>,
    /// False while the pass is running, and forever if the pass failed.
    pub complete: bool,
}

impl ChannelSnapshot {
    /// Values covering `range`, measured against the channel's full span.
    pub fn window(&self, range: DataRange) -> &[f32] {
        let span = self.total_count as f64;
        let start = ((range.location() * span).floor() as usize).min(self.values.len());
        let end = ((range.end() * span).ceil() as usize).clamp(start, self.values.len());
        &self.values[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(channel: &mut Channel, samples: impl IntoIterator<Item = f32>) {
        for s in samples {
            channel.handle_value(s);
        }
    }

    #[test]
    fn full_input_yields_total_count_outputs() {
        for kind in LogicKind::ALL {
            let mut channel = Channel::new(kind, "t", 5, 7).unwrap();
            feed(&mut channel, (0..35).map(|i| i as f32));
            assert_eq!(channel.outputs().len(), 7);
            channel.finalize();
            assert_eq!(channel.outputs().len(), 7);
        }
    }

    #[test]
    fn emits_per_block_reductions() {
        let mut max = Channel::new(LogicKind::Max, "m", 4, 2).unwrap();
        let mut avg = Channel::new(LogicKind::Average, "a", 4, 2).unwrap();
        let samples = [1.0, -7.0, 3.0, 2.0, 2.0, 4.0, 6.0, 8.0];
        feed(&mut max, samples);
        feed(&mut avg, samples);
        assert_eq!(max.outputs(), &[7.0, 8.0]);
        assert_eq!(avg.outputs(), &[-0.25, 5.0]);
    }

    #[test]
    fn partial_final_block_is_emitted_on_finalize() {
        let mut channel = Channel::new(LogicKind::Max, "m", 4, 3).unwrap();
        feed(&mut channel, [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, -9.0]);
        assert_eq!(channel.outputs().len(), 2);
        channel.finalize();
        assert_eq!(channel.outputs(), &[1.0, 2.0, 9.0]);
    }

    #[test]
    fn finalize_without_partial_block_adds_nothing() {
        let mut channel = Channel::new(LogicKind::Average, "a", 2, 4).unwrap();
        feed(&mut channel, [1.0, 3.0]);
        channel.finalize();
        assert_eq!(channel.outputs(), &[2.0]);
    }

    #[test]
    fn overflow_input_is_ignored() {
        let mut channel = Channel::new(LogicKind::Max, "m", 2, 2).unwrap();
        feed(&mut channel, [1.0, 1.0, 2.0, 2.0]);
        assert!(channel.is_full());
        feed(&mut channel, [50.0, 60.0, 70.0]);
        channel.finalize();
        assert_eq!(channel.outputs(), &[1.0, 2.0]);
    }

    #[test]
    fn input_after_finalize_is_ignored() {
        let mut channel = Channel::new(LogicKind::Max, "m", 2, 4).unwrap();
        feed(&mut channel, [1.0, 1.0]);
        channel.finalize();
        feed(&mut channel, [5.0, 5.0]);
        assert_eq!(channel.outputs(), &[1.0]);
        assert!(channel.is_finalized());
    }

    #[test]
    fn rejects_zero_sizes() {
        assert_eq!(
            Channel::new(LogicKind::Max, "m", 0, 1).unwrap_err(),
            ConfigError::ZeroBlockSize
        );
        assert_eq!(
            Channel::new(LogicKind::Max, "m", 1, 0).unwrap_err(),
            ConfigError::ZeroTotalCount
        );
    }

    #[test]
    fn configure_discards_previous_outputs() {
        let mut channel = Channel::new(LogicKind::Max, "m", 1, 4).unwrap();
        feed(&mut channel, [1.0, 2.0]);
        channel.finalize();
        channel.configure(2, 2).unwrap();
        assert!(channel.outputs().is_empty());
        assert!(!channel.is_finalized());
        feed(&mut channel, [3.0, 4.0]);
        assert_eq!(channel.outputs(), &[4.0]);
    }

    #[test]
    fn snapshot_window_covers_range() {
        let mut channel = Channel::new(LogicKind::Max, "m", 1, 8).unwrap();
        feed(&mut channel, (0..8).map(|i| i as f32));
        channel.finalize();
        let snapshot = channel.snapshot();
        assert!(snapshot.complete);
        let half = DataRange::new(0.5, 0.5).unwrap();
        assert_eq!(snapshot.window(half), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(snapshot.window(DataRange::default()).len(), 8);
    }
}
