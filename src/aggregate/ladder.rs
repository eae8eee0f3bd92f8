use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use super::channel::Channel;
use super::logic::LogicKind;
use crate::error::ConfigError;

// Below this many channel-sample deliveries a block is fanned out serially.
const PARALLEL_FEED_THRESHOLD: usize = 1 << 15;

/// Block size and output count of one resolution level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelLayout {
    pub block_size: usize,
    pub total_count: usize,
}

/// One channel per (level, logic kind), all fed from the same sample stream.
///
/// Level `i` reduces blocks of `block_size(0) * 2^i` samples. Channels are
/// stored level-major so a level's channels are contiguous and ordered like
/// [`kinds`](Self::kinds).
#[derive(Clone, Debug)]
pub struct ResolutionLadder {
    kinds: Vec<LogicKind>,
    layouts: Vec<LevelLayout>,
    channels: Vec<Channel>,
}

impl ResolutionLadder {
    pub fn configure(
        kinds: &[LogicKind],
        level_count: usize,
        requested_output_count: usize,
        estimated_total_samples: u64,
        identifier: &str,
    ) -> Result<Self, ConfigError> {
        if kinds.is_empty() || level_count == 0 {
            return Err(ConfigError::EmptyLadder);
        }
        if requested_output_count == 0 {
            return Err(ConfigError::ZeroOutputCount);
        }
        if estimated_total_samples == 0 {
            return Err(ConfigError::NoSamples);
        }

        let base_block = estimated_total_samples.div_ceil(requested_output_count as u64);
        let mut layouts = Vec::with_capacity(level_count);
        for level in 0..level_count {
            let block_size = u32::try_from(level)
                .ok()
                .and_then(|shift| 1u64.checked_shl(shift))
                .and_then(|factor| base_block.checked_mul(factor))
                .and_then(|block| usize::try_from(block).ok())
                .ok_or(ConfigError::LevelOverflow(level))?;
            let total_count = usize::try_from(estimated_total_samples.div_ceil(block_size as u64))
                .map_err(|_| ConfigError::LevelOverflow(level))?;
            debug!(
                "level {}: block_size={} total_count={}",
                level, block_size, total_count
            );
            layouts.push(LevelLayout {
                block_size,
                total_count,
            });
        }

        let mut channels = Vec::with_capacity(level_count * kinds.len());
        for layout in &layouts {
            for &kind in kinds {
                let name = format!("{}.{}", identifier, kind.name());
                channels.push(Channel::new(
                    kind,
                    name,
                    layout.block_size,
                    layout.total_count,
                )?);
            }
        }

        Ok(Self {
            kinds: kinds.to_vec(),
            layouts,
            channels,
        })
    }

    /// Deliver one sample to every channel.
    #[inline]
    pub fn feed(&mut self, sample: f32) {
        for channel in &mut self.channels {
            channel.handle_value(sample);
        }
    }

    /// Deliver a run of samples to every channel, in order per channel.
    pub fn feed_block(&mut self, samples: &[f32]) {
        if samples.len() * self.channels.len() < PARALLEL_FEED_THRESHOLD {
            for &sample in samples {
                self.feed(sample);
            }
            return;
        }
        self.channels.par_iter_mut().for_each(|channel| {
            for &sample in samples {
                channel.handle_value(sample);
            }
        });
    }

    pub fn finalize_all(&mut self) {
        for channel in &mut self.channels {
            channel.finalize();
        }
    }

    /// True once every channel has reached its output capacity.
    pub fn is_saturated(&self) -> bool {
        self.channels.iter().all(Channel::is_full)
    }

    pub fn kinds(&self) -> &[LogicKind] {
        &self.kinds
    }

    pub fn level_count(&self) -> usize {
        self.layouts.len()
    }

    pub fn layout(&self, level: usize) -> Option<LevelLayout> {
        self.layouts.get(level).copied()
    }

    pub fn layouts(&self) -> &[LevelLayout] {
        &self.layouts
    }

    /// Channels of one level, ordered like [`kinds`](Self::kinds).
    pub fn level(&self, level: usize) -> &[Channel] {
        if level >= self.layouts.len() {
            return &[];
        }
        let width = self.kinds.len();
        let start = level * width;
        self.channels.get(start..start + width).unwrap_or(&[])
    }

    pub fn channel(&self, level: usize, kind_index: usize) -> Option<&Channel> {
        self.level(level).get(kind_index)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}
