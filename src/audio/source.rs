use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

use crate::error::SourceError;

/// Stream parameters probed once before reading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub bits_per_sample: Option<u32>,
    /// Frames per channel, when the container reports it.
    pub frames: Option<u64>,
}

impl AudioFormat {
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.frames, self.sample_rate) {
            (Some(frames), rate) if rate > 0 => Some(frames as f64 / rate as f64),
            _ => None,
        }
    }

    /// Samples per channel over the whole asset (`duration * sample_rate`),
    /// taken from the frame count to avoid float round-trips.
    pub fn estimated_total_samples(&self) -> Option<u64> {
        self.frames.filter(|_| self.sample_rate > 0)
    }
}

/// Callback receiving interleaved sample blocks. Returning
/// `ControlFlow::Break` asks the source to stop delivering.
pub type BlockHandler<'a> = dyn FnMut(&[f32]) -> ControlFlow<()> + 'a;

/// Producer of decoded PCM.
pub trait SampleSource: Send {
    fn read_format(&mut self) -> Result<AudioFormat, SourceError>;

    /// Deliver successive interleaved blocks until exhausted or until the
    /// handler breaks. Stopping on request is not an error.
    fn read_samples(&mut self, on_block: &mut BlockHandler<'_>) -> Result<(), SourceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_format(&mut self) -> Result<AudioFormat, SourceError> {
        (**self).read_format()
    }

    fn read_samples(&mut self, on_block: &mut BlockHandler<'_>) -> Result<(), SourceError> {
        (**self).read_samples(on_block)
    }
}

/// How an interleaved frame becomes the single sample the ladder sees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downmix {
    /// Use the first channel only.
    #[default]
    First,
    /// Average all channels.
    Mono,
}

impl Downmix {
    /// Collapse interleaved `block` into one sample per frame, appended to `out`.
    pub fn apply(self, block: &[f32], channels: usize, out: &mut Vec<f32>) {
        let channels = channels.max(1);
        match self {
            Downmix::First => out.extend(block.iter().step_by(channels).copied()),
            Downmix::Mono => out.extend(
                block
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
            ),
        }
    }
}

impl std::str::FromStr for Downmix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Downmix::First),
            "mono" => Ok(Downmix::Mono),
            other => Err(format!("unknown downmix mode: {}", other)),
        }
    }
}

/// In-memory source delivering a fixed buffer in blocks.
#[derive(Clone, Debug)]
pub struct MemorySource {
    format: AudioFormat,
    samples: Vec<f32>,
    frames_per_block: usize,
    delivered: bool,
}

impl MemorySource {
    /// `samples` are interleaved; the format's frame count is derived from them.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = (samples.len() / channels) as u64;
        Self {
            format: AudioFormat {
                sample_rate,
                channels,
                bits_per_sample: Some(32),
                frames: Some(frames),
            },
            samples,
            frames_per_block: 4096,
            delivered: false,
        }
    }

    pub fn with_frames_per_block(mut self, frames: usize) -> Self {
        self.frames_per_block = frames.max(1);
        self
    }
}

impl SampleSource for MemorySource {
    fn read_format(&mut self) -> Result<AudioFormat, SourceError> {
        Ok(self.format)
    }

    fn read_samples(&mut self, on_block: &mut BlockHandler<'_>) -> Result<(), SourceError> {
        if self.delivered {
            return Err(SourceError::Exhausted);
        }
        self.delivered = true;
        let block_len = self.frames_per_block * self.format.channels.max(1);
        for block in self.samples.chunks(block_len) {
            if on_block(block).is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_total_samples_from_duration() {
        let format = AudioFormat {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: Some(16),
            frames: Some(88_200),
        };
        assert_eq!(format.duration_seconds(), Some(2.0));
        assert_eq!(format.estimated_total_samples(), Some(88_200));

        let unknown = AudioFormat {
            frames: None,
            ..format
        };
        assert_eq!(unknown.estimated_total_samples(), None);
    }

    #[test]
    fn downmix_modes() {
        let block = [1.0, 3.0, -2.0, 4.0];
        let mut first = Vec::new();
        Downmix::First.apply(&block, 2, &mut first);
        assert_eq!(first, vec![1.0, -2.0]);

        let mut mono = Vec::new();
        Downmix::Mono.apply(&block, 2, &mut mono);
        assert_eq!(mono, vec![2.0, 1.0]);
    }

    #[test]
    fn memory_source_delivers_once_in_blocks() {
        let mut source = MemorySource::new((0..10).map(|i| i as f32).collect(), 10, 1)
            .with_frames_per_block(4);
        let mut sizes = Vec::new();
        source
            .read_samples(&mut |block| {
                sizes.push(block.len());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(matches!(
            source.read_samples(&mut |_| ControlFlow::Continue(())),
            Err(SourceError::Exhausted)
        ));
    }

    #[test]
    fn memory_source_honours_break() {
        let mut source = MemorySource::new(vec![0.0; 100], 10, 1).with_frames_per_block(10);
        let mut blocks = 0;
        source
            .read_samples(&mut |_| {
                blocks += 1;
                if blocks == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(blocks, 3);
    }
}
