use log::{debug, warn};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::source::{AudioFormat, BlockHandler, SampleSource};
use crate::error::SourceError;

struct OpenStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: AudioFormat,
}

/// Streams decoded PCM from an audio file through symphonia.
pub struct SymphoniaSource {
    path: PathBuf,
    stream: Option<OpenStream>,
    delivered: bool,
}

impl SymphoniaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream: None,
            delivered: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<OpenStream, SourceError> {
        let file = std::fs::File::open(&self.path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = self.path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|err| SourceError::Probe(err.to_string()))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SourceError::Probe("no audio tracks found".to_string()))?;
        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| SourceError::Probe("unknown sample rate".to_string()))?;
        let format = AudioFormat {
            sample_rate,
            channels: params.channels.map_or(1, |c| c.count()),
            bits_per_sample: params.bits_per_sample,
            frames: params.n_frames,
        };
        let track_id = track.id;
        if format.frames.is_none() {
            let container = self
                .path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown");
            warn!(
                "{}: {} container reports no frame count; the file cannot be analyzed",
                self.path.display(),
                container
            );
        }

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|err| SourceError::Probe(err.to_string()))?;

        debug!("opened {}: {:?}", self.path.display(), format);
        Ok(OpenStream {
            reader,
            decoder,
            track_id,
            format,
        })
    }
}

impl SampleSource for SymphoniaSource {
    fn read_format(&mut self) -> Result<AudioFormat, SourceError> {
        if let Some(stream) = &self.stream {
            return Ok(stream.format);
        }
        let stream = self.open()?;
        let format = stream.format;
        self.stream = Some(stream);
        Ok(format)
    }

    fn read_samples(&mut self, on_block: &mut BlockHandler<'_>) -> Result<(), SourceError> {
        if self.delivered {
            return Err(SourceError::Exhausted);
        }
        self.delivered = true;
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.open()?,
        };

        loop {
            let packet = match stream.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(Error::ResetRequired) => {
                    return Err(SourceError::Decode(
                        "decoder reset required mid-stream".to_string(),
                    ));
                }
                Err(err) => return Err(SourceError::Decode(err.to_string())),
            };

            if packet.track_id() != stream.track_id {
                continue;
            }

            let decoded = match stream.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::DecodeError(err)) => {
                    warn!("skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => return Err(SourceError::Decode(err.to_string())),
            };

            let spec = *decoded.spec();
            let mut buffer = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
            buffer.copy_interleaved_ref(decoded);

            if on_block(buffer.samples()).is_break() {
                debug!("sample delivery stopped by consumer");
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) {
        let data_len = (samples.len() * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    #[test]
    fn reads_format_and_samples_from_wav() {
        let path = std::env::temp_dir().join(format!("waveladder-{}.wav", std::process::id()));
        let samples: Vec<i16> = (0..800)
            .map(|i| if i % 2 == 0 { 16_384 } else { -16_384 })
            .collect();
        write_wav(&path, &samples, 8_000);

        let mut source = SymphoniaSource::new(&path);
        let format = source.read_format().unwrap();
        assert_eq!(format.sample_rate, 8_000);
        assert_eq!(format.channels, 1);
        assert_eq!(format.bits_per_sample, Some(16));
        assert_eq!(format.estimated_total_samples(), Some(800));

        let mut decoded = Vec::new();
        source
            .read_samples(&mut |block| {
                decoded.extend_from_slice(block);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(decoded.len(), 800);
        assert!(decoded.iter().all(|s| (s.abs() - 0.5).abs() < 1e-6));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_fails_probe() {
        let mut source = SymphoniaSource::new("/nonexistent/waveladder.wav");
        assert!(matches!(source.read_format(), Err(SourceError::Io(_))));
    }
}
