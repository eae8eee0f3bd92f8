use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use waveladder::{Downmix, LogicKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "waveladder", about = "Multi-resolution waveform summaries of audio files")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub input: PathBuf,

    /// Outputs per series at the whole-file level
    #[arg(short = 'n', long, default_value_t = 1024)]
    pub count: usize,

    /// Number of resolution levels
    #[arg(long, default_value_t = 10)]
    pub levels: usize,

    /// Aggregation logics (comma-separated: max, average)
    #[arg(long, value_delimiter = ',')]
    pub logic: Vec<LogicKind>,

    /// Start of the displayed window, as a fraction of the duration
    #[arg(long, default_value_t = 0.0)]
    pub location: f64,

    /// Length of the displayed window, as a fraction of the duration
    #[arg(long, default_value_t = 1.0)]
    pub length: f64,

    /// How multichannel frames are reduced (first, mono)
    #[arg(long)]
    pub downmix: Option<Downmix>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Config file (defaults to waveladder.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_and_logics() {
        let cli = Cli::try_parse_from([
            "waveladder",
            "song.flac",
            "--logic",
            "max,avg",
            "--location",
            "0.25",
            "--length",
            "0.5",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.logic, vec![LogicKind::Max, LogicKind::Average]);
        assert_eq!(cli.location, 0.25);
        assert_eq!(cli.length, 0.5);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert_eq!(cli.count, 1024);
        assert_eq!(cli.downmix, None);
    }

    #[test]
    fn rejects_unknown_logic() {
        assert!(Cli::try_parse_from(["waveladder", "a.wav", "--logic", "median"]).is_err());
    }
}
