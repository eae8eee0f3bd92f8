mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use cli::{Cli, OutputFormat};
use waveladder::{
    AnalysisEngine, AnalysisSettings, AudioFormat, DataRange, EngineError, EngineObserver,
    LevelLayout, LogicKind, SymphoniaSource,
};

enum RunEvent {
    Prepared(bool),
    Finished,
    Failed(String),
}

/// Forwards engine notifications to the main thread and drives the progress bar.
struct CliObserver {
    bar: ProgressBar,
    events: Mutex<Sender<RunEvent>>,
}

impl EngineObserver for CliObserver {
    fn progress(&self, fraction: f64) {
        self.bar
            .set_position((fraction * waveladder::PROGRESS_UNITS as f64) as u64);
    }

    fn channels_changed(&self, engine: &AnalysisEngine) {
        log::debug!("Showing level {}", engine.selected_level());
    }

    fn read_failed(&self, error: &EngineError) {
        let _ = self
            .events
            .lock()
            .map(|tx| tx.send(RunEvent::Failed(error.to_string())));
    }
}

#[derive(Serialize)]
struct Series<'a> {
    identifier: &'a str,
    kind: LogicKind,
    block_size: usize,
    complete: bool,
    values: &'a [f32],
}

#[derive(Serialize)]
struct Report<'a> {
    input: String,
    format: AudioFormat,
    range: DataRange,
    level: usize,
    levels: Vec<LevelLayout>,
    series: Vec<Series<'a>>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let mut config_format = None;

    // Merge: config values apply only when the CLI flag is at its default
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(cfg) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            if cli.count == config::default_output_count() {
                cli.count = cfg.analysis.output_count;
            }
            if cli.levels == config::default_levels() {
                cli.levels = cfg.analysis.levels;
            }
            if cli.logic.is_empty() {
                cli.logic = cfg.analysis.logics;
            }
            if cli.downmix.is_none() {
                cli.downmix = Some(cfg.analysis.downmix);
            }
            config_format = match cfg.output.format.as_str() {
                "json" => Some(OutputFormat::Json),
                "text" => Some(OutputFormat::Text),
                other => {
                    log::warn!("Unknown output format in config: {}", other);
                    None
                }
            };
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    let output_format = cli.format.or(config_format).unwrap_or(OutputFormat::Text);

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }
    let range = DataRange::new(cli.location, cli.length).context("Invalid display window")?;

    let settings = AnalysisSettings {
        logics: if cli.logic.is_empty() { config::default_logics() } else { cli.logic.clone() },
        level_count: cli.levels,
        downmix: cli.downmix.unwrap_or_default(),
        ..AnalysisSettings::default()
    };

    let bar = if cli.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(waveladder::PROGRESS_UNITS as u64)
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent}% ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let (tx, rx) = mpsc::channel();
    let observer = Arc::new(CliObserver {
        bar: bar.clone(),
        events: Mutex::new(tx.clone()),
    });

    log::info!("Input: {}", cli.input.display());
    let engine = AnalysisEngine::builder(SymphoniaSource::new(&cli.input))
        .settings(settings)
        .observer(observer)
        .build()
        .context("Failed to start analysis threads")?;

    let prepared = tx.clone();
    engine.prepare(move |ok| {
        let _ = prepared.send(RunEvent::Prepared(ok));
    });
    match rx.recv().context("Engine stopped before probing")? {
        RunEvent::Prepared(true) => {}
        _ => anyhow::bail!("Could not read audio format of {}", cli.input.display()),
    }
    let audio_format = engine.format().context("Format missing after probe")?;

    let finished = tx.clone();
    engine.read(cli.count, DataRange::full(), move || {
        let _ = finished.send(RunEvent::Finished);
    })?;
    drop(tx);
    match rx.recv().context("Engine stopped during analysis")? {
        RunEvent::Finished => bar.finish_and_clear(),
        RunEvent::Failed(err) => {
            bar.abandon();
            anyhow::bail!("Analysis failed: {}", err);
        }
        RunEvent::Prepared(_) => anyhow::bail!("Unexpected engine event"),
    }

    // Second read only moves the selected level
    engine.read(cli.count, range, || {})?;
    let level = engine.selected_level();
    log::info!("Window {:.3}+{:.3} -> level {}", range.location(), range.length(), level);

    let snapshots: Vec<_> = (0..engine.channels_count())
        .filter_map(|index| engine.channel_at(index))
        .collect();
    let report = Report {
        input: cli.input.display().to_string(),
        format: audio_format,
        range,
        level,
        levels: engine.level_layouts(),
        series: snapshots
            .iter()
            .map(|snapshot| Series {
                identifier: &snapshot.identifier,
                kind: snapshot.kind,
                block_size: snapshot.block_size,
                complete: snapshot.complete,
                values: snapshot.window(range),
            })
            .collect(),
    };

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &Report<'_>) {
    println!(
        "{}: {} Hz, {} channel(s), level {} of {}",
        report.input,
        report.format.sample_rate,
        report.format.channels,
        report.level,
        report.levels.len()
    );
    for series in &report.series {
        println!(
            "{} (block {} samples, {} values)",
            series.identifier,
            series.block_size,
            series.values.len()
        );
        for row in series.values.chunks(8) {
            let line: Vec<String> = row.iter().map(|v| format!("{:>8.4}", v)).collect();
            println!("  {}", line.join(" "));
        }
    }
}
