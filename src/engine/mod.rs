//! Streaming analysis engine.
//!
//! One worker queue owns the sample source and the resolution ladder while a
//! probe or a pass runs; every observable callback is delivered on a separate
//! notification queue. Tasks hold only a weak handle to the engine, so once
//! the last [`AnalysisEngine`] is dropped pending callbacks become no-ops and
//! a running pass asks its source to stop.

pub mod queue;

use log::{debug, error, info, warn};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::aggregate::channel::ChannelSnapshot;
use crate::aggregate::ladder::{LevelLayout, ResolutionLadder};
use crate::aggregate::logic::LogicKind;
use crate::aggregate::scale::{level_for_range, DataRange};
use crate::audio::source::{AudioFormat, Downmix, SampleSource};
use crate::error::{ConfigError, EngineError};

use queue::{lock, QueueToken, TaskQueue};

/// Progress is tracked in fixed units out of this denominator.
pub const PROGRESS_UNITS: u32 = 10_000;

pub const DEFAULT_LEVEL_COUNT: usize = 10;
pub const DEFAULT_IDENTIFIER: &str = "reader";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Reading,
    Finished,
    /// Terminal: the pass hit a source error. Channels stay incomplete.
    Failed,
}

/// What a [`AnalysisEngine::read`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A streaming pass was scheduled on the worker.
    Started,
    /// An existing ladder is now exposed at a different level.
    LevelChanged(usize),
    /// Already showing the requested level.
    Unchanged,
}

#[derive(Clone, Debug)]
pub struct AnalysisSettings {
    /// Logic kinds in channel-index order.
    pub logics: Vec<LogicKind>,
    pub level_count: usize,
    pub downmix: Downmix,
    /// Prefix of every channel identifier.
    pub identifier: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            logics: LogicKind::ALL.to_vec(),
            level_count: DEFAULT_LEVEL_COUNT,
            downmix: Downmix::default(),
            identifier: DEFAULT_IDENTIFIER.to_string(),
        }
    }
}

impl AnalysisSettings {
    fn normalized(mut self) -> Self {
        let mut seen = Vec::with_capacity(self.logics.len());
        self.logics.retain(|kind| {
            if seen.contains(kind) {
                false
            } else {
                seen.push(*kind);
                true
            }
        });
        self
    }
}

/// Receives engine notifications on the notification queue.
pub trait EngineObserver: Send + Sync {
    fn progress(&self, _fraction: f64) {}
    fn channels_changed(&self, _engine: &AnalysisEngine) {}
    fn read_failed(&self, _error: &EngineError) {}
}

struct Status {
    state: EngineState,
    selected_level: usize,
}

struct Shared {
    settings: AnalysisSettings,
    worker: Arc<TaskQueue>,
    notifier: Arc<TaskQueue>,
    observer: Option<Arc<dyn EngineObserver>>,
    source: Mutex<Option<Box<dyn SampleSource>>>,
    format: Mutex<Option<AudioFormat>>,
    status: Mutex<Status>,
    ladder: RwLock<Option<ResolutionLadder>>,
    progress: AtomicU32,
}

/// Cheap, cloneable handle to one analysis of one asset.
#[derive(Clone)]
pub struct AnalysisEngine {
    shared: Arc<Shared>,
}

pub struct EngineBuilder {
    source: Box<dyn SampleSource>,
    settings: AnalysisSettings,
    observer: Option<Arc<dyn EngineObserver>>,
    worker: Option<Arc<TaskQueue>>,
    notifier: Option<Arc<TaskQueue>>,
}

impl EngineBuilder {
    pub fn settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn worker(mut self, queue: Arc<TaskQueue>) -> Self {
        self.worker = Some(queue);
        self
    }

    pub fn notifier(mut self, queue: Arc<TaskQueue>) -> Self {
        self.notifier = Some(queue);
        self
    }

    /// Spawns threaded queues for any context not supplied.
    pub fn build(self) -> std::io::Result<AnalysisEngine> {
        let worker = match self.worker {
            Some(queue) => queue,
            None => Arc::new(TaskQueue::spawn("waveladder-worker")?),
        };
        let notifier = match self.notifier {
            Some(queue) => queue,
            None => Arc::new(TaskQueue::spawn("waveladder-notify")?),
        };
        Ok(AnalysisEngine {
            shared: Arc::new(Shared {
                settings: self.settings.normalized(),
                worker,
                notifier,
                observer: self.observer,
                source: Mutex::new(Some(self.source)),
                format: Mutex::new(None),
                status: Mutex::new(Status {
                    state: EngineState::Idle,
                    selected_level: 0,
                }),
                ladder: RwLock::new(None),
                progress: AtomicU32::new(0),
            }),
        })
    }
}

impl AnalysisEngine {
    pub fn builder<S: SampleSource + 'static>(source: S) -> EngineBuilder {
        EngineBuilder {
            source: Box::new(source),
            settings: AnalysisSettings::default(),
            observer: None,
            worker: None,
            notifier: None,
        }
    }

    /// Probe the source's format on the worker. `completion` receives `true`
    /// once the format is stored; on failure the engine stays idle and
    /// `prepare` may be retried.
    pub fn prepare<F>(&self, completion: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let weak = Arc::downgrade(&self.shared);
        self.shared.worker.dispatch(None, move |_| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let ok = shared.probe();
            shared.notify(move |_| completion(ok));
        });
    }

    /// Start, or re-target, the analysis for a display window.
    ///
    /// On an idle engine this sizes the ladder from `output_count` and the
    /// asset's estimated sample count and schedules the single streaming
    /// pass; `completion` runs on the notification queue when it finishes.
    /// Afterwards it only moves the selected level, firing
    /// [`EngineObserver::channels_changed`] when it changes, and drops
    /// `completion`.
    pub fn read<F>(
        &self,
        output_count: usize,
        range: DataRange,
        completion: F,
    ) -> Result<ReadOutcome, EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        if output_count == 0 {
            return Err(ConfigError::ZeroOutputCount.into());
        }
        let level = level_for_range(&range, self.shared.settings.level_count);
        self.shared.read(None, output_count, level, completion)
    }

    /// Probe, then immediately start a full-view pass on the worker.
    /// `completion` receives `false` if the probe or ladder setup failed, or
    /// if a pass is already running. On a finished engine it receives `true`.
    pub fn prepare_and_read<F>(&self, output_count: usize, completion: F) -> Result<(), EngineError>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        if output_count == 0 {
            return Err(ConfigError::ZeroOutputCount.into());
        }
        let weak = Arc::downgrade(&self.shared);
        self.shared.worker.dispatch(None, move |token| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if !shared.probe() {
                shared.notify(move |_| completion(false));
                return;
            }
            let slot = Arc::new(Mutex::new(Some(completion)));
            let on_done = slot.clone();
            let done = move || settle(&on_done, true);
            let ok = match shared.read(Some(token), output_count, 0, done) {
                Ok(ReadOutcome::Started) => return,
                Ok(_) => {
                    let state = lock(&shared.status).state;
                    if state != EngineState::Finished {
                        warn!("analysis pass already running, not waiting for it");
                    }
                    state == EngineState::Finished
                }
                Err(err) => {
                    error!("could not start analysis pass: {}", err);
                    false
                }
            };
            shared.notify(move |_| settle(&slot, ok));
        });
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        lock(&self.shared.status).state
    }

    pub fn selected_level(&self) -> usize {
        lock(&self.shared.status).selected_level
    }

    /// Progress of the pass in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.progress_units() as f64 / PROGRESS_UNITS as f64
    }

    /// Progress of the pass out of [`PROGRESS_UNITS`].
    pub fn progress_units(&self) -> u32 {
        self.shared.progress.load(Ordering::Acquire)
    }

    pub fn format(&self) -> Option<AudioFormat> {
        *lock(&self.shared.format)
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.shared.settings
    }

    /// Number of series exposed per level, one per logic kind.
    pub fn channels_count(&self) -> usize {
        self.shared.settings.logics.len()
    }

    /// Logic kind served by `channel_at(index)`.
    pub fn logic_at(&self, index: usize) -> Option<LogicKind> {
        self.shared.settings.logics.get(index).copied()
    }

    /// Series of logic `index` at the selected level. `None` before the
    /// first read. The snapshot is marked complete only after a finished pass.
    pub fn channel_at(&self, index: usize) -> Option<ChannelSnapshot> {
        let level = self.selected_level();
        self.channel_at_level(level, index)
    }

    pub fn channel_at_level(&self, level: usize, index: usize) -> Option<ChannelSnapshot> {
        read_guard(&self.shared.ladder)
            .as_ref()
            .and_then(|ladder| ladder.channel(level, index))
            .map(|channel| channel.snapshot())
    }

    pub fn level_layouts(&self) -> Vec<LevelLayout> {
        read_guard(&self.shared.ladder)
            .as_ref()
            .map(|ladder| ladder.layouts().to_vec())
            .unwrap_or_default()
    }
}

impl Shared {
    /// The format is read from the source at most once successfully; later
    /// probes report the stored format.
    fn probe(&self) -> bool {
        if let Some(format) = *lock(&self.format) {
            debug!("format already probed: {:?}", format);
            return true;
        }
        let mut slot = lock(&self.source);
        let Some(source) = slot.as_mut() else {
            error!("format probe requested while the source is in use");
            return false;
        };
        match source.read_format() {
            Ok(format) => {
                info!(
                    "format: {} Hz, {} channel(s), {:?} bits, {:?} frames",
                    format.sample_rate, format.channels, format.bits_per_sample, format.frames
                );
                if format.estimated_total_samples().is_none() {
                    warn!("source reports no duration; reads will fail");
                }
                *lock(&self.format) = Some(format);
                true
            }
            Err(err) => {
                error!("format probe failed: {}", err);
                false
            }
        }
    }

    fn read<F>(
        self: &Arc<Self>,
        token: Option<&QueueToken>,
        output_count: usize,
        level: usize,
        completion: F,
    ) -> Result<ReadOutcome, EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut status = lock(&self.status);
        match status.state {
            EngineState::Idle => {
                let format = (*lock(&self.format)).ok_or(EngineError::NotPrepared)?;
                let estimated = format
                    .estimated_total_samples()
                    .filter(|&n| n > 0)
                    .ok_or(EngineError::UnknownDuration)?;
                let ladder = ResolutionLadder::configure(
                    &self.settings.logics,
                    self.settings.level_count,
                    output_count,
                    estimated,
                    &self.settings.identifier,
                )?;
                *write_guard(&self.ladder) = Some(ladder);
                self.progress.store(0, Ordering::Release);
                status.state = EngineState::Reading;
                status.selected_level = level;
                drop(status);

                info!(
                    "starting pass: {} estimated samples, {} outputs, {} levels",
                    estimated, output_count, self.settings.level_count
                );
                let weak = Arc::downgrade(self);
                self.worker.dispatch(token, move |_| {
                    run_pass(weak, format, estimated, completion)
                });
                Ok(ReadOutcome::Started)
            }
            EngineState::Failed => Err(EngineError::PassFailed),
            EngineState::Reading | EngineState::Finished => {
                if status.selected_level == level {
                    return Ok(ReadOutcome::Unchanged);
                }
                debug!("level {} -> {}", status.selected_level, level);
                status.selected_level = level;
                drop(status);
                self.notify(|shared| {
                    if let Some(observer) = &shared.observer {
                        let engine = AnalysisEngine {
                            shared: shared.clone(),
                        };
                        observer.channels_changed(&engine);
                    }
                });
                Ok(ReadOutcome::LevelChanged(level))
            }
        }
    }

    /// Run `f` on the notification queue if the engine is still alive then.
    fn notify<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&Arc<Shared>) + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        self.notifier.dispatch(None, move |_| {
            if let Some(shared) = weak.upgrade() {
                f(&shared);
            }
        });
    }

    fn finish(self: &Arc<Self>, result: Result<(), EngineError>) -> bool {
        match result {
            Ok(()) => {
                if let Some(ladder) = write_guard(&self.ladder).as_mut() {
                    ladder.finalize_all();
                }
                self.progress.store(PROGRESS_UNITS, Ordering::Release);
                lock(&self.status).state = EngineState::Finished;
                info!("analysis pass finished");
                self.notify(|shared| {
                    if let Some(observer) = &shared.observer {
                        observer.progress(1.0);
                    }
                });
                true
            }
            Err(err) => {
                error!("analysis pass failed: {}", err);
                lock(&self.status).state = EngineState::Failed;
                self.notify(move |shared| {
                    if let Some(observer) = &shared.observer {
                        observer.read_failed(&err);
                    }
                });
                false
            }
        }
    }
}

fn run_pass<F>(weak: Weak<Shared>, format: AudioFormat, estimated: u64, completion: F)
where
    F: FnOnce() + Send + 'static,
{
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let Some(mut source) = lock(&shared.source).take() else {
        shared.finish(Err(EngineError::SourceUnavailable));
        return;
    };
    let downmix = shared.settings.downmix;
    drop(shared);

    let mut frames = Vec::new();
    let mut consumed: u64 = 0;
    let mut reported: u32 = 0;
    let result = source.read_samples(&mut |block| {
        let Some(shared) = weak.upgrade() else {
            return ControlFlow::Break(());
        };
        frames.clear();
        downmix.apply(block, format.channels, &mut frames);
        consumed += frames.len() as u64;

        let saturated = match write_guard(&shared.ladder).as_mut() {
            Some(ladder) => {
                ladder.feed_block(&frames);
                ladder.is_saturated()
            }
            None => true,
        };

        let units = progress_units(consumed, estimated);
        if units > reported {
            reported = units;
            shared.progress.store(units, Ordering::Release);
            shared.notify(move |shared| {
                if let Some(observer) = &shared.observer {
                    observer.progress(units as f64 / PROGRESS_UNITS as f64);
                }
            });
        }

        if saturated {
            debug!("every channel is full after {} samples", consumed);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    let Some(shared) = weak.upgrade() else {
        return;
    };
    *lock(&shared.source) = Some(source);
    if shared.finish(result.map_err(EngineError::from)) {
        shared.notify(move |_| completion());
    }
}

fn progress_units(consumed: u64, estimated: u64) -> u32 {
    let units = consumed.saturating_mul(PROGRESS_UNITS as u64) / estimated.max(1);
    units.min(PROGRESS_UNITS as u64) as u32
}

/// Run a shared boolean completion once; later calls are no-ops.
fn settle<F: FnOnce(bool)>(slot: &Mutex<Option<F>>, ok: bool) {
    if let Some(completion) = lock(slot).take() {
        completion(ok);
    }
}

fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
