use super::kernels::KernelKind;
use super::state::{ChainState, RunStatistics};
use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::mark::MarkRecord;
use serde::Serialize;
use tracing::{debug, info};

/// What happened to the proposal drawn in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IterationOutcome {
    Accepted,
    Rejected,
    NoProposal,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationEvent {
    pub iteration: u64,
    pub kernel: Option<KernelKind>,
    pub outcome: IterationOutcome,
    /// Energy change of the proposal; `None` when nothing was evaluated.
    pub delta: Option<f64>,
    pub total: f64,
    pub temperature: f64,
    pub mark_count: usize,
}

/// Observer of the optimization loop.
///
/// The optimizer calls `on_iteration` after each iteration has been fully applied, so
/// `configuration` is always the chain's current state.
pub trait FeedbackReceiver {
    fn on_start(&mut self, _configuration: &MarksConfiguration, _energy: f64) {}

    fn on_iteration(&mut self, event: &IterationEvent, configuration: &MarksConfiguration);

    fn on_finish(&mut self, _state: &ChainState, _statistics: &RunStatistics) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullFeedback;

impl FeedbackReceiver for NullFeedback {
    fn on_iteration(&mut self, _event: &IterationEvent, _configuration: &MarksConfiguration) {}
}

/// Logs a progress line every `every` iterations.
#[derive(Debug, Clone, Copy)]
pub struct TracingFeedback {
    every: u64,
}

impl TracingFeedback {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl FeedbackReceiver for TracingFeedback {
    fn on_start(&mut self, configuration: &MarksConfiguration, energy: f64) {
        info!(marks = configuration.len(), energy, "Optimization started");
    }

    fn on_iteration(&mut self, event: &IterationEvent, configuration: &MarksConfiguration) {
        if event.iteration % self.every == 0 {
            info!(
                iteration = event.iteration,
                energy = event.total,
                temperature = event.temperature,
                marks = configuration.len(),
                "Optimization progress"
            );
        }
    }

    fn on_finish(&mut self, state: &ChainState, statistics: &RunStatistics) {
        info!(
            state = ?state,
            iterations = statistics.iterations,
            accepted = statistics.accepted,
            errors = statistics.errors,
            "Optimization finished"
        );
    }
}

/// One row of the energy trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: u64,
    pub kernel: Option<KernelKind>,
    pub outcome: IterationOutcome,
    pub delta: Option<f64>,
    pub energy: f64,
    pub temperature: f64,
    pub marks: usize,
}

impl From<&IterationEvent> for IterationRecord {
    fn from(event: &IterationEvent) -> Self {
        Self {
            iteration: event.iteration,
            kernel: event.kernel,
            outcome: event.outcome,
            delta: event.delta,
            energy: event.total,
            temperature: event.temperature,
            marks: event.mark_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSnapshot {
    pub iteration: u64,
    pub energy: f64,
    pub marks: Vec<MarkRecord>,
}

/// Records the energy trace and, optionally, snapshots of the configuration.
///
/// Snapshots are taken at accepted iterations that fall on a multiple of
/// `snapshot_every`, plus one of the initial state.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    records: Vec<IterationRecord>,
    snapshots: Vec<ConfigurationSnapshot>,
    snapshot_every: Option<u64>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(every: u64) -> Self {
        Self {
            snapshot_every: Some(every.max(1)),
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn snapshots(&self) -> &[ConfigurationSnapshot] {
        &self.snapshots
    }

    pub fn into_parts(self) -> (Vec<IterationRecord>, Vec<ConfigurationSnapshot>) {
        (self.records, self.snapshots)
    }
}

impl FeedbackReceiver for TraceRecorder {
    fn on_start(&mut self, configuration: &MarksConfiguration, energy: f64) {
        if self.snapshot_every.is_some() {
            self.snapshots.push(ConfigurationSnapshot {
                iteration: 0,
                energy,
                marks: configuration.records(),
            });
        }
    }

    fn on_iteration(&mut self, event: &IterationEvent, configuration: &MarksConfiguration) {
        self.records.push(IterationRecord::from(event));
        if let Some(every) = self.snapshot_every {
            if event.outcome == IterationOutcome::Accepted && event.iteration % every == 0 {
                debug!(iteration = event.iteration, "Recording configuration snapshot");
                self.snapshots.push(ConfigurationSnapshot {
                    iteration: event.iteration,
                    energy: event.total,
                    marks: configuration.records(),
                });
            }
        }
    }
}

pub type IterationCallback<'a> = Box<dyn FnMut(&IterationEvent) + Send + 'a>;

/// Forwards every iteration event to a closure.
pub struct CallbackFeedback<'a> {
    callback: IterationCallback<'a>,
}

impl<'a> CallbackFeedback<'a> {
    pub fn new(callback: IterationCallback<'a>) -> Self {
        Self { callback }
    }
}

impl FeedbackReceiver for CallbackFeedback<'_> {
    #[inline]
    fn on_iteration(&mut self, event: &IterationEvent, _configuration: &MarksConfiguration) {
        (self.callback)(event);
    }
}

/// Fans events out to several receivers, in order.
#[derive(Default)]
pub struct FeedbackChain<'a> {
    receivers: Vec<&'a mut dyn FeedbackReceiver>,
}

impl<'a> FeedbackChain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, receiver: &'a mut dyn FeedbackReceiver) -> Self {
        self.receivers.push(receiver);
        self
    }
}

impl FeedbackReceiver for FeedbackChain<'_> {
    fn on_start(&mut self, configuration: &MarksConfiguration, energy: f64) {
        for receiver in self.receivers.iter_mut() {
            receiver.on_start(configuration, energy);
        }
    }

    fn on_iteration(&mut self, event: &IterationEvent, configuration: &MarksConfiguration) {
        for receiver in self.receivers.iter_mut() {
            receiver.on_iteration(event, configuration);
        }
    }

    fn on_finish(&mut self, state: &ChainState, statistics: &RunStatistics) {
        for receiver in self.receivers.iter_mut() {
            receiver.on_finish(state, statistics);
        }
    }
}
