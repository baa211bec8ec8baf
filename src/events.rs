//! Lifecycle and progress events emitted by the pipeline stages.

use crate::error::ItemError;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

/// The stage an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Extract,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => f.write_str("fetch"),
            Stage::Extract => f.write_str("extract"),
        }
    }
}

/// Something that happened inside a stage.
///
/// For a given item, `Error` (if any) always precedes `ItemFinished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Stage-level status message.
    Started { message: String },
    /// Work on one item began.
    ItemStarted { name: String, index: usize },
    /// Fetch: bytes received out of a known total. Extract: archives done out
    /// of the archive count.
    Progress { received: u64, total: u64 },
    /// Work on the current item ended, whatever the outcome.
    ItemFinished,
    /// A per-item failure or warning.
    Error(ItemError),
    /// Terminal event, emitted exactly once per stage run.
    Finished {
        destination: PathBuf,
        paths: Vec<PathBuf>,
    },
}

/// A [`PipelineEvent`] tagged with its originating stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub stage: Stage,
    pub event: PipelineEvent,
}

/// Receives events synchronously, in emission order.
///
/// `emit` runs inline on the stage's task: anything it does (including
/// requesting cancellation) happens before the stage moves on.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StageEvent);
}

impl EventSink for UnboundedSender<StageEvent> {
    fn emit(&self, event: StageEvent) {
        // A closed receiver only means nobody is listening anymore.
        let _ = self.send(event);
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StageEvent) {}
}

/// Emitter bound to one stage.
#[derive(Clone, Copy)]
pub(crate) struct Emitter<'a> {
    stage: Stage,
    sink: &'a dyn EventSink,
}

impl<'a> Emitter<'a> {
    pub fn new(stage: Stage, sink: &'a dyn EventSink) -> Self {
        Self { stage, sink }
    }

    pub fn emit(&self, event: PipelineEvent) {
        self.sink.emit(StageEvent {
            stage: self.stage,
            event,
        });
    }
}
