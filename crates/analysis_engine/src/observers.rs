use std::collections::BTreeMap;
use std::fmt;

use analysis_core::{JobOutcome, StreamInfoSnapshot};

use crate::Generation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    ProgressChanged,
    StreamInfoReady,
    Completed,
}

/// Notification delivered to observers on the supervising thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    ProgressChanged(u8),
    StreamInfoReady(StreamInfoSnapshot),
    Completed(JobOutcome),
}

impl AnalysisEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AnalysisEvent::ProgressChanged(_) => EventKind::ProgressChanged,
            AnalysisEvent::StreamInfoReady(_) => EventKind::StreamInfoReady,
            AnalysisEvent::Completed(_) => EventKind::Completed,
        }
    }
}

type Callback = Box<dyn FnMut(&AnalysisEvent)>;

/// Callbacks bound to exactly one parser handle.
///
/// The controller rebinds the set to each new handle and unbinds it before a
/// handle is released, so a callback never sees events of a superseded job.
#[derive(Default)]
pub struct ObserverSet {
    generation: Option<Generation>,
    callbacks: BTreeMap<EventKind, Callback>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `callback` to `kind`, replacing any previous callback for it.
    pub fn subscribe(&mut self, kind: EventKind, callback: impl FnMut(&AnalysisEvent) + 'static) {
        self.callbacks.insert(kind, Box::new(callback));
    }

    /// Handle the callbacks are bound to, if any.
    pub fn bound_generation(&self) -> Option<Generation> {
        self.generation
    }

    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub(crate) fn rebind(&mut self, generation: Generation) {
        self.callbacks.clear();
        self.generation = Some(generation);
    }

    pub(crate) fn unbind(&mut self) {
        self.callbacks.clear();
        self.generation = None;
    }

    /// Invokes the callback for the event's kind if the set is bound to `generation`.
    pub(crate) fn deliver(&mut self, generation: Generation, event: &AnalysisEvent) -> bool {
        if self.generation != Some(generation) {
            return false;
        }
        match self.callbacks.get_mut(&event.kind()) {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("generation", &self.generation)
            .field("kinds", &self.callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Subscribes the host's callbacks each time the controller starts a job.
pub trait ObserverBinder {
    fn bind(&mut self, generation: Generation, observers: &mut ObserverSet);
}

impl<F> ObserverBinder for F
where
    F: FnMut(Generation, &mut ObserverSet),
{
    fn bind(&mut self, generation: Generation, observers: &mut ObserverSet) {
        self(generation, observers)
    }
}
