//! Hot, multicast progress observables.
//!
//! A subscriber sees the current value, then every later change. Once the
//! observable has finished, a new subscriber receives the last value and
//! the terminal outcome, so late observers still learn how it ended.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::Stream;
use tokio::sync::broadcast;

use batchdl_core::BatchError;

use super::tree::ProgressSnapshot;

/// Buffered events per subscriber before it starts skipping.
const CHANNEL_CAPACITY: usize = 256;

/// Something an observer receives.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// New units.
    Progress(ProgressSnapshot),
    /// Terminal outcome; nothing follows.
    Finished(Result<(), BatchError>),
}

struct State {
    current: ProgressSnapshot,
    outcome: Option<Result<(), BatchError>>,
    tx: broadcast::Sender<ProgressEvent>,
}

/// Progress of one download or one batch.
///
/// Cheap to clone; clones observe the same value.
#[derive(Clone)]
pub struct ProgressObservable {
    state: Arc<Mutex<State>>,
}

impl std::fmt::Debug for ProgressObservable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ProgressObservable")
            .field("current", &state.current)
            .field("outcome", &state.outcome)
            .finish()
    }
}

impl ProgressObservable {
    pub(crate) fn new(initial: ProgressSnapshot) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(State {
                current: initial,
                outcome: None,
                tx,
            })),
        }
    }

    /// The latest snapshot.
    pub fn current(&self) -> ProgressSnapshot {
        self.lock().current
    }

    /// The latest fraction, `None` while the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        self.current().fraction()
    }

    /// The terminal outcome, once finished.
    pub fn outcome(&self) -> Option<Result<(), BatchError>> {
        self.lock().outcome.clone()
    }

    /// Whether a terminal outcome has been published.
    pub fn is_finished(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// Start observing.
    pub fn subscribe(&self) -> ProgressSubscription {
        let state = self.lock();
        let mut replay = VecDeque::with_capacity(2);
        replay.push_back(ProgressEvent::Progress(state.current));

        let rx = match &state.outcome {
            Some(outcome) => {
                replay.push_back(ProgressEvent::Finished(outcome.clone()));
                None
            }
            None => Some(state.tx.subscribe()),
        };

        ProgressSubscription { replay, rx }
    }

    /// Wait for the terminal outcome.
    ///
    /// Resolves to [`BatchError::Stopped`] if the observable can no longer
    /// finish.
    pub async fn wait(&self) -> Result<(), BatchError> {
        let mut subscription = self.subscribe();
        while let Some(event) = subscription.next().await {
            if let ProgressEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        Err(BatchError::Stopped)
    }

    /// Publish a new snapshot. Updates after the finish are dropped.
    ///
    /// Observers see fractions, so a snapshot whose fraction matches the
    /// current one is stored but not sent; an unknown total counts as zero.
    /// Returns whether anything was sent.
    pub(crate) fn publish(&self, snapshot: ProgressSnapshot) -> bool {
        let mut state = self.lock();
        if state.outcome.is_some() || state.current == snapshot {
            return false;
        }
        let unchanged = same_fraction(&state.current, &snapshot);
        state.current = snapshot;
        if unchanged {
            return false;
        }
        // No receivers is fine; late subscribers read `current`.
        let _ = state.tx.send(ProgressEvent::Progress(snapshot));
        true
    }

    /// Publish the terminal outcome. Only the first call has an effect.
    pub(crate) fn finish(&self, outcome: Result<(), BatchError>) -> bool {
        let mut state = self.lock();
        if state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(outcome.clone());
        let _ = state.tx.send(ProgressEvent::Finished(outcome));
        true
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_fraction(a: &ProgressSnapshot, b: &ProgressSnapshot) -> bool {
    let a = a.fraction().unwrap_or(0.0);
    let b = b.fraction().unwrap_or(0.0);
    (a - b).abs() < f64::EPSILON
}

/// One observer's view of a [`ProgressObservable`].
pub struct ProgressSubscription {
    replay: VecDeque<ProgressEvent>,
    rx: Option<broadcast::Receiver<ProgressEvent>>,
}

impl ProgressSubscription {
    /// Next event, or `None` after the terminal event.
    ///
    /// A slow subscriber skips intermediate values rather than blocking
    /// the publisher; the terminal event is never skipped.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }

        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if matches!(event, ProgressEvent::Finished(_)) {
                        self.rx = None;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::trace!(skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Adapt into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|event| (event, subscription))
        })
    }
}
