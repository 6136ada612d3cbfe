//! Background derivation for hover and search events.
//!
//! Requests replace each other: only the newest submitted input is ever
//! computed next, and a result that finishes after a newer submission is
//! dropped instead of being published. A derivation that fails is published
//! as [`DerivationState::Failed`] so waiters on its generation are released.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rift_core::{Derivation, DerivationInput, NeighborhoodEngine};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Request = Option<(u64, DerivationInput)>;

#[derive(Debug, Clone)]
pub struct DerivationOutcome {
    pub generation: u64,
    pub derivation: Arc<Derivation>,
}

/// Latest published state of the worker.
#[derive(Debug, Clone)]
pub enum DerivationState {
    Ready(DerivationOutcome),
    Failed { generation: u64 },
}

impl DerivationState {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Ready(outcome) => outcome.generation,
            Self::Failed { generation } => *generation,
        }
    }

    pub fn outcome(&self) -> Option<&DerivationOutcome> {
        match self {
            Self::Ready(outcome) => Some(outcome),
            Self::Failed { .. } => None,
        }
    }
}

pub struct DerivationWorker {
    requests: watch::Sender<Request>,
    results: watch::Receiver<Option<DerivationState>>,
    generation: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl DerivationWorker {
    /// Start the worker on the current tokio runtime. The engine, and with it
    /// the derivation cache, is owned by the worker from now on.
    pub fn spawn(engine: NeighborhoodEngine) -> Self {
        let (requests, request_rx) = watch::channel(None);
        let (result_tx, results) = watch::channel(None);
        let generation = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run(engine, request_rx, result_tx, Arc::clone(&generation)));
        Self {
            requests,
            results,
            generation,
            task,
        }
    }

    /// Queue an input, superseding any earlier one. Returns its generation.
    pub fn submit(&self, input: DerivationInput) -> u64 {
        let mut submitted = 0;
        self.requests.send_modify(|slot| {
            submitted = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *slot = Some((submitted, input));
        });
        submitted
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DerivationState>> {
        self.results.clone()
    }

    /// The most recent successful derivation, unless the latest one failed.
    pub fn latest(&self) -> Option<DerivationOutcome> {
        self.results.borrow().as_ref().and_then(DerivationState::outcome).cloned()
    }

    /// Wait until a state at least as new as `generation` is published.
    /// `None` if that derivation failed or the worker has stopped.
    pub async fn wait_for(&self, generation: u64) -> Option<DerivationOutcome> {
        let mut results = self.results.clone();
        let outcome = results
            .wait_for(|state| state.as_ref().is_some_and(|s| s.generation() >= generation))
            .await
            .ok()
            .and_then(|state| state.as_ref().and_then(DerivationState::outcome).cloned());
        outcome
    }

    /// Stop accepting requests and wait for the in-flight one to finish.
    pub async fn shutdown(self) {
        let Self { requests, task, .. } = self;
        drop(requests);
        if let Err(e) = task.await {
            warn!("Derivation worker ended abnormally: {}", e);
        }
    }
}

async fn run(
    mut engine: NeighborhoodEngine,
    mut requests: watch::Receiver<Request>,
    results: watch::Sender<Option<DerivationState>>,
    latest: Arc<AtomicU64>,
) {
    while requests.changed().await.is_ok() {
        let Some((generation, input)) = requests.borrow_and_update().clone() else {
            continue;
        };
        let capacity = engine.cache().capacity();
        let job = tokio::task::spawn_blocking(move || {
            let derivation = engine.derive(&input);
            (engine, derivation)
        });
        match job.await {
            Ok((returned, derivation)) => {
                engine = returned;
                if latest.load(Ordering::SeqCst) != generation {
                    debug!("Discarding stale derivation {}", generation);
                    continue;
                }
                results.send_replace(Some(DerivationState::Ready(DerivationOutcome { generation, derivation })));
            }
            Err(e) => {
                // The engine was lost with the task; start over with an empty cache.
                warn!("Derivation {} failed: {}", generation, e);
                engine = NeighborhoodEngine::with_capacity(capacity);
                if latest.load(Ordering::SeqCst) == generation {
                    results.send_replace(Some(DerivationState::Failed { generation }));
                }
            }
        }
    }
    debug!("Derivation worker stopped");
}
