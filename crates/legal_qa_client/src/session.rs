//! Query session controller: one coherent in-flight session between UI
//! submissions and the transport. Owns the active stream handle, the
//! synthetic progress timer, and the phase machine
//! `Idle -> Starting -> Streaming -> Completing -> Idle` (with `Failed`).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::client::{QueryClient, QueryError, StreamEvent};
use crate::messages::{QueryRequest, ResponseMetadata, Source};

/// Progress seeded on submit.
const PROGRESS_SEED: f64 = 10.0;
/// The synthetic timer never passes this on its own; only the terminal
/// event forces 100.
const PROGRESS_CEILING: f64 = 90.0;
/// Synthetic progress tick period.
const TICK_PERIOD: Duration = Duration::from_millis(300);
/// Cosmetic delay before leaving `Completing`, so a progress bar visibly
/// reaches full.
const RESET_DELAY: Duration = Duration::from_millis(500);

/// Session phase. `Failed` counts as inactive; the next submit or cancel
/// leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Streaming,
    Completing,
    Failed,
}

/// Read-only view of the session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub progress: f64,
    pub sources: Vec<Source>,
    pub metadata: Option<ResponseMetadata>,
}

impl SessionSnapshot {
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            Phase::Starting | Phase::Streaming | Phase::Completing
        )
    }
}

struct Inner {
    phase: Phase,
    progress: f64,
    sources: Vec<Source>,
    metadata: Option<ResponseMetadata>,
    stream: Option<crate::client::StreamHandle>,
    ticker: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
    /// Bumped on every submit/cancel; stale callbacks and timers check it
    /// and bail, so a replaced session can never touch current state.
    generation: u64,
}

impl Inner {
    /// Close the transport handle and stop the timers. The only mutation
    /// path for the active connection.
    fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(reset) = self.reset.take() {
            reset.abort();
        }
    }
}

/// Mediates between submissions and the transport; guarantees at most one
/// outstanding connection per controller instance.
pub struct SessionController {
    client: QueryClient,
    inner: Arc<Mutex<Inner>>,
}

impl SessionController {
    pub fn new(client: QueryClient) -> Self {
        Self {
            client,
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                progress: 0.0,
                sources: Vec::new(),
                metadata: None,
                stream: None,
                ticker: None,
                reset: None,
                generation: 0,
            })),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let Ok(inner) = self.inner.lock() else {
            return SessionSnapshot {
                phase: Phase::Failed,
                progress: 0.0,
                sources: Vec::new(),
                metadata: None,
            };
        };
        SessionSnapshot {
            phase: inner.phase,
            progress: inner.progress,
            sources: inner.sources.clone(),
            metadata: inner.metadata.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.snapshot().is_active()
    }

    /// Submit a query. A session already in flight is replaced: its
    /// connection is closed and its timers stopped before the new stream
    /// opens, so no two connections are ever live.
    ///
    /// `on_chunk` fires per partial-text event with (incremental,
    /// cumulative) text; `on_complete` fires once on the terminal event;
    /// `on_error` fires once if the session fails. After a failure nothing
    /// is retried; re-submission is up to the caller.
    ///
    /// Callbacks run with the session lock held and must not call back
    /// into the controller.
    pub async fn submit<C, D, E>(
        &self,
        request: QueryRequest,
        on_chunk: C,
        on_complete: D,
        on_error: E,
    ) where
        C: FnMut(&str, &str) + Send + 'static,
        D: FnOnce(&[Source], Option<&ResponseMetadata>) + Send + 'static,
        E: FnOnce(QueryError) + Send + 'static,
    {
        let generation = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            inner.teardown();
            inner.generation += 1;
            inner.phase = Phase::Starting;
            inner.progress = PROGRESS_SEED;
            inner.sources.clear();
            inner.metadata = None;
            inner.generation
        };

        let ticker = tokio::spawn(progress_ticker(self.inner.clone(), generation));
        {
            let Ok(mut inner) = self.inner.lock() else {
                ticker.abort();
                return;
            };
            if inner.generation != generation {
                ticker.abort();
                return;
            }
            inner.ticker = Some(ticker);
        }

        let connection = match self.client.open_stream(&request).await {
            Ok(connection) => connection,
            Err(err) => {
                self.fail(generation);
                on_error(err);
                return;
            }
        };

        let dispatch_inner = self.inner.clone();
        let mut on_chunk = on_chunk;
        let mut on_complete = Some(on_complete);
        let mut on_error = Some(on_error);
        // Callbacks run while the session lock is held: `cancel` bumps the
        // generation under the same lock, so once it returns no callback of
        // the cancelled session can still be in flight. Callbacks must not
        // call back into the controller.
        let handle = connection.dispatch(move |event| match event {
            StreamEvent::Chunk { delta, full } => {
                let Ok(mut inner) = dispatch_inner.lock() else {
                    return;
                };
                if inner.generation != generation {
                    return;
                }
                if inner.phase == Phase::Starting {
                    inner.phase = Phase::Streaming;
                }
                on_chunk(&delta, &full);
            }
            StreamEvent::Done { sources, metadata } => {
                let Ok(mut inner) = dispatch_inner.lock() else {
                    return;
                };
                if inner.generation != generation {
                    return;
                }
                inner.teardown();
                inner.phase = Phase::Completing;
                inner.progress = 100.0;
                inner.sources = sources.clone();
                inner.metadata = metadata.clone();
                inner.reset = Some(tokio::spawn(reset_after_delay(
                    dispatch_inner.clone(),
                    generation,
                )));
                if let Some(cb) = on_complete.take() {
                    cb(&sources, metadata.as_ref());
                }
            }
            StreamEvent::Failed(err) => {
                let Ok(mut inner) = dispatch_inner.lock() else {
                    return;
                };
                if inner.generation != generation {
                    return;
                }
                inner.teardown();
                inner.phase = Phase::Failed;
                inner.progress = 0.0;
                tracing::debug!(error = %err, "session failed");
                if let Some(cb) = on_error.take() {
                    cb(err);
                }
            }
        });

        let Ok(mut inner) = self.inner.lock() else {
            handle.close();
            return;
        };
        if inner.generation != generation
            || !matches!(inner.phase, Phase::Starting | Phase::Streaming)
        {
            // Replaced, or the stream already reached a terminal state
            // before we got here; either way the connection is done.
            handle.close();
            return;
        }
        inner.stream = Some(handle);
    }

    /// Tear the session down from any state, including `Idle`: closes any
    /// open handle, stops the timers, returns to `Idle` with progress 0.
    /// No callback fires afterwards.
    pub fn cancel(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.generation += 1;
        inner.teardown();
        inner.phase = Phase::Idle;
        inner.progress = 0.0;
    }

    fn fail(&self, generation: u64) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.generation != generation {
            return;
        }
        inner.teardown();
        inner.phase = Phase::Failed;
        inner.progress = 0.0;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One synthetic progress step. Large below 30, smaller as it rises, capped
/// so it never reaches 100 on its own.
fn next_progress(progress: f64) -> f64 {
    let step = if progress < 30.0 {
        5.0
    } else if progress < 60.0 {
        3.0
    } else if progress < 80.0 {
        1.0
    } else {
        0.5
    };
    (progress + step).min(PROGRESS_CEILING)
}

async fn progress_ticker(inner: Arc<Mutex<Inner>>, generation: u64) {
    let mut interval = tokio::time::interval(TICK_PERIOD);
    interval.tick().await; // first tick fires immediately
    loop {
        interval.tick().await;
        let Ok(mut guard) = inner.lock() else {
            return;
        };
        if guard.generation != generation {
            return;
        }
        if !matches!(guard.phase, Phase::Starting | Phase::Streaming) {
            return;
        }
        guard.progress = next_progress(guard.progress);
    }
}

async fn reset_after_delay(inner: Arc<Mutex<Inner>>, generation: u64) {
    tokio::time::sleep(RESET_DELAY).await;
    let Ok(mut guard) = inner.lock() else {
        return;
    };
    if guard.generation != generation || guard.phase != Phase::Completing {
        return;
    }
    guard.phase = Phase::Idle;
    guard.progress = 0.0;
}
