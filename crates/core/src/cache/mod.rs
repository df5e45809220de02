//! Session-wide memo of analysis results keyed by audio resource.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use tracing::{debug, warn};

use crate::{AnalysisResult, BeatSyncError, Result};

type InFlight = Shared<BoxFuture<'static, Result<Arc<AnalysisResult>>>>;

#[derive(Default)]
struct CacheState {
    results: HashMap<String, Arc<AnalysisResult>>,
    in_flight: HashMap<String, InFlight>,
    /// Bumped by `clear` so computations started before it do not write
    /// into the emptied map.
    generation: u64,
}

/// Write-once cache of [`AnalysisResult`]s.
///
/// Concurrent requests for the same unseen key share a single computation.
/// The computation runs as its own task, so dropping any (or every) waiter
/// neither cancels it nor prevents the result from being stored. Failures are
/// handed to every waiter and leave nothing behind, so a later call retries.
///
/// Nothing is evicted; [`AnalysisCache::clear`] is the only way to release
/// memory.
#[derive(Clone, Default)]
pub struct AnalysisCache {
    state: Arc<Mutex<CacheState>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored result for `key`, joins a running computation for
    /// it, or starts `compute` on the runtime. `compute` is only invoked in
    /// the last case.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<Arc<AnalysisResult>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<AnalysisResult>> + Send + 'static,
    {
        let pending = {
            let mut state = self.lock()?;
            if let Some(hit) = state.results.get(key) {
                debug!(key, "analysis cache hit");
                return Ok(Arc::clone(hit));
            }

            match state.in_flight.get(key) {
                Some(running) => {
                    debug!(key, "joining in-flight analysis");
                    running.clone()
                }
                None => {
                    debug!(key, "analysis cache miss");
                    let pending = self.spawn(key.to_owned(), state.generation, compute());
                    state.in_flight.insert(key.to_owned(), pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    fn spawn<Fut>(&self, key: String, generation: u64, computation: Fut) -> InFlight
    where
        Fut: Future<Output = Result<AnalysisResult>> + Send + 'static,
    {
        let mut entry = InFlightEntry {
            state: Arc::clone(&self.state),
            key,
            generation,
            settled: false,
        };
        let task = tokio::spawn(async move {
            let outcome = computation.await.map(Arc::new);
            entry.settle(&outcome)?;
            outcome
        });

        async move {
            task.await
                .map_err(|err| BeatSyncError::msg(format!("analysis task aborted: {err}")))?
        }
        .boxed()
        .shared()
    }

    /// Stored result for `key`, without starting anything.
    pub fn get(&self, key: &str) -> Option<Arc<AnalysisResult>> {
        self.lock().ok()?.results.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.lock()
            .map(|state| state.in_flight.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.results.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored result. Computations still running finish for
    /// their current waiters but are not stored.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.results.clear();
        state.in_flight.clear();
        state.generation += 1;
        debug!("analysis cache cleared");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| BeatSyncError::msg("analysis cache has been poisoned"))
    }
}

/// Registration of one running computation. Dropping it unsettled, which
/// happens when the computation panics or its task is aborted, still
/// unregisters the key so the next call starts over.
struct InFlightEntry {
    state: Arc<Mutex<CacheState>>,
    key: String,
    generation: u64,
    settled: bool,
}

impl InFlightEntry {
    fn settle(&mut self, outcome: &Result<Arc<AnalysisResult>>) -> Result<()> {
        self.settled = true;
        let mut state = self
            .state
            .lock()
            .map_err(|_| BeatSyncError::msg("analysis cache has been poisoned"))?;
        if state.generation != self.generation {
            return Ok(());
        }

        state.in_flight.remove(&self.key);
        match outcome {
            Ok(result) => {
                state
                    .results
                    .entry(self.key.clone())
                    .or_insert_with(|| Arc::clone(result));
            }
            Err(err) => warn!(key = %self.key, error = %err, "analysis failed, nothing cached"),
        }
        Ok(())
    }
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            if state.generation == self.generation {
                state.in_flight.remove(&self.key);
                warn!(key = %self.key, "analysis task ended without a result, nothing cached");
            }
        }
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("AnalysisCache");
        if let Ok(state) = self.state.lock() {
            out.field("results", &state.results.len())
                .field("in_flight", &state.in_flight.len())
                .field("generation", &state.generation);
        }
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use tokio::sync::oneshot;

    use super::*;
    use crate::Beat;

    fn sample_result() -> AnalysisResult {
        AnalysisResult::new(
            vec![Beat {
                timestamp: 1.0,
                intensity: 0.8,
                bass_intensity: 0.3,
            }],
            3.0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn second_call_reuses_stored_result() {
        let cache = AnalysisCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = || {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(sample_result())
            }
        };

        let first = cache.get_or_compute("song.wav", compute()).await.unwrap();
        let second = cache.get_or_compute("song.wav", compute()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_coalesce() {
        let cache = AnalysisCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let first = {
            let calls = Arc::clone(&calls);
            cache.get_or_compute("song.wav", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = gate.await;
                Ok(sample_result())
            })
        };
        let second = {
            let calls = Arc::clone(&calls);
            cache.get_or_compute("song.wav", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(AnalysisResult::empty())
            })
        };

        let (first, second, _) = tokio::join!(first, second, async {
            tokio::task::yield_now().await;
            let _ = release.send(());
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = AnalysisCache::new();

        let err = cache
            .get_or_compute("broken.wav", || async {
                Err(BeatSyncError::Decode("bad header".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BeatSyncError::Decode(_)));
        assert!(!cache.contains("broken.wav"));
        assert!(!cache.is_pending("broken.wav"));

        let retried = cache
            .get_or_compute("broken.wav", || async { Ok(sample_result()) })
            .await
            .unwrap();
        assert_eq!(retried.beats().len(), 1);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter() {
        let cache = AnalysisCache::new();
        let (release, gate) = oneshot::channel::<()>();

        let first = cache.get_or_compute("offline.wav", move || async move {
            let _ = gate.await;
            Err(BeatSyncError::SourceUnavailable("timed out".into()))
        });
        let second = cache.get_or_compute("offline.wav", || async { Ok(sample_result()) });

        let (first, second, _) = tokio::join!(first, second, async {
            tokio::task::yield_now().await;
            let _ = release.send(());
        });

        assert!(matches!(first, Err(BeatSyncError::SourceUnavailable(_))));
        assert_eq!(first.unwrap_err(), second.unwrap_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_does_not_disturb_the_others() {
        let cache = AnalysisCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(sample_result())
            }
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            cache.get_or_compute("song.wav", slow(Arc::clone(&calls))),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(cache.is_pending("song.wav"));

        let survivor = cache
            .get_or_compute("song.wav", slow(Arc::clone(&calls)))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(survivor.duration(), 3.0);
        assert!(cache.contains("song.wav"));
    }

    #[tokio::test]
    async fn clear_discards_results_from_earlier_generation() {
        let cache = AnalysisCache::new();
        cache
            .get_or_compute("a.wav", || async { Ok(sample_result()) })
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        let (release, gate) = oneshot::channel::<()>();
        let pending = cache.get_or_compute("b.wav", move || async move {
            let _ = gate.await;
            Ok(sample_result())
        });
        let (outcome, _) = tokio::join!(pending, async {
            tokio::task::yield_now().await;
            cache.clear().unwrap();
            let _ = release.send(());
        });

        assert!(outcome.is_ok());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn panicking_computation_can_be_retried() {
        let cache = AnalysisCache::new();

        let err = cache
            .get_or_compute("crash.wav", || async { panic!("decoder blew up") })
            .await
            .unwrap_err();
        assert!(matches!(err, BeatSyncError::Message(_)));
        assert!(!cache.is_pending("crash.wav"));
        assert!(!cache.contains("crash.wav"));

        let retried = cache
            .get_or_compute("crash.wav", || async { Ok(sample_result()) })
            .await
            .unwrap();
        assert_eq!(retried.beats().len(), 1);
        assert!(cache.contains("crash.wav"));
    }
}
