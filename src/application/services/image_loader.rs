//! Per-slot image loading state machine.
//!
//! Each [`ImageLoader`] owns a background worker task. Commands from the host
//! and events from the in-flight fetch are both funneled into that worker, so
//! every state transition happens on one context and observers see a totally
//! ordered sequence. Fetch events carry the generation they were started with;
//! anything tagged with an older generation is dropped.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::domain::entities::{CachedImage, ImageKey, ImageSource, LoadState, LoadedImage};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ImageCachePort, ImageFetcherPort, ProgressSink};

use super::state_subscription::StateSubscription;

#[derive(Debug)]
enum LoaderCommand {
    Request(String),
    Cancel,
    Retry,
    Subscribe(mpsc::UnboundedSender<LoadState>),
}

#[derive(Debug)]
enum FetchEvent {
    Progress {
        generation: u64,
        fraction: f64,
    },
    Finished {
        generation: u64,
        key: ImageKey,
        result: Result<CachedImage, LoadError>,
    },
}

/// Loads one image at a time for a single consumer.
///
/// All operations are non-blocking: they enqueue a command for the loader's
/// worker and return immediately. The worker runs on the current Tokio
/// runtime; a loader created outside one starts in a `Transport` failure and
/// ignores every command. Dropping the loader cancels any in-flight fetch.
pub struct ImageLoader {
    commands: mpsc::UnboundedSender<LoaderCommand>,
    state: Arc<RwLock<LoadState>>,
}

impl ImageLoader {
    /// Creates a loader that reads and writes `cache` and downloads through
    /// `fetcher`.
    pub fn new(cache: Arc<dyn ImageCachePort>, fetcher: Arc<dyn ImageFetcherPort>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(LoadState::Idle));

        let worker = LoaderWorker {
            cache,
            fetcher,
            state: state.clone(),
            generation: 0,
            last_url: None,
            in_flight: None,
            subscribers: Vec::new(),
            events_tx,
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(worker.run(command_rx, events_rx));
            }
            Err(e) => {
                error!(error = %e, "Image loader created outside a Tokio runtime");
                *state.write() = LoadState::failed(&LoadError::Transport {
                    message: format!("no async runtime: {e}"),
                });
            }
        }

        Self { commands, state }
    }

    /// Requests the image at `url`.
    ///
    /// Ignored while the same URL is already loading. A different URL
    /// supersedes the in-flight fetch.
    pub fn request(&self, url: impl Into<String>) {
        self.send(LoaderCommand::Request(url.into()));
    }

    /// Aborts the in-flight fetch, if any, and returns to `Idle`.
    pub fn cancel(&self) {
        self.send(LoaderCommand::Cancel);
    }

    /// Re-requests the last URL. Does nothing if no URL was ever requested.
    pub fn retry(&self) {
        self.send(LoaderCommand::Retry);
    }

    /// Subscribes to state changes. The subscription first yields the current
    /// state, then every subsequent transition.
    #[must_use]
    pub fn subscribe(&self) -> StateSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send(LoaderCommand::Subscribe(tx));
        StateSubscription::new(rx)
    }

    /// Returns a snapshot of the most recently published state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state.read().clone()
    }

    fn send(&self, command: LoaderCommand) {
        if let Err(e) = self.commands.send(command) {
            error!("Image loader worker is gone: {:?}", e.0);
        }
    }
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

struct InFlight {
    key: ImageKey,
    task: JoinHandle<()>,
}

/// State owned by the background worker loop.
struct LoaderWorker {
    cache: Arc<dyn ImageCachePort>,
    fetcher: Arc<dyn ImageFetcherPort>,
    state: Arc<RwLock<LoadState>>,
    generation: u64,
    last_url: Option<String>,
    in_flight: Option<InFlight>,
    subscribers: Vec<mpsc::UnboundedSender<LoadState>>,
    events_tx: mpsc::UnboundedSender<FetchEvent>,
}

impl LoaderWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<LoaderCommand>,
        mut events: mpsc::UnboundedReceiver<FetchEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        self.abort_in_flight();
        trace!("Image loader worker stopped");
    }

    fn handle_command(&mut self, command: LoaderCommand) {
        match command {
            LoaderCommand::Request(url) => self.handle_request(url),
            LoaderCommand::Cancel => self.handle_cancel(),
            LoaderCommand::Retry => match self.last_url.clone() {
                Some(url) => {
                    debug!(url = %url, "Retrying image load");
                    self.handle_request(url);
                }
                None => trace!("Retry requested before any load"),
            },
            LoaderCommand::Subscribe(tx) => {
                let current = self.state.read().clone();
                if tx.send(current).is_ok() {
                    self.subscribers.push(tx);
                }
            }
        }
    }

    fn handle_request(&mut self, url: String) {
        let parsed = ImageKey::parse(&url);

        if let Some(in_flight) = &self.in_flight {
            if parsed.as_ref().is_ok_and(|key| *key == in_flight.key) {
                trace!(url = %url, "Load already in flight, ignoring request");
                return;
            }
            debug!(previous = %in_flight.key, url = %url, "Superseding in-flight load");
            self.abort_in_flight();
        }

        self.generation += 1;
        self.last_url = Some(url);

        let key = match parsed {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Rejected image request");
                self.publish(LoadState::failed(&e));
                return;
            }
        };

        if let Some(image) = self.cache.get(&key) {
            debug!(key = %key, "Image served from cache");
            self.publish(LoadState::Loaded(LoadedImage {
                key,
                image,
                source: ImageSource::MemoryCache,
            }));
            return;
        }

        debug!(key = %key, generation = self.generation, "Starting image fetch");
        self.publish(LoadState::Loading { progress: 0.0 });

        let task = tokio::spawn(run_fetch(
            self.fetcher.clone(),
            key.clone(),
            self.generation,
            self.events_tx.clone(),
        ));
        self.in_flight = Some(InFlight { key, task });
    }

    fn handle_cancel(&mut self) {
        self.generation += 1;
        if self.abort_in_flight() {
            debug!("Cancelled image load");
        }
        if *self.state.read() != LoadState::Idle {
            self.publish(LoadState::Idle);
        }
    }

    fn handle_event(&mut self, event: FetchEvent) {
        match event {
            FetchEvent::Progress {
                generation,
                fraction,
            } => {
                if generation != self.generation {
                    trace!(generation, current = self.generation, "Dropping stale progress");
                    return;
                }
                let current = self.state.read().progress();
                if current.is_some_and(|progress| fraction > progress) {
                    self.publish(LoadState::Loading {
                        progress: fraction.clamp(0.0, 1.0),
                    });
                }
            }
            FetchEvent::Finished {
                generation,
                key,
                result,
            } => {
                if generation != self.generation {
                    trace!(key = %key, generation, "Dropping stale fetch result");
                    return;
                }
                self.in_flight = None;

                match result {
                    Ok(image) => {
                        self.cache.set(key.clone(), image.clone());
                        debug!(key = %key, source = "network", "Image loaded successfully");
                        self.publish(LoadState::Loaded(LoadedImage {
                            key,
                            image,
                            source: ImageSource::Network,
                        }));
                    }
                    Err(e) => {
                        warn!(key = %key, kind = %e.kind(), error = %e, "Image load failed");
                        self.publish(LoadState::failed(&e));
                    }
                }
            }
        }
    }

    fn abort_in_flight(&mut self) -> bool {
        self.in_flight.take().is_some_and(|in_flight| {
            in_flight.task.abort();
            true
        })
    }

    fn publish(&mut self, state: LoadState) {
        *self.state.write() = state.clone();
        self.subscribers
            .retain(|subscriber| subscriber.send(state.clone()).is_ok());
    }
}

/// Drives one fetch on a background task and reports back to the worker.
async fn run_fetch(
    fetcher: Arc<dyn ImageFetcherPort>,
    key: ImageKey,
    generation: u64,
    events: mpsc::UnboundedSender<FetchEvent>,
) {
    let (sink, mut progress) = ProgressSink::channel();

    let outcome = {
        let fetch = fetcher.fetch(key.as_str(), sink);
        tokio::pin!(fetch);

        loop {
            tokio::select! {
                biased;
                Some(fraction) = progress.recv() => {
                    let _ = events.send(FetchEvent::Progress { generation, fraction });
                }
                outcome = &mut fetch => break outcome,
            }
        }
    };

    // Progress reported right before completion must still precede it.
    while let Ok(fraction) = progress.try_recv() {
        let _ = events.send(FetchEvent::Progress {
            generation,
            fraction,
        });
    }
    drop(progress);

    let result = match outcome {
        Ok(bytes) => decode(bytes).await,
        Err(e) => Err(LoadError::from(e)),
    };

    let _ = events.send(FetchEvent::Finished {
        generation,
        key,
        result,
    });
}

/// Decodes on the blocking pool so the worker never stalls on CPU work.
async fn decode(bytes: Bytes) -> Result<CachedImage, LoadError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| LoadError::decode(format!("decode task failed: {e}")))?
        .map(Arc::new)
        .map_err(|e| LoadError::decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::errors::{FetchError, LoadErrorKind};
    use crate::domain::ports::mocks::{MockImageFetcher, MockResponse, png_bytes};
    use crate::infrastructure::image::MemoryImageCache;

    const URL: &str = "https://x/img";
    const OTHER_URL: &str = "https://x/other";

    fn key(url: &str) -> ImageKey {
        ImageKey::parse(url).unwrap()
    }

    fn setup(fetcher: MockImageFetcher) -> (Arc<MemoryImageCache>, Arc<MockImageFetcher>, ImageLoader) {
        let cache = Arc::new(MemoryImageCache::new(10, 0));
        let fetcher = Arc::new(fetcher);
        let loader = ImageLoader::new(cache.clone(), fetcher.clone());
        (cache, fetcher, loader)
    }

    async fn settled(subscription: &mut StateSubscription) -> LoadState {
        tokio::time::timeout(Duration::from_secs(5), subscription.wait_settled())
            .await
            .expect("timed out waiting for loader")
            .expect("loader stopped")
    }

    async fn next(subscription: &mut StateSubscription) -> LoadState {
        tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .expect("timed out waiting for loader")
            .expect("loader stopped")
    }

    #[tokio::test]
    async fn test_cache_hit_bypasses_network() {
        let (cache, fetcher, loader) = setup(MockImageFetcher::new());
        let image: CachedImage = Arc::new(image::DynamicImage::new_rgb8(3, 3));
        cache.set(key(URL), image.clone());

        let mut states = loader.subscribe();
        loader.request(URL);

        assert_eq!(next(&mut states).await, LoadState::Idle);
        let LoadState::Loaded(loaded) = next(&mut states).await else {
            panic!("expected loaded state");
        };
        assert_eq!(loaded.source, ImageSource::MemoryCache);
        assert!(Arc::ptr_eq(&loaded.image, &image));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_round_trip() {
        let fetcher = MockImageFetcher::new()
            .respond(URL, MockResponse::ok(png_bytes(4, 4)).with_progress(&[0.5]));
        let (cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);

        assert_eq!(next(&mut states).await, LoadState::Idle);
        assert_eq!(next(&mut states).await, LoadState::Loading { progress: 0.0 });

        let LoadState::Loaded(loaded) = settled(&mut states).await else {
            panic!("expected loaded state");
        };
        assert_eq!(loaded.source, ImageSource::Network);
        assert_eq!(loaded.image.width(), 4);
        assert_eq!(fetcher.calls(), 1);

        let cached = cache.get(&key(URL)).expect("image cached");
        assert!(Arc::ptr_eq(&cached, &loaded.image));
        assert!(loader.state().is_loaded());
    }

    #[tokio::test]
    async fn test_progress_is_non_decreasing() {
        let fetcher = MockImageFetcher::new().respond(
            URL,
            MockResponse::ok(png_bytes(2, 2)).with_progress(&[0.2, 0.1, 0.6, 0.6, 1.0]),
        );
        let (_cache, _fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);

        let mut fractions = Vec::new();
        loop {
            let state = next(&mut states).await;
            if let Some(progress) = state.progress() {
                fractions.push(progress);
            }
            if state.is_loaded() {
                break;
            }
            assert!(!state.is_failed(), "unexpected failure: {state}");
        }
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[tokio::test]
    async fn test_duplicate_request_while_loading_fetches_once() {
        let fetcher =
            MockImageFetcher::new().respond(URL, MockResponse::ok(png_bytes(2, 2)).held());
        let (_cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        loader.request(URL);
        loader.request(URL);

        states.wait_for(LoadState::is_loading).await;
        fetcher.release(1);

        assert!(settled(&mut states).await.is_loaded());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_superseding_request_wins() {
        let fetcher = MockImageFetcher::new()
            .respond(URL, MockResponse::ok(png_bytes(8, 8)).held())
            .respond(OTHER_URL, MockResponse::ok(png_bytes(2, 2)));
        let (cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        loader.request(OTHER_URL);

        let LoadState::Loaded(loaded) = settled(&mut states).await else {
            panic!("expected loaded state");
        };
        assert_eq!(loaded.key, key(OTHER_URL));

        fetcher.release(1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let LoadState::Loaded(current) = loader.state() else {
            panic!("expected loaded state");
        };
        assert_eq!(current.key, key(OTHER_URL));
        assert!(states.try_next().is_none());
        assert!(cache.get(&key(URL)).is_none());
    }

    #[tokio::test]
    async fn test_superseded_failure_is_discarded() {
        let fetcher = MockImageFetcher::new()
            .respond(
                URL,
                MockResponse::err(FetchError::transport("reset")).held(),
            )
            .respond(OTHER_URL, MockResponse::ok(png_bytes(2, 2)).held());
        let (_cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        loader.request(OTHER_URL);
        fetcher.release(2);

        let state = settled(&mut states).await;
        assert!(state.is_loaded(), "unexpected state: {state}");
        assert_eq!(
            fetcher.requested().last().map(String::as_str),
            Some(OTHER_URL)
        );
    }

    #[tokio::test]
    async fn test_not_found_fails_with_status() {
        let fetcher = MockImageFetcher::new()
            .respond(URL, MockResponse::err(FetchError::BadResponse { status: 404 }));
        let (cache, _fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);

        let LoadState::Failed { kind, message } = settled(&mut states).await else {
            panic!("expected failed state");
        };
        assert_eq!(kind, LoadErrorKind::BadResponse);
        assert!(message.contains("404"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_url_fails_without_fetch() {
        let (_cache, fetcher, loader) = setup(MockImageFetcher::new());

        let mut states = loader.subscribe();
        loader.request("");

        assert_eq!(next(&mut states).await, LoadState::Idle);
        let LoadState::Failed { kind, .. } = next(&mut states).await else {
            panic!("expected failed state");
        };
        assert_eq!(kind, LoadErrorKind::BadUrl);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_fail_with_decode_error() {
        let fetcher = MockImageFetcher::new()
            .respond(URL, MockResponse::ok(Bytes::from_static(b"not an image")));
        let (cache, _fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);

        let LoadState::Failed { kind, .. } = settled(&mut states).await else {
            panic!("expected failed state");
        };
        assert_eq!(kind, LoadErrorKind::Decode);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_returns_to_idle_and_suppresses_result() {
        let fetcher =
            MockImageFetcher::new().respond(URL, MockResponse::ok(png_bytes(2, 2)).held());
        let (cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        states.wait_for(LoadState::is_loading).await;

        loader.cancel();
        assert_eq!(next(&mut states).await, LoadState::Idle);

        fetcher.release(1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(loader.state(), LoadState::Idle);
        assert!(states.try_next().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let fetcher = MockImageFetcher::new()
            .respond(URL, MockResponse::err(FetchError::transport("offline")));
        let (_cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        assert!(settled(&mut states).await.is_failed());

        fetcher.set_response(URL, MockResponse::ok(png_bytes(2, 2)));
        loader.retry();

        assert!(settled(&mut states).await.is_loaded());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_without_request_is_noop() {
        let (_cache, fetcher, loader) = setup(MockImageFetcher::new());

        let mut states = loader.subscribe();
        loader.retry();
        loader.cancel();

        assert_eq!(next(&mut states).await, LoadState::Idle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(states.try_next().is_none());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_second_request_after_load_hits_cache() {
        let fetcher = MockImageFetcher::new().respond(URL, MockResponse::ok(png_bytes(2, 2)));
        let (_cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        assert!(settled(&mut states).await.is_loaded());

        loader.request(URL);
        let LoadState::Loaded(loaded) = settled(&mut states).await else {
            panic!("expected loaded state");
        };
        assert_eq!(loaded.source, ImageSource::MemoryCache);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_dropping_loader_ends_subscription() {
        let fetcher =
            MockImageFetcher::new().respond(URL, MockResponse::ok(png_bytes(2, 2)).held());
        let (_cache, _fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        states.wait_for(LoadState::is_loading).await;

        drop(loader);
        let end = tokio::time::timeout(Duration::from_secs(5), states.wait_settled())
            .await
            .expect("timed out waiting for loader shutdown");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_malformed_url_supersedes_in_flight() {
        let fetcher =
            MockImageFetcher::new().respond(URL, MockResponse::ok(png_bytes(2, 2)).held());
        let (cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        states.wait_for(LoadState::is_loading).await;

        loader.request("");
        let LoadState::Failed { kind, .. } = next(&mut states).await else {
            panic!("expected failed state");
        };
        assert_eq!(kind, LoadErrorKind::BadUrl);

        fetcher.release(1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            loader.state(),
            LoadState::Failed {
                kind: LoadErrorKind::BadUrl,
                ..
            }
        ));
        assert!(states.try_next().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_superseded_fetch_reports_no_progress() {
        let fetcher = MockImageFetcher::new()
            .respond(
                URL,
                MockResponse::ok(png_bytes(8, 8))
                    .with_progress(&[0.4, 0.8])
                    .held(),
            )
            .respond(OTHER_URL, MockResponse::ok(png_bytes(2, 2)).held());
        let (cache, fetcher, loader) = setup(fetcher);

        let mut states = loader.subscribe();
        loader.request(URL);
        states.wait_for(LoadState::is_loading).await;

        loader.request(OTHER_URL);
        assert_eq!(next(&mut states).await, LoadState::Loading { progress: 0.0 });

        fetcher.release(2);

        let mut after_supersede = Vec::new();
        loop {
            let state = next(&mut states).await;
            let done = !state.is_loading();
            after_supersede.push(state);
            if done {
                break;
            }
        }

        assert!(
            after_supersede.iter().all(|state| state.progress().is_none()),
            "stale progress leaked: {after_supersede:?}"
        );
        let Some(LoadState::Loaded(loaded)) = after_supersede.last() else {
            panic!("expected loaded state");
        };
        assert_eq!(loaded.key, key(OTHER_URL));
        assert!(cache.get(&key(URL)).is_none());
    }

    #[test]
    fn test_loader_outside_runtime_fails_without_panicking() {
        let cache = Arc::new(MemoryImageCache::new(10, 0));
        let fetcher = Arc::new(MockImageFetcher::new());
        let loader = ImageLoader::new(cache, fetcher.clone());

        let LoadState::Failed { kind, .. } = loader.state() else {
            panic!("expected failed state");
        };
        assert_eq!(kind, LoadErrorKind::Transport);

        loader.request(URL);
        loader.retry();
        loader.cancel();
        assert!(loader.state().is_failed());
        assert_eq!(fetcher.calls(), 0);
    }
}
