//! Image slot binding between a host UI and the loading core.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::application::{ImageLoader, StateSubscription};
use crate::domain::entities::{LoadState, LoadedImage};
use crate::domain::errors::LoadErrorKind;
use crate::domain::ports::{ImageCachePort, ImageFetcherPort};

/// Maps each load state to host-specific output.
pub trait SlotRenderer {
    /// What the host produces for a slot, e.g. a widget or a line of text.
    type Output;

    /// Rendered while idle (`None`) or loading (`Some(fraction)`).
    fn placeholder(&self, progress: Option<f64>) -> Self::Output;

    /// Rendered once the image is available.
    fn image(&self, image: &LoadedImage) -> Self::Output;

    /// Rendered when loading failed.
    fn error(&self, kind: LoadErrorKind, message: &str) -> Self::Output;
}

/// Dispatches `state` to the matching renderer callback.
pub fn render_state<R: SlotRenderer + ?Sized>(state: &LoadState, renderer: &R) -> R::Output {
    match state {
        LoadState::Idle => renderer.placeholder(None),
        LoadState::Loading { progress } => renderer.placeholder(Some(*progress)),
        LoadState::Loaded(image) => renderer.image(image),
        LoadState::Failed { kind, message } => renderer.error(*kind, message),
    }
}

/// One logical image position in the host UI, backed by a stable loader.
pub struct ImageSlot {
    url: Option<String>,
    loader: ImageLoader,
}

impl ImageSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new(cache: Arc<dyn ImageCachePort>, fetcher: Arc<dyn ImageFetcherPort>) -> Self {
        Self {
            url: None,
            loader: ImageLoader::new(cache, fetcher),
        }
    }

    /// Creates a slot and immediately requests `url`.
    #[must_use]
    pub fn with_url(
        cache: Arc<dyn ImageCachePort>,
        fetcher: Arc<dyn ImageFetcherPort>,
        url: impl Into<String>,
    ) -> Self {
        let mut slot = Self::new(cache, fetcher);
        slot.set_url(url);
        slot
    }

    /// Returns the URL currently bound to the slot.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Binds `url` to the slot. Returns true if this changed the URL and a
    /// load was requested; rebinding the same URL does nothing.
    pub fn set_url(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.url.as_deref() == Some(url.as_str()) {
            return false;
        }
        debug!(url = %url, "Image slot URL changed");
        self.loader.request(url.clone());
        self.url = Some(url);
        true
    }

    /// Requests the bound URL again, e.g. when the slot becomes visible.
    /// Served from cache when possible; ignored while already loading.
    pub fn on_appear(&self) {
        if let Some(url) = &self.url {
            self.loader.request(url.clone());
        }
    }

    /// Retries the last request.
    pub fn retry(&self) {
        self.loader.retry();
    }

    /// Cancels the in-flight request.
    pub fn cancel(&self) {
        self.loader.cancel();
    }

    /// Returns the current load state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.loader.state()
    }

    /// Subscribes to the slot's state changes.
    #[must_use]
    pub fn subscribe(&self) -> StateSubscription {
        self.loader.subscribe()
    }

    /// Renders the current state.
    pub fn render<R: SlotRenderer + ?Sized>(&self, renderer: &R) -> R::Output {
        render_state(&self.state(), renderer)
    }
}

impl std::fmt::Debug for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSlot")
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Keeps one [`ImageSlot`] per slot id, all sharing a cache and fetcher.
pub struct SlotHost<K> {
    cache: Arc<dyn ImageCachePort>,
    fetcher: Arc<dyn ImageFetcherPort>,
    slots: HashMap<K, ImageSlot>,
}

impl<K: Eq + Hash> SlotHost<K> {
    /// Creates a host with no slots.
    #[must_use]
    pub fn new(cache: Arc<dyn ImageCachePort>, fetcher: Arc<dyn ImageFetcherPort>) -> Self {
        Self {
            cache,
            fetcher,
            slots: HashMap::new(),
        }
    }

    /// Binds `url` to the slot `id`, creating the slot on first use.
    pub fn bind(&mut self, id: K, url: impl Into<String>) -> &ImageSlot {
        let slot = self
            .slots
            .entry(id)
            .or_insert_with(|| ImageSlot::new(self.cache.clone(), self.fetcher.clone()));
        slot.set_url(url);
        slot
    }

    /// Returns the slot for `id`, if bound.
    #[must_use]
    pub fn slot(&self, id: &K) -> Option<&ImageSlot> {
        self.slots.get(id)
    }

    /// Drops the slot for `id`, cancelling its load. Returns true if it existed.
    pub fn release(&mut self, id: &K) -> bool {
        self.slots.remove(id).is_some()
    }

    /// Iterates over all bound slots.
    pub fn slots(&self) -> impl Iterator<Item = (&K, &ImageSlot)> {
        self.slots.iter()
    }

    /// Returns the number of bound slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slots are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sets the shared cache's count and cost limits. `0` disables a limit.
    pub fn configure_cache_limits(&self, max_count: usize, max_cost: usize) {
        self.cache.configure_limits(max_count, max_cost);
    }

    /// Empties the shared cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl<K> std::fmt::Debug for SlotHost<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotHost")
            .field("slots", &self.slots.len())
            .finish_non_exhaustive()
    }
}
