//! Fetch/Update Coordinator
//!
//! Turns cache misses into cached, compressed, header-annotated entries. At most one
//! miss pipeline runs per URL; explicit updates for one URL run strictly in arrival order.
//! Store notifications drive file watches, and watch events trigger debounced refreshes.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock as SyncRwLock};
use regex::Regex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{full_key, CacheStats, CacheStore, CacheType, StoreEvent, ENCODING_PLAIN};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::pipeline::contracts::{
    Classifier, Codec, ContentHasher, ContentTypeResolver, GzipCodec, MimeGuessResolver,
    NotifyWatchProvider, PathMapper, PrepInput, PrepProvider, RootMapper, Sha256Hasher,
    Transform, Watch, WatchProvider,
};
use crate::pipeline::events::{CacheEvent, EVENT_CAPACITY};
use crate::pipeline::readiness::ReadyBarrier;
use crate::pipeline::resource::{
    Artifact, FetchRequest, Resource, SetOptions, Variant, CONTENT_ENCODING, CONTENT_TYPE, ETAG,
};
use crate::tasks::spawn_expiry_task;

type Reply = oneshot::Sender<Result<Artifact>>;

// == Builder ==
/// Assembles a [`Coordinator`] from configuration and injected strategies.
pub struct CoordinatorBuilder {
    config: Config,
    store: Option<CacheStore>,
    mapper: Option<Arc<dyn PathMapper>>,
    resolver: Arc<dyn ContentTypeResolver>,
    codec: Arc<dyn Codec>,
    hasher: Arc<dyn ContentHasher>,
    watcher: Arc<dyn WatchProvider>,
    classifier: Classifier,
    prep_provider: Option<PrepProvider>,
}

impl CoordinatorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            mapper: None,
            resolver: Arc::new(MimeGuessResolver),
            codec: Arc::new(GzipCodec::new()),
            hasher: Arc::new(Sha256Hasher),
            watcher: Arc::new(NotifyWatchProvider),
            classifier: Arc::new(|_: &str| CacheType::Strong),
            prep_provider: None,
        }
    }

    /// Uses a pre-built store instead of one sized from the config.
    pub fn store(mut self, store: CacheStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn path_mapper(mut self, mapper: impl PathMapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    pub fn content_type_resolver(mut self, resolver: impl ContentTypeResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn hasher(mut self, hasher: impl ContentHasher + 'static) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    pub fn watch_provider(mut self, watcher: impl WatchProvider + 'static) -> Self {
        self.watcher = Arc::new(watcher);
        self
    }

    pub fn classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&str) -> CacheType + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn prep_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn(&str) -> Option<Transform> + Send + Sync + 'static,
    {
        self.prep_provider = Some(Arc::new(provider));
        self
    }

    /// Builds the coordinator and spawns its TTL sweep and store listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Coordinator {
        let mut store = self
            .store
            .unwrap_or_else(|| CacheStore::from_config(&self.config));
        let store_events = store.subscribe();
        let store = Arc::new(RwLock::new(store));

        let mapper = self
            .mapper
            .unwrap_or_else(|| {
                Arc::new(RootMapper::new(self.config.asset_root.clone())) as Arc<dyn PathMapper>
            });
        let accepts_compressed =
            Regex::new(&format!(r"\b{}\b", regex::escape(self.codec.encoding()))).ok();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            store: store.clone(),
            mapper,
            resolver: self.resolver,
            codec: self.codec,
            hasher: self.hasher,
            watcher: self.watcher,
            classifier: SyncRwLock::new(self.classifier),
            prep_provider: SyncRwLock::new(self.prep_provider),
            accepts_compressed,
            fetches: Mutex::new(HashMap::new()),
            updates: Mutex::new(HashMap::new()),
            watches: Mutex::new(HashMap::new()),
            deps: Mutex::new(HashMap::new()),
            debounce: Mutex::new(HashMap::new()),
            debounce_seq: AtomicU64::new(0),
            ready: Arc::new(ReadyBarrier::new()),
            events,
            tasks: Mutex::new(Vec::new()),
            config: self.config,
        });

        let sweep = spawn_expiry_task(store, inner.config.expiry_interval());
        let listener = tokio::spawn(listen_store_events(Arc::downgrade(&inner), store_events));
        inner.tasks.lock().extend([sweep, listener]);

        info!(
            compress = inner.config.compress,
            use_etags = inner.config.use_etags,
            "Coordinator started"
        );
        Coordinator { inner }
    }
}

// == Coordinator ==
/// Cheaply cloneable handle to the fetch/update pipeline.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Coordinator with default strategies rooted at `config.asset_root`.
    pub fn new(config: Config) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    // == Fetch ==
    /// Serves a request from the cache, running the pipeline on a miss.
    ///
    /// Failures are reported inside the returned resource (404 for read failures, 500
    /// otherwise) and raised as an `Error` event.
    pub async fn fetch(&self, request: FetchRequest) -> Resource {
        let inner = &self.inner;
        let url = inner.normalize(&request.url);
        let encoding = inner.negotiate(request.accept_encoding.as_deref());
        let if_none_match = request.if_none_match.as_deref();

        let pending = full_key(&encoding, &url);

        let rx = match inner.join_pending(&pending) {
            Some(rx) => rx,
            None => {
                if let Some(resource) = inner.lookup(&url, &encoding, if_none_match).await {
                    return resource;
                }
                inner.join_or_start(&pending, &url, &encoding)
            }
        };

        inner.store.write().await.record_miss();
        inner.emit(CacheEvent::Miss {
            url: url.clone(),
            encoding: encoding.clone(),
        });

        match rx.await.unwrap_or_else(|_| Err(aborted(&url))) {
            Ok(artifact) => {
                let variant = artifact.select(&encoding);
                let modified = inner
                    .store
                    .write()
                    .await
                    .modified_time(&variant.encoding, &url);
                let mut resource = Resource::conditional(
                    &url,
                    &variant.encoding,
                    variant.headers.clone(),
                    variant.content.clone(),
                    if_none_match,
                );
                resource.modified = modified;
                resource
            }
            Err(error) => Resource::failed(&url, error),
        }
    }

    // == Set ==
    /// Queues an explicit update and resolves when it has been processed.
    ///
    /// Updates for the same URL run one at a time in submission order.
    pub async fn set(&self, options: SetOptions) -> Result<Artifact> {
        let inner = &self.inner;
        let url = inner.normalize(&options.url);
        let cache_type = options.cache_type.unwrap_or_else(|| {
            if options.content.is_some() {
                CacheType::Permanent
            } else {
                inner.classify(&url)
            }
        });

        let (tx, rx) = oneshot::channel();
        let job = UpdateJob {
            source: match options.content {
                Some(content) => Source::Supplied(content),
                None => Source::Backing { force: true },
            },
            mime: options.mime,
            cache_type: Some(cache_type),
            compress: true,
            preprocessed: options.preprocessed,
            allow_serve_raw: options.allow_serve_raw,
            reply: Some(tx),
        };
        inner.enqueue_update(&url, job);

        rx.await.unwrap_or_else(|_| Err(aborted(&url)))
    }

    // == Clear ==
    /// Removes one encoding of a URL, or all of them when `encoding` is `None`.
    pub async fn clear(&self, url: &str, encoding: Option<&str>) -> bool {
        let url = self.inner.normalize(url);
        self.inner.store.write().await.clear(encoding, &url)
    }

    /// Clears every entry whose full key matches `pattern`.
    pub async fn clear_matches(&self, pattern: &Regex) -> usize {
        self.inner.store.write().await.clear_matches(pattern)
    }

    /// Whether a URL is cached under `encoding`, or under the preferred encoding.
    pub async fn has(&self, url: &str, encoding: Option<&str>) -> bool {
        let url = self.inner.normalize(url);
        let encoding = encoding.unwrap_or_else(|| self.inner.preferred_encoding());
        self.inner.store.read().await.has(encoding, &url)
    }

    /// Install time of a cached URL in Unix milliseconds.
    pub async fn modified_time(&self, url: &str, encoding: Option<&str>) -> Option<u64> {
        let url = self.inner.normalize(url);
        let encoding = encoding.unwrap_or_else(|| self.inner.preferred_encoding());
        self.inner.store.write().await.modified_time(encoding, &url)
    }

    /// Drops every cached entry along with its watches.
    /// Refreshes still inside their quiet period are cancelled.
    pub async fn reset(&self) {
        for (_, (_, timer)) in self.inner.debounce.lock().drain() {
            timer.abort();
        }
        self.inner.store.write().await.reset();
        self.inner.watches.lock().clear();
    }

    // == Dependencies ==
    /// Declares auxiliary paths whose changes refresh `url`.
    pub async fn set_deps(&self, url: &str, paths: Vec<PathBuf>) {
        let url = self.inner.normalize(url);
        self.inner.deps.lock().insert(url.clone(), paths);
        if let Some(set) = self.inner.watches.lock().get_mut(&url) {
            set.close_deps();
        }
        if self.inner.has_watchable_entry(&url).await {
            self.inner.open_dep_watches(&url);
        }
    }

    /// Forgets the auxiliary paths of `url` and closes their watches.
    pub fn clear_deps(&self, url: &str) {
        let url = self.inner.normalize(url);
        self.inner.deps.lock().remove(&url);
        if let Some(set) = self.inner.watches.lock().get_mut(&url) {
            set.close_deps();
        }
    }

    // == Strategies ==
    pub fn set_classifier<F>(&self, classifier: F)
    where
        F: Fn(&str) -> CacheType + Send + Sync + 'static,
    {
        *self.inner.classifier.write() = Arc::new(classifier);
    }

    pub fn set_prep_provider<F>(&self, provider: F)
    where
        F: Fn(&str) -> Option<Transform> + Send + Sync + 'static,
    {
        *self.inner.prep_provider.write() = Some(Arc::new(provider));
    }

    pub fn prep_provider(&self) -> Option<PrepProvider> {
        self.inner.prep_provider.read().clone()
    }

    // == Readiness ==
    /// Runs `waiter` once no pipeline or update is in flight.
    pub fn on_ready<F>(&self, waiter: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.ready.on_ready(waiter);
    }

    /// Resolves once no pipeline or update is in flight.
    pub async fn ready(&self) {
        self.inner.ready.ready().await;
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_ready()
    }

    // == Observability ==
    /// Subscribes to hit/miss/error/notice events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.store.read().await.stats()
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        Arc::clone(&self.inner.store)
    }

    /// Whether a primary watch is open for `url`.
    pub fn is_watched(&self, url: &str) -> bool {
        self.inner.is_watched(&self.inner.normalize(url))
    }

    /// Number of dependency watches open for `url`.
    pub fn dep_watch_count(&self, url: &str) -> usize {
        let url = self.inner.normalize(url);
        self.inner
            .watches
            .lock()
            .get(&url)
            .map_or(0, |set| set.deps.len())
    }

    /// Encoding served to clients that accept compression.
    pub fn preferred_encoding(&self) -> &str {
        self.inner.preferred_encoding()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

// == Internals ==
enum Source {
    /// Bytes handed in by an explicit update
    Supplied(Bytes),
    /// Read from the mapped path; a cached plain form is reused unless forced
    Backing { force: bool },
}

struct UpdateJob {
    source: Source,
    mime: Option<String>,
    /// Classified inside the pipeline when absent
    cache_type: Option<CacheType>,
    /// Whether the compress stage runs (still subject to `config.compress`)
    compress: bool,
    preprocessed: bool,
    allow_serve_raw: bool,
    reply: Option<Reply>,
}

/// Watch tasks of one URL. Dropping the set closes every watch in it.
#[derive(Default)]
struct WatchSet {
    primary: Option<JoinHandle<()>>,
    deps: Vec<JoinHandle<()>>,
}

impl WatchSet {
    fn close_deps(&mut self) {
        for dep in self.deps.drain(..) {
            dep.abort();
        }
    }
}

impl Drop for WatchSet {
    fn drop(&mut self) {
        if let Some(primary) = self.primary.take() {
            primary.abort();
        }
        self.close_deps();
    }
}

struct Inner {
    config: Config,
    store: Arc<RwLock<CacheStore>>,
    mapper: Arc<dyn PathMapper>,
    resolver: Arc<dyn ContentTypeResolver>,
    codec: Arc<dyn Codec>,
    hasher: Arc<dyn ContentHasher>,
    watcher: Arc<dyn WatchProvider>,
    classifier: SyncRwLock<Classifier>,
    prep_provider: SyncRwLock<Option<PrepProvider>>,
    /// Whole-word match of the codec token inside Accept-Encoding
    accepts_compressed: Option<Regex>,
    /// Full key (encoding::url) → waiters of the in-flight miss pipeline
    fetches: Mutex<HashMap<String, Vec<Reply>>>,
    /// URL → queued updates; present while a worker drains it
    updates: Mutex<HashMap<String, VecDeque<UpdateJob>>>,
    watches: Mutex<HashMap<String, WatchSet>>,
    deps: Mutex<HashMap<String, Vec<PathBuf>>>,
    /// URL → (generation, pending debounce timer)
    debounce: Mutex<HashMap<String, (u64, JoinHandle<()>)>>,
    debounce_seq: AtomicU64,
    ready: Arc<ReadyBarrier>,
    events: broadcast::Sender<CacheEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
        for (_, (_, timer)) in self.debounce.get_mut().drain() {
            timer.abort();
        }
    }
}

impl Inner {
    fn normalize(&self, url: &str) -> String {
        if self.config.strip_query {
            url.split('?').next().unwrap_or(url).to_string()
        } else {
            url.to_string()
        }
    }

    fn preferred_encoding(&self) -> &str {
        if self.config.compress {
            self.codec.encoding()
        } else {
            ENCODING_PLAIN
        }
    }

    fn negotiate(&self, accept_encoding: Option<&str>) -> String {
        match accept_encoding {
            Some(accept)
                if self.config.compress
                    && self
                        .accepts_compressed
                        .as_ref()
                        .is_some_and(|pattern| pattern.is_match(accept)) =>
            {
                self.codec.encoding().to_string()
            }
            _ => ENCODING_PLAIN.to_string(),
        }
    }

    fn classify(&self, url: &str) -> CacheType {
        let classifier = self.classifier.read().clone();
        classifier(url)
    }

    fn emit(&self, event: CacheEvent) {
        let _ = self.events.send(event);
    }

    fn report(&self, error: &PipelineError) {
        warn!(url = error.url(), %error, "pipeline failed");
        self.emit(CacheEvent::Error(error.clone()));
    }

    // == Hit Path ==
    async fn lookup(
        &self,
        url: &str,
        encoding: &str,
        if_none_match: Option<&str>,
    ) -> Option<Resource> {
        let mut store = self.store.write().await;
        let body = store.get(encoding, url)?;
        let headers = store.get_headers(encoding, url);
        let modified = store.modified_time(encoding, url);
        store.record_hit();
        drop(store);

        self.emit(CacheEvent::Hit {
            url: url.to_string(),
            encoding: encoding.to_string(),
        });

        let mut resource = Resource::conditional(url, encoding, headers, body, if_none_match);
        resource.hit = true;
        resource.modified = modified;
        Some(resource)
    }

    // == Coalescing ==
    fn join_pending(&self, pending: &str) -> Option<oneshot::Receiver<Result<Artifact>>> {
        let mut fetches = self.fetches.lock();
        let waiters = fetches.get_mut(pending)?;
        let (tx, rx) = oneshot::channel();
        waiters.push(tx);
        Some(rx)
    }

    fn join_or_start(
        self: &Arc<Self>,
        pending: &str,
        url: &str,
        encoding: &str,
    ) -> oneshot::Receiver<Result<Artifact>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut fetches = self.fetches.lock();
            if let Some(waiters) = fetches.get_mut(pending) {
                waiters.push(tx);
                return rx;
            }
            fetches.insert(pending.to_string(), vec![tx]);
        }

        let guard = self.ready.begin();
        let inner = Arc::clone(self);
        let pending = pending.to_string();
        let url = url.to_string();
        let job = UpdateJob {
            source: Source::Backing { force: false },
            mime: None,
            cache_type: None,
            compress: encoding != ENCODING_PLAIN,
            preprocessed: false,
            allow_serve_raw: false,
            reply: None,
        };
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = inner.run_pipeline(&url, job).await;

            let waiters = inner.fetches.lock().remove(&pending).unwrap_or_default();
            debug!(url, waiters = waiters.len(), "miss pipeline finished");
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        });
        rx
    }

    // == Update Queue ==
    fn enqueue_update(self: &Arc<Self>, url: &str, job: UpdateJob) {
        {
            let mut updates = self.updates.lock();
            if let Some(queue) = updates.get_mut(url) {
                queue.push_back(job);
                return;
            }
            updates.insert(url.to_string(), VecDeque::from([job]));
        }

        let guard = self.ready.begin();
        let inner = Arc::clone(self);
        let url = url.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            inner.drain_updates(&url).await;
        });
    }

    async fn drain_updates(&self, url: &str) {
        loop {
            let mut job = {
                let mut updates = self.updates.lock();
                match updates.get_mut(url).and_then(VecDeque::pop_front) {
                    Some(job) => job,
                    None => {
                        updates.remove(url);
                        return;
                    }
                }
            };

            let reply = job.reply.take();
            let outcome = self.run_pipeline(url, job).await;
            if let Some(reply) = reply {
                if reply.send(outcome).is_err() {
                    debug!(url, "update caller went away");
                }
            }
        }
    }

    // == Pipeline ==
    /// Runs every stage of one job. A panicking strategy fails the job like any stage error.
    async fn run_pipeline(&self, url: &str, job: UpdateJob) -> Result<Artifact> {
        let stages = async {
            let cache_type = job.cache_type.unwrap_or_else(|| self.classify(url));
            let path = self.mapper.map(url);
            debug!(url, path = %path.display(), ?cache_type, "pipeline started");
            self.run_stages(url, &path, cache_type, job).await
        };

        let outcome = AssertUnwindSafe(stages)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panicked(url, panic.as_ref())));
        if let Err(error) = &outcome {
            self.report(error);
        }
        outcome
    }

    async fn run_stages(
        &self,
        url: &str,
        path: &Path,
        cache_type: CacheType,
        job: UpdateJob,
    ) -> Result<Artifact> {
        // Read
        let (content, fresh) = match job.source {
            Source::Supplied(content) => (content, true),
            Source::Backing { force } => {
                let cached = if force {
                    None
                } else {
                    self.store.write().await.get(ENCODING_PLAIN, url)
                };
                match cached {
                    Some(content) => (content, false),
                    None => (self.read(url, path).await?, true),
                }
            }
        };

        // Preprocess
        let plain = if fresh {
            self.preprocess(url, path, content, cache_type, job.preprocessed)
                .await?
        } else {
            content
        };

        // Compress
        let compressed = if self.config.compress && job.compress {
            match self.compress(url, &plain, cache_type).await {
                Ok(compressed) => Some(compressed),
                Err(error) if job.allow_serve_raw => {
                    self.report(&error);
                    self.store
                        .write()
                        .await
                        .clear(Some(self.codec.encoding()), url);
                    self.emit(CacheEvent::Notice(format!("serving {} uncompressed", url)));
                    None
                }
                Err(error) => return Err(error),
            }
        } else {
            None
        };

        // Annotate
        Ok(self
            .annotate(url, path, job.mime, plain, compressed, fresh)
            .await)
    }

    async fn read(&self, url: &str, path: &Path) -> Result<Bytes> {
        match tokio::fs::read(path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(error) => {
                // A missing backing file is authoritative: drop whatever was cached
                self.store.write().await.clear(None, url);
                Err(PipelineError::Read {
                    url: url.to_string(),
                    message: error.to_string(),
                })
            }
        }
    }

    async fn preprocess(
        &self,
        url: &str,
        path: &Path,
        content: Bytes,
        cache_type: CacheType,
        preprocessed: bool,
    ) -> Result<Bytes> {
        let transform = if preprocessed {
            None
        } else {
            let provider = self.prep_provider.read().clone();
            provider.and_then(|provider| provider(url))
        };

        let output = match transform {
            Some(transform) => {
                let input = PrepInput {
                    url: url.to_string(),
                    path: path.to_path_buf(),
                    content,
                };
                transform(input).await.map_err(|error| PipelineError::Prep {
                    url: url.to_string(),
                    message: format!("{:#}", error),
                })?
            }
            None => content,
        };

        self.store
            .write()
            .await
            .set(ENCODING_PLAIN, url, output.clone(), cache_type);
        Ok(output)
    }

    async fn compress(&self, url: &str, plain: &Bytes, cache_type: CacheType) -> Result<Bytes> {
        let codec = Arc::clone(&self.codec);
        let data = plain.clone();
        let result = tokio::task::spawn_blocking(move || codec.compress(&data)).await;

        let compressed = match result {
            Ok(Ok(compressed)) => Bytes::from(compressed),
            Ok(Err(error)) => return Err(compress_error(url, error)),
            Err(error) => return Err(compress_error(url, error)),
        };

        self.store
            .write()
            .await
            .set(self.codec.encoding(), url, compressed.clone(), cache_type);
        Ok(compressed)
    }

    async fn annotate(
        &self,
        url: &str,
        path: &Path,
        mime: Option<String>,
        plain: Bytes,
        compressed: Option<Bytes>,
        fresh: bool,
    ) -> Artifact {
        let content_type = mime.unwrap_or_else(|| self.resolver.resolve(path));

        let etag = if self.config.use_etags {
            let existing = if fresh {
                None
            } else {
                self.store.read().await.get_header(ENCODING_PLAIN, url, ETAG)
            };
            Some(existing.unwrap_or_else(|| self.hasher.hash(&plain)))
        } else {
            None
        };

        let mut plain_headers = HashMap::new();
        plain_headers.insert(CONTENT_TYPE.to_string(), content_type);
        if let Some(etag) = etag {
            plain_headers.insert(ETAG.to_string(), etag);
        }

        let mut store = self.store.write().await;
        store.set_headers(ENCODING_PLAIN, url, &plain_headers);

        let compressed = compressed.map(|content| {
            let encoding = self.codec.encoding().to_string();
            let mut headers = plain_headers.clone();
            headers.insert(CONTENT_ENCODING.to_string(), encoding.clone());
            store.set_headers(&encoding, url, &headers);
            Variant {
                encoding,
                content,
                headers,
            }
        });
        drop(store);

        Artifact {
            plain: Variant {
                encoding: ENCODING_PLAIN.to_string(),
                content: plain,
                headers: plain_headers,
            },
            compressed,
        }
    }

    // == Watches ==
    async fn has_watchable_entry(&self, url: &str) -> bool {
        let store = self.store.read().await;
        store.encodings(url).iter().any(|encoding| {
            store
                .cache_type(encoding, url)
                .is_some_and(|cache_type| cache_type != CacheType::Permanent)
        })
    }

    async fn ensure_watch(self: &Arc<Self>, url: &str) {
        if self.is_watched(url) {
            return;
        }

        let path = self.mapper.map(url);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            match self.watcher.watch(&path) {
                Ok(watch) => {
                    let handle = self.spawn_watch_listener(url, watch);
                    debug!(url, path = %path.display(), "watch opened");
                    let mut watches = self.watches.lock();
                    let set = watches.entry(url.to_string()).or_default();
                    match set.primary {
                        Some(_) => handle.abort(),
                        None => set.primary = Some(handle),
                    }
                }
                Err(error) => {
                    warn!(url, %error, "failed to watch backing file");
                    self.emit(CacheEvent::Notice(format!("cannot watch {}: {}", url, error)));
                }
            }
        }

        self.open_dep_watches(url);
    }

    fn is_watched(&self, url: &str) -> bool {
        self.watches
            .lock()
            .get(url)
            .is_some_and(|set| set.primary.is_some())
    }

    fn open_dep_watches(self: &Arc<Self>, url: &str) {
        let paths = match self.deps.lock().get(url) {
            Some(paths) if !paths.is_empty() => paths.clone(),
            _ => return,
        };
        if self
            .watches
            .lock()
            .get(url)
            .is_some_and(|set| !set.deps.is_empty())
        {
            return;
        }

        let mut handles = Vec::new();
        for path in paths {
            match self.watcher.watch(&path) {
                Ok(watch) => handles.push(self.spawn_watch_listener(url, watch)),
                Err(error) => {
                    warn!(url, path = %path.display(), %error, "failed to watch dependency");
                }
            }
        }

        let mut watches = self.watches.lock();
        let set = watches.entry(url.to_string()).or_default();
        if set.deps.is_empty() {
            set.deps = handles;
        } else {
            for handle in handles {
                handle.abort();
            }
        }
    }

    fn close_watches(&self, url: &str) {
        if self.watches.lock().remove(url).is_some() {
            debug!(url, "watches closed");
        }
    }

    fn spawn_watch_listener(self: &Arc<Self>, url: &str, mut watch: Watch) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let url = url.to_string();
        tokio::spawn(async move {
            while let Some(event) = watch.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                debug!(url, ?event, "file change");
                inner.schedule_refresh(&url);
            }
        })
    }

    // == Debounce ==
    /// Restarts the quiet-period timer of `url`; only the last timer of a burst fires.
    fn schedule_refresh(self: &Arc<Self>, url: &str) {
        let generation = self.debounce_seq.fetch_add(1, Ordering::Relaxed) + 1;

        // Held across spawn and insert so the timer never looks itself up too early
        let mut debounce = self.debounce.lock();
        let weak = Arc::downgrade(self);
        let delay = self.config.debounce();
        let owned = url.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut debounce = inner.debounce.lock();
                match debounce.get(&owned) {
                    Some((current, _)) if *current == generation => {
                        debounce.remove(&owned);
                    }
                    _ => return,
                }
            }
            inner.refresh(&owned).await;
        });

        if let Some((_, previous)) = debounce.insert(url.to_string(), (generation, timer)) {
            previous.abort();
        }
    }

    async fn refresh(self: &Arc<Self>, url: &str) {
        let path = self.mapper.map(url);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let cache_type = {
                let store = self.store.read().await;
                store
                    .cache_type(ENCODING_PLAIN, url)
                    .or_else(|| store.cache_type(self.codec.encoding(), url))
            }
            .unwrap_or_else(|| self.classify(url));

            info!(url, "backing file changed, refreshing");
            self.emit(CacheEvent::Notice(format!("refreshing {}", url)));
            self.enqueue_update(
                url,
                UpdateJob {
                    source: Source::Backing { force: true },
                    mime: None,
                    cache_type: Some(cache_type),
                    compress: true,
                    preprocessed: false,
                    allow_serve_raw: false,
                    reply: None,
                },
            );
        } else {
            info!(url, "backing file removed, clearing");
            self.store.write().await.clear(None, url);
        }
    }
}

async fn listen_store_events(inner: Weak<Inner>, mut events: UnboundedReceiver<StoreEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            StoreEvent::Set {
                key, cache_type, ..
            } if cache_type != CacheType::Permanent => inner.ensure_watch(&key).await,
            StoreEvent::Clear {
                key,
                remaining: false,
                ..
            } => inner.close_watches(&key),
            _ => {}
        }
    }
}

fn compress_error(url: &str, error: impl std::fmt::Display) -> PipelineError {
    PipelineError::Compress {
        url: url.to_string(),
        message: error.to_string(),
    }
}

fn panicked(url: &str, panic: &(dyn Any + Send)) -> PipelineError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    PipelineError::Prep {
        url: url.to_string(),
        message: format!("pipeline panicked: {}", message),
    }
}

fn aborted(url: &str) -> PipelineError {
    PipelineError::Prep {
        url: url.to_string(),
        message: "pipeline aborted".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            strip_query: true,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_normalize_strips_query() {
        let coordinator = Coordinator::new(config());

        assert_eq!(coordinator.inner.normalize("/a.css?v=3"), "/a.css");
        assert_eq!(coordinator.inner.normalize("/a.css"), "/a.css");
    }

    #[tokio::test]
    async fn test_negotiate_matches_whole_word() {
        let coordinator = Coordinator::new(config());
        let inner = &coordinator.inner;

        assert_eq!(inner.negotiate(Some("gzip, deflate")), "gzip");
        assert_eq!(inner.negotiate(Some("br;q=1.0, gzip;q=0.8")), "gzip");
        assert_eq!(inner.negotiate(Some("xgzipx")), ENCODING_PLAIN);
        assert_eq!(inner.negotiate(None), ENCODING_PLAIN);
    }

    #[tokio::test]
    async fn test_negotiate_plain_when_compression_disabled() {
        let coordinator = Coordinator::new(Config {
            compress: false,
            ..Config::default()
        });

        assert_eq!(coordinator.inner.negotiate(Some("gzip")), ENCODING_PLAIN);
        assert_eq!(coordinator.preferred_encoding(), ENCODING_PLAIN);
    }

    #[tokio::test]
    async fn test_default_classifier_is_strong() {
        let coordinator = Coordinator::new(Config::default());
        assert_eq!(coordinator.inner.classify("/anything"), CacheType::Strong);

        coordinator.set_classifier(|url| {
            if url.ends_with(".html") {
                CacheType::Weak
            } else {
                CacheType::Strong
            }
        });
        assert_eq!(coordinator.inner.classify("/index.html"), CacheType::Weak);
    }
}
