//! Pipeline Contracts
//!
//! Interfaces the coordinator consumes from its collaborators, plus the default adapters
//! used when the builder is not given a replacement.

use std::any::Any;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::future::{BoxFuture, FutureExt};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::cache::CacheType;

// == Path Mapper ==
/// Maps a URL to the path of its backing file.
pub trait PathMapper: Send + Sync {
    fn map(&self, url: &str) -> PathBuf;
}

/// Resolves URLs below a root directory, ignoring `.` and `..` segments.
#[derive(Debug, Clone)]
pub struct RootMapper {
    root: PathBuf,
}

impl RootMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathMapper for RootMapper {
    fn map(&self, url: &str) -> PathBuf {
        let mut path = self.root.clone();
        for component in Path::new(url.trim_start_matches('/')).components() {
            if let Component::Normal(segment) = component {
                path.push(segment);
            }
        }
        path
    }
}

// == Content-Type Resolver ==
pub trait ContentTypeResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> String;
}

/// Guesses the MIME type from the file extension.
#[derive(Debug, Clone, Default)]
pub struct MimeGuessResolver;

impl ContentTypeResolver for MimeGuessResolver {
    fn resolve(&self, path: &Path) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string()
    }
}

// == Compression Codec ==
/// Compresses whole payloads. `encoding` is the Content-Encoding token and the cache
/// encoding the output is stored under.
pub trait Codec: Send + Sync {
    fn encoding(&self) -> &str;
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// Gzip codec backed by flate2.
#[derive(Debug, Clone)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    /// Default level (6).
    pub fn new() -> Self {
        Self { level: 6 }
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipCodec {
    fn encoding(&self) -> &str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data)?;
        encoder.finish()
    }
}

// == Content Hasher ==
/// Produces the fingerprint used as ETag.
pub trait ContentHasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> String;
}

/// Hex-encoded SHA-256.
#[derive(Debug, Clone, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

// == File Watch Provider ==
/// Change notification for a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Modified,
    Removed,
}

/// An open watch. Dropping it closes the underlying watcher.
pub struct Watch {
    events: UnboundedReceiver<WatchEvent>,
    _guard: Box<dyn Any + Send>,
}

impl Watch {
    /// Wraps an event stream together with whatever keeps it alive.
    pub fn new(events: UnboundedReceiver<WatchEvent>, guard: impl Send + 'static) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }

    /// Next event, or `None` once the provider stops sending.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch").finish_non_exhaustive()
    }
}

/// Opens independent watches on single paths.
pub trait WatchProvider: Send + Sync {
    fn watch(&self, path: &Path) -> io::Result<Watch>;
}

/// Watches through the platform's recommended notify backend.
#[derive(Debug, Clone, Default)]
pub struct NotifyWatchProvider;

impl WatchProvider for NotifyWatchProvider {
    fn watch(&self, path: &Path) -> io::Result<Watch> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            let mapped = match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => WatchEvent::Modified,
                EventKind::Remove(_) => WatchEvent::Removed,
                _ => return,
            };
            let _ = tx.send(mapped);
        })
        .map_err(io::Error::other)?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(io::Error::other)?;

        Ok(Watch::new(rx, watcher))
    }
}

// == Strategies ==
/// Input handed to a preprocessing transform.
#[derive(Debug, Clone)]
pub struct PrepInput {
    pub url: String,
    pub path: PathBuf,
    pub content: Bytes,
}

/// Preprocessing transform. Synchronous transforms return a ready future.
pub type Transform = Arc<dyn Fn(PrepInput) -> BoxFuture<'static, anyhow::Result<Bytes>> + Send + Sync>;

/// Chooses the transform for a URL, if any.
pub type PrepProvider = Arc<dyn Fn(&str) -> Option<Transform> + Send + Sync>;

/// Assigns the cache type of a resource on a miss.
pub type Classifier = Arc<dyn Fn(&str) -> CacheType + Send + Sync>;

/// Wraps a synchronous function as a [`Transform`].
pub fn sync_transform<F>(f: F) -> Transform
where
    F: Fn(PrepInput) -> anyhow::Result<Bytes> + Send + Sync + 'static,
{
    Arc::new(move |input| futures::future::ready(f(input)).boxed())
}

/// Wraps an async function as a [`Transform`].
pub fn async_transform<F, Fut>(f: F) -> Transform
where
    F: Fn(PrepInput) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<Bytes>> + Send + 'static,
{
    Arc::new(move |input| f(input).boxed())
}
