//! Pipeline Module
//!
//! Fetch/update coordination on top of the cache store: miss coalescing, per-URL update
//! queues, the preprocess → compress → annotate pipeline, readiness and file watches.

pub mod contracts;
mod coordinator;
mod events;
mod readiness;
mod resource;

pub use contracts::{
    async_transform, sync_transform, Classifier, Codec, ContentHasher, ContentTypeResolver,
    GzipCodec, MimeGuessResolver, NotifyWatchProvider, PathMapper, PrepInput, PrepProvider,
    RootMapper, Sha256Hasher, Transform, Watch, WatchEvent, WatchProvider,
};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use events::{CacheEvent, EVENT_CAPACITY};
pub use readiness::{PendingGuard, ReadyBarrier};
pub use resource::{
    Artifact, FetchRequest, Resource, SetOptions, Variant, CONTENT_ENCODING, CONTENT_TYPE, ETAG,
};
