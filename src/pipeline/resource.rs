//! Request and Resource Types
//!
//! The request descriptor `fetch` consumes, the resource it produces, and the artifact the
//! pipeline hands to every waiter.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;

use crate::cache::{CacheType, ENCODING_PLAIN};
use crate::error::PipelineError;

/// Header names written by the annotate stage
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const ETAG: &str = "ETag";

// == Fetch Request ==
/// What `fetch` needs to know about an incoming request.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub url: String,
    pub accept_encoding: Option<String>,
    pub if_none_match: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn accept_encoding(mut self, value: impl Into<String>) -> Self {
        self.accept_encoding = Some(value.into());
        self
    }

    pub fn if_none_match(mut self, value: impl Into<String>) -> Self {
        self.if_none_match = Some(value.into());
        self
    }

    /// Builds a request from an HTTP path (query included) and its headers.
    pub fn from_http(path_and_query: &str, headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self {
            url: path_and_query.to_string(),
            accept_encoding: text(header::ACCEPT_ENCODING),
            if_none_match: text(header::IF_NONE_MATCH),
        }
    }
}

// == Set Options ==
/// Explicit population request.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub url: String,
    /// Content to cache; when absent the backing file is read
    pub content: Option<Bytes>,
    /// Content type; resolved from the path when absent
    pub mime: Option<String>,
    /// Cache type; `Permanent` for supplied content, classifier otherwise
    pub cache_type: Option<CacheType>,
    /// Skip the preprocess transform
    pub preprocessed: bool,
    /// Keep and return the plain form when compression fails
    pub allow_serve_raw: bool,
}

impl SetOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn cache_type(mut self, cache_type: CacheType) -> Self {
        self.cache_type = Some(cache_type);
        self
    }

    pub fn preprocessed(mut self, preprocessed: bool) -> Self {
        self.preprocessed = preprocessed;
        self
    }

    pub fn allow_serve_raw(mut self, allow: bool) -> Self {
        self.allow_serve_raw = allow;
        self
    }
}

// == Artifact ==
/// One representation produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub encoding: String,
    pub content: Bytes,
    pub headers: HashMap<String, String>,
}

/// Output of one pipeline run: the plain form and, when compression ran, the compressed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub plain: Variant,
    pub compressed: Option<Variant>,
}

impl Artifact {
    /// The variant for `encoding`, falling back to plain.
    pub fn select(&self, encoding: &str) -> &Variant {
        match &self.compressed {
            Some(variant) if variant.encoding == encoding => variant,
            _ => &self.plain,
        }
    }
}

// == Resource ==
/// Request-scoped result of `fetch`. Never persisted.
#[derive(Debug, Clone)]
pub struct Resource {
    pub url: String,
    pub encoding: String,
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    /// Served straight from the cache
    pub hit: bool,
    /// Install time of the served entry (Unix milliseconds)
    pub modified: Option<u64>,
    pub error: Option<PipelineError>,
}

impl Resource {
    /// Builds a 200, or a 304 with an empty body when `if_none_match` equals the ETag.
    pub fn conditional(
        url: &str,
        encoding: &str,
        headers: HashMap<String, String>,
        body: Bytes,
        if_none_match: Option<&str>,
    ) -> Self {
        let not_modified = match (if_none_match, headers.get(ETAG)) {
            (Some(requested), Some(etag)) => requested == etag,
            _ => false,
        };
        let (status, body) = if not_modified {
            (StatusCode::NOT_MODIFIED, Bytes::new())
        } else {
            (StatusCode::OK, body)
        };

        Self {
            url: url.to_string(),
            encoding: encoding.to_string(),
            status,
            headers,
            body,
            hit: false,
            modified: None,
            error: None,
        }
    }

    /// Error resource: 404 for read failures, 500 otherwise.
    pub fn failed(url: &str, error: PipelineError) -> Self {
        let mut headers = HashMap::new();
        headers.insert(CONTENT_TYPE.to_string(), "text/html".to_string());

        Self {
            url: url.to_string(),
            encoding: ENCODING_PLAIN.to_string(),
            status: error.status(),
            headers,
            body: Bytes::from(format!("{}.", error)),
            hit: false,
            modified: None,
            error: Some(error),
        }
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED
    }
}

impl IntoResponse for Resource {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}
