//! Request DTOs for the cache admin API

use serde::Deserialize;

use crate::cache::CacheType;
use crate::pipeline::SetOptions;

/// Query of `DELETE /_cache/entries`
///
/// # Fields
/// - `url`: URL whose cached encodings are dropped
/// - `encoding`: Only drop this encoding when given
#[derive(Debug, Clone, Deserialize)]
pub struct ClearRequest {
    pub url: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Body of `PUT /_cache/entries`
///
/// Without `content` the backing file is re-read through the full pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// URL to populate
    pub url: String,
    /// Content to install as a permanent entry
    #[serde(default)]
    pub content: Option<String>,
    /// Content type; guessed from the path when absent
    #[serde(default)]
    pub mime: Option<String>,
    /// Retention policy (`weak`, `strong`, `permanent`, `none`); defaults to `permanent`
    /// for supplied content and to the classifier otherwise
    #[serde(default)]
    pub cache_type: Option<CacheType>,
    /// Skip the preprocess transform
    #[serde(default)]
    pub preprocessed: bool,
    /// Keep the plain form when compression fails
    #[serde(default)]
    pub allow_serve_raw: bool,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if !self.url.starts_with('/') {
            return Some("URL must start with '/'".to_string());
        }
        if self.url.len() > 2048 {
            return Some("URL exceeds maximum length of 2048 characters".to_string());
        }
        None
    }

    pub fn into_options(self) -> SetOptions {
        let mut options = SetOptions::new(self.url)
            .preprocessed(self.preprocessed)
            .allow_serve_raw(self.allow_serve_raw);
        if let Some(content) = self.content {
            options = options.content(content);
        }
        if let Some(mime) = self.mime {
            options = options.mime(mime);
        }
        if let Some(cache_type) = self.cache_type {
            options = options.cache_type(cache_type);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_request_deserialize() {
        let req: ClearRequest = serde_json::from_str(r#"{"url": "/a.css"}"#).unwrap();
        assert_eq!(req.url, "/a.css");
        assert!(req.encoding.is_none());
    }

    #[test]
    fn test_set_request_defaults() {
        let req: SetRequest = serde_json::from_str(r#"{"url": "/a.css"}"#).unwrap();
        assert!(req.content.is_none());
        assert!(req.cache_type.is_none());
        assert!(!req.preprocessed);
        assert!(!req.allow_serve_raw);
    }

    #[test]
    fn test_validate_relative_url() {
        let req: SetRequest = serde_json::from_str(r#"{"url": "a.css"}"#).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_into_options_carries_content() {
        let req: SetRequest =
            serde_json::from_str(r#"{"url": "/a.txt", "content": "hi", "mime": "text/plain"}"#)
                .unwrap();
        assert!(req.validate().is_none());

        let options = req.into_options();
        assert_eq!(options.url, "/a.txt");
        assert_eq!(options.content.as_deref(), Some(&b"hi"[..]));
        assert_eq!(options.mime.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_cache_type_is_passed_through() {
        let req: SetRequest =
            serde_json::from_str(r#"{"url": "/a.css", "cache_type": "weak"}"#).unwrap();
        assert_eq!(req.cache_type, Some(CacheType::Weak));

        let options = req.into_options();
        assert_eq!(options.cache_type, Some(CacheType::Weak));
    }

    #[test]
    fn test_unknown_cache_type_is_rejected() {
        let result: Result<SetRequest, _> =
            serde_json::from_str(r#"{"url": "/a.css", "cache_type": "sticky"}"#);
        assert!(result.is_err());
    }
}
