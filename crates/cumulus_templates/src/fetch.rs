//! Template body retrieval.
//!
//! Locations may be local paths, `http(s)://` URLs or `s3://bucket/key`
//! URLs. S3 query parameters (`?VersionId=...`) are passed to GetObject.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use cumulus_providers::AwsApi;

use crate::error::{TemplateError, TemplateResult};

/// Environment variable holding a prefix joined to every template location.
pub const URL_PREFIX_ENV: &str = "CUMULUS_TEMPLATE_URL_PREFIX";

/// Fetches template bodies.
pub struct TemplateFetcher {
    aws: Arc<dyn AwsApi>,
    http: reqwest::blocking::Client,
    prefix: Option<String>,
}

impl TemplateFetcher {
    /// Create a fetcher using `aws` for S3 objects and no URL prefix.
    pub fn new(aws: Arc<dyn AwsApi>) -> Self {
        Self {
            aws,
            http: reqwest::blocking::Client::new(),
            prefix: None,
        }
    }

    /// Create a fetcher with the prefix taken from the environment.
    pub fn from_env(aws: Arc<dyn AwsApi>) -> Self {
        let prefix = std::env::var(URL_PREFIX_ENV).ok().filter(|p| !p.is_empty());
        Self::new(aws).with_prefix(prefix)
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix;
        self
    }

    /// The location after applying the prefix.
    pub fn locate(&self, location: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                location.trim_start_matches('/')
            ),
            None => location.to_string(),
        }
    }

    /// Fetch the body at `location`. Returns the effective location and the text.
    pub fn fetch(&self, location: &str) -> TemplateResult<(String, String)> {
        let location = self.locate(location);
        debug!("Fetching template from {}", location);

        let url = match Url::parse(&location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let body = std::fs::read_to_string(&location)?;
                return Ok((location, body));
            }
            Err(e) => {
                return Err(TemplateError::InvalidLocation {
                    location,
                    message: e.to_string(),
                })
            }
        };

        let body = match url.scheme() {
            "http" | "https" => self.fetch_http(&location)?,
            "s3" => self.fetch_s3(&url, &location)?,
            // Windows drive letters parse as a one-letter scheme.
            scheme if scheme.len() == 1 => std::fs::read_to_string(&location)?,
            scheme => return Err(TemplateError::UnsupportedScheme(scheme.to_string())),
        };
        Ok((location, body))
    }

    fn fetch_http(&self, location: &str) -> TemplateResult<String> {
        let wrap = |source| TemplateError::Http {
            url: location.to_string(),
            source,
        };
        self.http
            .get(location)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(wrap)
    }

    fn fetch_s3(&self, url: &Url, location: &str) -> TemplateResult<String> {
        let bucket = url.host_str().unwrap_or_default();
        let key = url.path().trim_start_matches('/');
        let extra_args: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        self.aws
            .get_object(bucket, key, &extra_args)
            .map_err(|err| match err.code() {
                Some("NoSuchBucket") => TemplateError::BucketNotFound(bucket.to_string()),
                Some("NoSuchKey") => TemplateError::ObjectNotFound(location.to_string()),
                _ => TemplateError::Provider(err),
            })
    }
}
