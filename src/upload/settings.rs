//! Uploader settings and target resolution

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::constants::{AGENT_QUERY_VALUE, DEFAULT_CONNECT_TIMEOUT_MS, WEBM_ITAG_QUERY_VALUE};
use crate::error::UploadError;

/// How chunks are placed in the POST body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostMode {
    /// Chunk bytes are the request body
    #[default]
    Raw,
    /// Chunk is sent as file data in a multipart form (RFC 1867)
    Form,
}

/// Uploader configuration, captured once at init
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderSettings {
    /// Target for HTTP POSTs
    pub target_url: String,

    /// Extra HTTP headers sent with every POST
    pub headers: BTreeMap<String, String>,

    /// Form variables sent with every form POST
    pub form_variables: BTreeMap<String, String>,

    pub post_mode: PostMode,

    /// Stream ID, required when `target_url` has no query string
    pub stream_id: String,

    /// Stream name, required when `target_url` has no query string
    pub stream_name: String,

    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            headers: BTreeMap::new(),
            form_variables: BTreeMap::new(),
            post_mode: PostMode::Raw,
            stream_id: String::new(),
            stream_name: String::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl UploaderSettings {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            ..Default::default()
        }
    }

    /// Validate the settings and build the resolved upload target
    pub fn resolve(&self) -> Result<UploadTarget, UploadError> {
        let url = normalize_target_url(&self.target_url, &self.stream_id, &self.stream_name)?;
        let headers = build_headers(&self.headers)?;

        if self.post_mode == PostMode::Raw && !self.form_variables.is_empty() {
            tracing::warn!(
                "{} form variables ignored, they are only sent with form POSTs",
                self.form_variables.len()
            );
        }

        let file_name = if self.stream_name.is_empty() {
            "chunk.webm".to_string()
        } else {
            format!("{}.webm", self.stream_name)
        };

        Ok(UploadTarget {
            url,
            headers,
            form_variables: self.form_variables.clone(),
            post_mode: self.post_mode,
            file_name,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        })
    }
}

/// Validated, ready-to-use upload destination
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub url: Url,
    pub headers: HeaderMap,
    pub form_variables: BTreeMap<String, String>,
    pub post_mode: PostMode,
    /// File name used for the form file part
    pub file_name: String,
    pub connect_timeout: Duration,
}

/// Parse `target_url`, appending the stream query parameters when the URL
/// has no query string of its own.
pub fn normalize_target_url(
    target_url: &str,
    stream_id: &str,
    stream_name: &str,
) -> Result<Url, UploadError> {
    let target_url = target_url.trim();
    if target_url.is_empty() {
        return Err(UploadError::InvalidArgument("target URL is empty".into()));
    }

    let mut url = Url::parse(target_url).map_err(|e| {
        UploadError::InvalidArgument(format!("invalid target URL {}: {}", target_url, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UploadError::InvalidArgument(format!(
            "unsupported URL scheme: {}",
            url.scheme()
        )));
    }

    // A query string that is already present is used verbatim.
    if url.query().is_none() {
        if stream_id.is_empty() || stream_name.is_empty() {
            return Err(UploadError::InvalidArgument(
                "stream_id and stream_name are required when the target URL lacks a query string"
                    .into(),
            ));
        }
        url.query_pairs_mut()
            .append_pair("ns", stream_name)
            .append_pair("id", stream_id)
            .append_pair("agent", AGENT_QUERY_VALUE)
            .append_pair("itag", WEBM_ITAG_QUERY_VALUE);
    }

    Ok(url)
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap, UploadError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| UploadError::InvalidArgument(format!("invalid header name: {}", name)))?;
        let header_value = HeaderValue::from_str(value.trim()).map_err(|_| {
            UploadError::InvalidArgument(format!("invalid value for header {}", name))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
