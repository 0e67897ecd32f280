//! reqwest client for the platform REST API.
//!
//! ## Endpoints
//!
//! ```text
//! GET  {base}/1/aspects?entity=..&schema=..&limit=..&include-content=true
//! GET  {base}/1/artifacts/{urn}          artifact metadata (name, mime-type, size, data-href)
//! GET  {data-href | base/1/artifacts/{urn}/blob}   content, streamed
//! POST {base}/1/artifacts?name=..&policy=..   content in body
//! ```
//!
//! Artifact names and policies travel as query parameters, so any UTF-8 name
//! arrives unchanged. The `X-Name` / `X-Policy` headers are sent as well, but
//! only when the value is plain visible ASCII and fits a header as-is.
//!
//! Content is never buffered here: downloads hand the response body stream to
//! the caller as [`ObjectContent`], uploads wrap the caller's stream as the
//! request body.

use super::{AspectRecord, MetadataIndex, NewArtifact, ObjectContent, ObjectStore, StoredObject};
use crate::config::ServiceConfig;
use crate::error::PlatformError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::io;
use std::time::Duration;
use tracing::debug;

/// Longest error body we copy into a [`PlatformError::Status`] message.
const MAX_ERROR_BODY: usize = 512;

const X_NAME: &str = "X-Name";
const X_POLICY: &str = "X-Policy";

#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AspectList {
    #[serde(default)]
    items: Vec<AspectRecord>,
}

#[derive(Debug, Deserialize)]
struct ArtifactMeta {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "mime-type", default)]
    mime_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(rename = "data-href", default)]
    data_href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedArtifact {
    id: String,
}

impl PlatformClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, PlatformError> {
        let base_url = Url::parse(&config.platform_url).map_err(|e| {
            PlatformError::InvalidConfig(format!("platform URL '{}': {e}", config.platform_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PlatformError::InvalidConfig(format!(
                "platform URL '{}' cannot be used as a base",
                config.platform_url
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.platform_timeout_secs))
            .build()
            .map_err(|e| PlatformError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            auth_token: config.auth_token.clone(),
        })
    }

    /// `{base}/seg/seg/...`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => rb.header(AUTHORIZATION, format!("Bearer {token}")),
            None => rb,
        }
    }

    async fn send(&self, rb: RequestBuilder, subject: &str) -> Result<Response, PlatformError> {
        let response = self
            .authorize(rb)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        check_status(response, subject).await
    }

    /// Resolve the content location: the advertised data href if there is
    /// one (absolute, or relative to the base URL), else the blob endpoint.
    fn content_url(&self, urn: &str, data_href: Option<&str>) -> Url {
        data_href
            .and_then(|href| Url::parse(href).or_else(|_| self.base_url.join(href)).ok())
            .unwrap_or_else(|| self.endpoint(&["1", "artifacts", urn, "blob"]))
    }
}

#[async_trait]
impl MetadataIndex for PlatformClient {
    async fn query(
        &self,
        entity: &str,
        schema: &str,
        limit: usize,
    ) -> Result<Vec<AspectRecord>, PlatformError> {
        let url = self.endpoint(&["1", "aspects"]);
        let limit = limit.to_string();
        let rb = self.http.get(url).query(&[
            ("entity", entity),
            ("schema", schema),
            ("limit", limit.as_str()),
            ("include-content", "true"),
        ]);

        let list: AspectList = self
            .send(rb, entity)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))?;
        debug!("aspect query {} @ {}: {} item(s)", entity, schema, list.items.len());
        Ok(list.items)
    }
}

#[async_trait]
impl ObjectStore for PlatformClient {
    async fn resolve(&self, urn: &str) -> Result<StoredObject, PlatformError> {
        let meta: ArtifactMeta = self
            .send(self.http.get(self.endpoint(&["1", "artifacts", urn])), urn)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))?;

        let content_url = self.content_url(urn, meta.data_href.as_deref());
        debug!("downloading {} from {}", urn, content_url);
        let response = self.send(self.http.get(content_url), urn).await?;
        let size = meta.size.or_else(|| response.content_length());
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));

        Ok(StoredObject {
            urn: urn.to_string(),
            name: meta.name.unwrap_or_else(|| urn.to_string()),
            mime_type: meta.mime_type.unwrap_or_default(),
            size,
            content: ObjectContent::from_stream(stream.boxed()),
        })
    }

    async fn create(&self, artifact: NewArtifact) -> Result<String, PlatformError> {
        let name = artifact.name.clone();
        let mut rb = self
            .http
            .post(self.endpoint(&["1", "artifacts"]))
            .query(&[("name", &artifact.name), ("policy", &artifact.policy)])
            .header(CONTENT_TYPE, artifact.content_type)
            .header(CONTENT_LENGTH, artifact.size);
        for (header, value) in [(X_NAME, &artifact.name), (X_POLICY, &artifact.policy)] {
            if fits_header(value) {
                rb = rb.header(header, value.as_str());
            }
        }
        let rb = rb.body(reqwest::Body::wrap_stream(artifact.content.into_stream()));

        let created: CreatedArtifact = self
            .send(rb, &name)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))?;
        debug!("uploaded '{}' as {}", name, created.id);
        Ok(created.id)
    }
}

/// Map non-success statuses onto [`PlatformError`] variants.
async fn check_status(response: Response, subject: &str) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound(subject.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(PlatformError::AccessDenied(subject.to_string()))
        }
        _ => {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            Err(PlatformError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Whether `value` can be sent as a header without being altered.
fn fits_header(value: &str) -> bool {
    !value.is_empty()
        && value == value.trim()
        && value.chars().all(|c| c.is_ascii_graphic() || c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> PlatformClient {
        let config = ServiceConfig::builder()
            .platform_url(base)
            .build()
            .expect("valid config");
        PlatformClient::new(&config).expect("client")
    }

    #[test]
    fn endpoint_percent_encodes_urns() {
        let c = client("https://platform.example.com/");
        let url = c.endpoint(&["1", "artifacts", "urn:ivcap:artifact:a b"]);
        assert_eq!(
            url.as_str(),
            "https://platform.example.com/1/artifacts/urn:ivcap:artifact:a%20b"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let c = client("https://platform.example.com/api");
        let url = c.endpoint(&["1", "aspects"]);
        assert_eq!(url.as_str(), "https://platform.example.com/api/1/aspects");
    }

    #[test]
    fn content_url_prefers_data_href() {
        let c = client("https://platform.example.com");
        let abs = c.content_url("urn:x", Some("https://blobs.example.com/x"));
        assert_eq!(abs.as_str(), "https://blobs.example.com/x");

        let rel = c.content_url("urn:x", Some("/1/artifacts/urn:x/blob"));
        assert_eq!(rel.as_str(), "https://platform.example.com/1/artifacts/urn:x/blob");

        let fallback = c.content_url("urn:x", None);
        assert_eq!(fallback.as_str(), "https://platform.example.com/1/artifacts/urn:x/blob");
    }

    #[test]
    fn only_plain_ascii_values_go_in_headers() {
        assert!(fits_header("report 2024.pdf.md"));
        assert!(fits_header("urn:ivcap:policy:ivcap.base.artifact"));
        assert!(!fits_header("Résumé.txt.md"));
        assert!(!fits_header("tab\there"));
        assert!(!fits_header(" padded"));
        assert!(!fits_header(""));
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let config = ServiceConfig {
            platform_url: "not a url".into(),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            PlatformClient::new(&config),
            Err(PlatformError::InvalidConfig(_))
        ));
    }
}
