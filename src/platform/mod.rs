//! Collaborator interfaces for the storage and indexing platform.
//!
//! The job never talks to the platform directly; it receives an
//! [`Arc<dyn MetadataIndex>`](MetadataIndex) and an
//! [`Arc<dyn ObjectStore>`](ObjectStore). Two implementations ship with the
//! crate:
//!
//! * [`http::PlatformClient`]: reqwest client for the platform REST API.
//! * [`memory::MemoryPlatform`]: in-process maps with call counters, used by
//!   tests and the crate-level example.
//!
//! ## Content handles
//!
//! Artifact bodies travel as [`ObjectContent`], a boxed byte stream. It is
//! consumed by value, so whoever holds it last drops it, and dropping releases
//! the underlying HTTP connection or buffer. There is no separate `close`.

pub mod http;
pub mod memory;

use crate::error::PlatformError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Read-only lookup of aspects attached to an entity.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Return at most `limit` records attached to `entity` with `schema`.
    async fn query(
        &self,
        entity: &str,
        schema: &str,
        limit: usize,
    ) -> Result<Vec<AspectRecord>, PlatformError>;
}

/// Read and create access to stored artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolve an artifact URN to its metadata and a content handle.
    async fn resolve(&self, urn: &str) -> Result<StoredObject, PlatformError>;

    /// Store a new artifact and return its URN.
    async fn create(&self, artifact: NewArtifact) -> Result<String, PlatformError>;
}

/// A structured record attached to an entity in the metadata index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub entity: String,
    pub schema: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// An artifact resolved from the object store.
#[derive(Debug)]
pub struct StoredObject {
    pub urn: String,
    pub name: String,
    /// Declared media type; may be empty when the uploader did not set one.
    pub mime_type: String,
    pub size: Option<u64>,
    pub content: ObjectContent,
}

impl StoredObject {
    /// The declared media type, or one guessed from the name when the
    /// declared type is missing or generic.
    pub fn effective_mime_type(&self) -> String {
        let declared = self.mime_type.trim();
        if !declared.is_empty() && declared != "application/octet-stream" {
            return declared.to_string();
        }
        mime_guess::from_path(&self.name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// A new artifact to be written to the object store.
#[derive(Debug)]
pub struct NewArtifact {
    pub name: String,
    pub content_type: String,
    /// Exact byte length of `content`.
    pub size: u64,
    pub policy: String,
    pub content: ObjectContent,
}

/// Scoped, single-use byte stream of an artifact's content.
pub struct ObjectContent {
    stream: BoxStream<'static, io::Result<Bytes>>,
}

impl ObjectContent {
    pub fn from_stream(stream: BoxStream<'static, io::Result<Bytes>>) -> Self {
        Self { stream }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::from_stream(stream::once(async move { Ok(bytes) }).boxed())
    }

    /// Drain the stream into memory, releasing it afterwards.
    pub async fn read_to_end(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }

    pub fn into_stream(self) -> BoxStream<'static, io::Result<Bytes>> {
        self.stream
    }
}

impl fmt::Debug for ObjectContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObjectContent(<stream>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, mime: &str) -> StoredObject {
        StoredObject {
            urn: "urn:test".into(),
            name: name.into(),
            mime_type: mime.into(),
            size: None,
            content: ObjectContent::from_bytes(Bytes::new()),
        }
    }

    #[test]
    fn declared_mime_type_wins() {
        assert_eq!(object("report.bin", "application/pdf").effective_mime_type(), "application/pdf");
    }

    #[test]
    fn generic_mime_type_falls_back_to_extension() {
        assert_eq!(
            object("report.pdf", "application/octet-stream").effective_mime_type(),
            "application/pdf"
        );
        assert_eq!(object("notes.txt", "").effective_mime_type(), "text/plain");
        assert_eq!(object("blob", "").effective_mime_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn read_to_end_concatenates_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"%PDF")), Ok(Bytes::from_static(b"-1.7"))];
        let content = ObjectContent::from_stream(stream::iter(chunks).boxed());
        assert_eq!(content.read_to_end().await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn read_to_end_surfaces_stream_errors() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let content = ObjectContent::from_stream(stream::iter(chunks).boxed());
        let err = content.read_to_end().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
