//! In-process platform: artifacts and aspects held in maps.
//!
//! Implements both [`MetadataIndex`] and [`ObjectStore`] so a single value can
//! back a whole [`crate::job::ConversionJob`]. Every call is counted, which is
//! what the idempotence tests assert on.

use super::{AspectRecord, MetadataIndex, NewArtifact, ObjectContent, ObjectStore, StoredObject};
use crate::error::PlatformError;
use crate::schema::{ConversionResult, RESULT_SCHEMA};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// An artifact as held by [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArtifact {
    pub urn: String,
    pub name: String,
    pub mime_type: String,
    pub policy: String,
    pub content: Bytes,
}

#[derive(Default)]
pub struct MemoryPlatform {
    artifacts: Mutex<HashMap<String, MemoryArtifact>>,
    aspects: Mutex<Vec<AspectRecord>>,
    created: Mutex<Vec<MemoryArtifact>>,
    queries: AtomicUsize,
    resolves: AtomicUsize,
    creates: AtomicUsize,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a source artifact under a fresh URN and return it.
    pub fn insert_artifact(
        &self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> String {
        let urn = mint_urn();
        self.insert_artifact_at(urn.clone(), name, mime_type, content);
        urn
    }

    /// Store a source artifact under a caller-chosen URN.
    pub fn insert_artifact_at(
        &self,
        urn: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) {
        let urn = urn.into();
        let artifact = MemoryArtifact {
            urn: urn.clone(),
            name: name.into(),
            mime_type: mime_type.into(),
            policy: crate::schema::DEFAULT_POLICY.to_string(),
            content: content.into(),
        };
        lock(&self.artifacts).insert(urn, artifact);
    }

    /// Attach an aspect record to an entity.
    pub fn insert_aspect(&self, record: AspectRecord) {
        lock(&self.aspects).push(record);
    }

    /// Index a returned result under its `$id`, the way the platform does
    /// after the tool responds.
    pub fn index_result(&self, result: &ConversionResult) -> Result<(), PlatformError> {
        let content =
            serde_json::to_value(result).map_err(|e| PlatformError::Decode(e.to_string()))?;
        self.insert_aspect(AspectRecord {
            id: Some(mint_urn()),
            entity: result.linked_entity_id.clone(),
            schema: RESULT_SCHEMA.to_string(),
            content,
        });
        Ok(())
    }

    pub fn artifact(&self, urn: &str) -> Option<MemoryArtifact> {
        lock(&self.artifacts).get(urn).cloned()
    }

    /// Artifacts written through [`ObjectStore::create`], in creation order.
    pub fn created(&self) -> Vec<MemoryArtifact> {
        lock(&self.created).clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataIndex for MemoryPlatform {
    async fn query(
        &self,
        entity: &str,
        schema: &str,
        limit: usize,
    ) -> Result<Vec<AspectRecord>, PlatformError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let records: Vec<AspectRecord> = lock(&self.aspects)
            .iter()
            .filter(|r| r.entity == entity && r.schema == schema)
            .take(limit)
            .cloned()
            .collect();
        debug!("memory index: {} record(s) for {} @ {}", records.len(), entity, schema);
        Ok(records)
    }
}

#[async_trait]
impl ObjectStore for MemoryPlatform {
    async fn resolve(&self, urn: &str) -> Result<StoredObject, PlatformError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let artifact = self
            .artifact(urn)
            .ok_or_else(|| PlatformError::NotFound(urn.to_string()))?;
        Ok(StoredObject {
            urn: artifact.urn,
            name: artifact.name,
            mime_type: artifact.mime_type,
            size: Some(artifact.content.len() as u64),
            content: ObjectContent::from_bytes(artifact.content),
        })
    }

    async fn create(&self, artifact: NewArtifact) -> Result<String, PlatformError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let content = Bytes::from(artifact.content.read_to_end().await?);
        if content.len() as u64 != artifact.size {
            return Err(PlatformError::Status {
                status: 400,
                message: format!(
                    "declared size {} does not match {} bytes received",
                    artifact.size,
                    content.len()
                ),
            });
        }

        let stored = MemoryArtifact {
            urn: mint_urn(),
            name: artifact.name,
            mime_type: artifact.content_type,
            policy: artifact.policy,
            content,
        };
        let urn = stored.urn.clone();
        lock(&self.artifacts).insert(urn.clone(), stored.clone());
        lock(&self.created).push(stored);
        debug!("memory store: created {}", urn);
        Ok(urn)
    }
}

fn mint_urn() -> String {
    format!("urn:ivcap:artifact:{}", uuid::Uuid::new_v4())
}

// A poisoned lock only means another test thread panicked mid-update; the
// maps themselves are still consistent.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
