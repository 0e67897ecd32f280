//! The conversion job: cache lookup, fetch, convert, upload, link.
//!
//! ```text
//! request ─▶ 1. index.query(document, RESULT_SCHEMA, 1) ──hit──▶ cached result
//!              │ miss
//!              ├─ 2. store.resolve(document)        name, mime type, content
//!              ├─ 3. converter.convert(content)     markdown text
//!              ├─ 4. store.create("{name}.md")      new artifact URN
//!              └─ 5. ConversionResult { $id: document, markdown_urn }
//! ```
//!
//! The job never writes to the index. The platform indexes the returned
//! result under `$id`, which is what turns step 1 into a hit next time.
//!
//! Two concurrent requests for the same document can both miss in step 1
//! and both convert and upload. Nothing here coordinates them.

use crate::converter::FormatConverter;
use crate::error::{ConverterError, JobError};
use crate::platform::{MetadataIndex, NewArtifact, ObjectContent, ObjectStore};
use crate::schema::{ConversionRequest, ConversionResult, MARKDOWN_MIME_TYPE, RESULT_SCHEMA};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Orchestrates one conversion per [`ConversionJob::convert`] call.
///
/// Cheap to clone; all collaborators are shared handles.
#[derive(Clone)]
pub struct ConversionJob {
    index: Arc<dyn MetadataIndex>,
    store: Arc<dyn ObjectStore>,
    converter: Arc<dyn FormatConverter>,
    default_policy: String,
}

impl ConversionJob {
    pub fn new(
        index: Arc<dyn MetadataIndex>,
        store: Arc<dyn ObjectStore>,
        converter: Arc<dyn FormatConverter>,
        default_policy: impl Into<String>,
    ) -> Self {
        Self {
            index,
            store,
            converter,
            default_policy: default_policy.into(),
        }
    }

    pub fn default_policy(&self) -> &str {
        &self.default_policy
    }

    /// Convert `request.document` to Markdown, or return the cached result.
    ///
    /// # Errors
    /// Every step's failure aborts the invocation; see [`JobError`]. When an
    /// error is returned no result exists to be indexed, though an artifact
    /// uploaded before an outer timeout fired may remain.
    #[tracing::instrument(skip(self, request), fields(document = %request.document))]
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, JobError> {
        let started = Instant::now();
        let result = self.run(request).await;
        match &result {
            Ok(r) => debug!("finished in {}ms → {}", started.elapsed().as_millis(), r.markdown_urn),
            Err(e) => error!(step = e.step(), "conversion of {} failed: {}", e.document(), e),
        }
        result
    }

    async fn run(&self, request: &ConversionRequest) -> Result<ConversionResult, JobError> {
        let document = request.document.as_str();

        // ── Step 1: cache lookup ──────────────────────────────────────────
        if let Some(cached) = self.cached_result(document).await? {
            info!("Using cached conversion: {}", cached.markdown_urn);
            return Ok(cached);
        }

        // ── Step 2: fetch ────────────────────────────────────────────────
        info!("Converting document: {}", document);
        let object = self
            .store
            .resolve(document)
            .await
            .map_err(|source| JobError::Resolution {
                document: document.to_string(),
                source,
            })?;
        let mime_type = object.effective_mime_type();
        debug!(
            "resolved '{}' ({}, {} bytes)",
            object.name,
            mime_type,
            object.size.map_or_else(|| "?".to_string(), |s| s.to_string())
        );

        // ── Step 3: convert (content handle is consumed here) ────────────
        let conversion_error = |source| JobError::Conversion {
            document: document.to_string(),
            source,
        };
        let markdown = self
            .converter
            .convert(object.content, &mime_type)
            .await
            .map_err(conversion_error)?;
        if markdown.trim().is_empty() {
            return Err(conversion_error(ConverterError::EmptyOutput));
        }

        // ── Step 4: upload ───────────────────────────────────────────────
        let policy = request
            .policy
            .clone()
            .unwrap_or_else(|| self.default_policy.clone());
        let bytes = markdown.into_bytes();
        let artifact = NewArtifact {
            name: format!("{}.md", object.name),
            content_type: MARKDOWN_MIME_TYPE.to_string(),
            size: bytes.len() as u64,
            policy: policy.clone(),
            content: ObjectContent::from_bytes(bytes),
        };
        let markdown_urn =
            self.store
                .create(artifact)
                .await
                .map_err(|source| JobError::Storage {
                    document: document.to_string(),
                    source,
                })?;
        info!("Uploaded markdown to {}", markdown_urn);

        // ── Step 5: link ─────────────────────────────────────────────────
        Ok(ConversionResult::new(document, markdown_urn, Some(policy)))
    }

    /// First indexed result for `document`, if one exists and parses.
    async fn cached_result(&self, document: &str) -> Result<Option<ConversionResult>, JobError> {
        let records = self
            .index
            .query(document, RESULT_SCHEMA, 1)
            .await
            .map_err(|source| JobError::IndexLookup {
                document: document.to_string(),
                source,
            })?;

        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };
        match serde_json::from_value::<ConversionResult>(record.content) {
            Ok(mut cached) => {
                if cached.linked_entity_id.is_empty() {
                    cached.linked_entity_id = record.entity;
                }
                Ok(Some(cached))
            }
            Err(e) => {
                warn!(
                    "ignoring unreadable cached record {:?} for {}: {}",
                    record.id, document, e
                );
                Ok(None)
            }
        }
    }
}
