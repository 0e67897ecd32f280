//! # markdown-conversion-service
//!
//! Convert a stored document to Markdown, once. Conversions are cached by
//! source document: the result is returned to the platform, which indexes it
//! as an aspect of the source, and the next request for the same document is
//! answered from that index without fetching or converting anything.
//!
//! ## Pipeline
//!
//! ```text
//! ConversionRequest { document }
//!  │
//!  ├─ 1. Lookup   MetadataIndex: result already indexed for this document?  → return it
//!  ├─ 2. Fetch    ObjectStore: name, media type, content stream
//!  ├─ 3. Convert  FormatConverter: text, JSON, HTML, CSV; PDF via vision model or text layer
//!  ├─ 4. Upload   ObjectStore: "{name}.md", text/markdown, request policy
//!  └─ 5. Link     ConversionResult { $id: document, markdown_urn }
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use markdown_conversion::platform::memory::MemoryPlatform;
//! use markdown_conversion::{ConversionJob, ConversionRequest, ConverterRegistry, DEFAULT_POLICY};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = Arc::new(MemoryPlatform::new());
//! let doc = platform.insert_artifact("notes.txt", "text/plain", "hello");
//!
//! let job = ConversionJob::new(
//!     platform.clone(),
//!     platform.clone(),
//!     Arc::new(ConverterRegistry::with_defaults()),
//!     DEFAULT_POLICY,
//! );
//! let result = job.convert(&ConversionRequest::new(&doc)).await?;
//! assert_eq!(result.linked_entity_id, doc);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `server` | on | axum HTTP surface and the `md-conversion-service` binary |
//! | `vision` | on | PDF support through pdfium + a vision LLM (edgequake-llm) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod error;
pub mod job;
pub mod platform;
pub mod schema;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use converter::{ConverterRegistry, FormatConverter};
pub use error::{ConverterError, JobError, PlatformError};
pub use job::ConversionJob;
pub use platform::{MetadataIndex, ObjectContent, ObjectStore};
pub use schema::{ConversionRequest, ConversionResult, DEFAULT_POLICY, RESULT_SCHEMA};
