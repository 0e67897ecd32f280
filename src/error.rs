//! Error types for the markdown conversion job.
//!
//! Three layers, one per collaborator boundary:
//!
//! * [`PlatformError`]: a call to the metadata index or the object store
//!   failed (missing artifact, access denied, HTTP or decoding trouble).
//! * [`ConverterError`]: a [`crate::converter::FormatConverter`] could not
//!   turn the bytes into Markdown.
//! * [`JobError`]: what [`crate::job::ConversionJob::convert`] returns. Each
//!   variant wraps one of the above and carries the source document URN so
//!   the failure can be diagnosed from a single log line.
//!
//! Every `JobError` aborts the invocation. Nothing is retried at this level:
//! conversion failures are deterministic for the same bytes, and the platform
//! calls are surfaced as-is.

use thiserror::Error;

/// Fatal errors returned by [`crate::job::ConversionJob::convert`].
#[derive(Debug, Error)]
pub enum JobError {
    /// The cache lookup against the metadata index failed.
    #[error("cache lookup for '{document}' failed: {source}")]
    IndexLookup {
        document: String,
        #[source]
        source: PlatformError,
    },

    /// The source document could not be resolved or is not accessible.
    #[error("could not resolve document '{document}': {source}")]
    Resolution {
        document: String,
        #[source]
        source: PlatformError,
    },

    /// The converter rejected the content or produced no usable Markdown.
    #[error("failed to convert document '{document}' to markdown: {source}")]
    Conversion {
        document: String,
        #[source]
        source: ConverterError,
    },

    /// Uploading the Markdown artifact failed.
    #[error("failed to store markdown for '{document}': {source}")]
    Storage {
        document: String,
        #[source]
        source: PlatformError,
    },
}

impl JobError {
    /// Name of the pipeline step that failed, for log fields.
    pub fn step(&self) -> &'static str {
        match self {
            JobError::IndexLookup { .. } => "cache-lookup",
            JobError::Resolution { .. } => "fetch",
            JobError::Conversion { .. } => "convert",
            JobError::Storage { .. } => "upload",
        }
    }

    /// URN of the document the failing invocation was working on.
    pub fn document(&self) -> &str {
        match self {
            JobError::IndexLookup { document, .. }
            | JobError::Resolution { document, .. }
            | JobError::Conversion { document, .. }
            | JobError::Storage { document, .. } => document,
        }
    }
}

/// Failures talking to the metadata index or the object store.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// No entity/artifact with that identifier exists.
    #[error("'{0}' not found")]
    NotFound(String),

    /// The caller may not read or write the identifier (HTTP 401/403).
    #[error("access to '{0}' denied")]
    AccessDenied(String),

    /// The platform answered with a non-success status.
    #[error("platform returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, timeout, reset).
    #[error("platform request failed: {0}")]
    Transport(String),

    /// A response body could not be decoded.
    #[error("unexpected platform response: {0}")]
    Decode(String),

    /// Reading or writing a content stream failed.
    #[error("content stream error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid platform configuration: {0}")]
    InvalidConfig(String),
}

/// Failures inside a format converter.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// No registered converter handles the declared media type.
    #[error("unsupported media type '{mime_type}'")]
    UnsupportedFormat { mime_type: String },

    /// The converter finished but produced no text.
    #[error("converter produced no markdown output")]
    EmptyOutput,

    /// Text content was not valid UTF-8.
    #[error("content is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),

    /// The bytes do not match the declared format.
    #[error("content is not a readable {format} document: {detail}")]
    Unreadable { format: String, detail: String },

    /// Reading the content stream failed.
    #[error("failed to read document content: {0}")]
    Read(#[from] std::io::Error),

    /// The PDF engine could not be loaded or failed on a page.
    #[error("PDF engine error: {0}")]
    Pdf(String),

    /// The vision model provider is not usable.
    #[error("LLM provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// One or more pages failed after all retries.
    #[error("{failed}/{total} pages failed to convert; first error: {first_error}")]
    PagesFailed {
        failed: usize,
        total: usize,
        first_error: String,
    },

    /// Unexpected internal error (task panicked, encoder failure).
    #[error("internal converter error: {0}")]
    Internal(String),
}
