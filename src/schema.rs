//! Wire types for the conversion tool.
//!
//! The request and result are explicit structs with fixed serde renames. The
//! `$`-prefixed names (`$schema`, `$id`, `$policy`) follow the indexing
//! platform's conventions: the platform stores a returned result as an aspect
//! of the entity named by `$id`, tagged with `$schema`. That is how a later
//! cache lookup finds it.
//!
//! Field names used by already-indexed records (`document`, `policy`,
//! `markdown_urn`) are what we serialise; the longer descriptive names
//! (`documentRef`, `accessPolicy`, `markdownRef`) are accepted as aliases.

use schemars::{JsonSchema, Schema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema tag of the current request version.
pub const REQUEST_SCHEMA: &str = "urn:sd:schema.markdown-conversion.request.2";

/// Every request version shares this prefix.
pub const REQUEST_SCHEMA_PREFIX: &str = "urn:sd:schema.markdown-conversion.request.";

/// Schema tag of results, and the schema the cache lookup queries.
pub const RESULT_SCHEMA: &str = "urn:sd:schema.markdown-conversion.1";

/// Policy applied to created artifacts when the request names none.
pub const DEFAULT_POLICY: &str = "urn:ivcap:policy:ivcap.base.artifact";

/// MIME type of every artifact this job creates.
pub const MARKDOWN_MIME_TYPE: &str = "text/markdown";

/// Ask for a stored document to be converted to Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConversionRequest {
    #[serde(rename = "$schema", default = "default_request_schema")]
    pub schema: String,

    /// URN of the artifact to convert.
    #[serde(alias = "documentRef")]
    pub document: String,

    /// Policy for the created markdown artifact.
    #[serde(
        default,
        alias = "$policy",
        alias = "accessPolicy",
        skip_serializing_if = "Option::is_none"
    )]
    pub policy: Option<String>,
}

fn default_request_schema() -> String {
    REQUEST_SCHEMA.to_string()
}

/// Why a request was rejected before the job ran.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("unsupported request schema '{0}', expected '{REQUEST_SCHEMA}'")]
    UnknownSchema(String),

    #[error("'document' must be a non-empty artifact URN")]
    MissingDocument,
}

impl ConversionRequest {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            schema: default_request_schema(),
            document: document.into(),
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Check the schema tag (`...markdown-conversion.request.<n>`, numeric `n`) and
    /// the document reference.
    ///
    /// Existence of the document is not checked here; that surfaces from the
    /// fetch step.
    pub fn validate(&self) -> Result<(), RequestError> {
        let version = self.schema.strip_prefix(REQUEST_SCHEMA_PREFIX);
        if !version.is_some_and(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit())) {
            return Err(RequestError::UnknownSchema(self.schema.clone()));
        }
        if self.document.trim().is_empty() {
            return Err(RequestError::MissingDocument);
        }
        Ok(())
    }
}

/// A completed conversion, linked to its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConversionResult {
    #[serde(rename = "$schema", default = "default_result_schema")]
    pub schema: String,

    /// Entity this result is attached to; always the source document URN.
    #[serde(rename = "$id", default)]
    pub linked_entity_id: String,

    /// URN of the markdown version of the document.
    #[serde(alias = "markdownRef")]
    pub markdown_urn: String,

    /// Policy of the created markdown artifact.
    #[serde(rename = "$policy", default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

fn default_result_schema() -> String {
    RESULT_SCHEMA.to_string()
}

impl ConversionResult {
    pub fn new(
        document: impl Into<String>,
        markdown_urn: impl Into<String>,
        policy: Option<String>,
    ) -> Self {
        Self {
            schema: default_result_schema(),
            linked_entity_id: document.into(),
            markdown_urn: markdown_urn.into(),
            policy,
        }
    }
}

// ── Tool description ─────────────────────────────────────────────────────

/// Schema tag of the tool description document.
pub const TOOL_DESCRIPTION_SCHEMA: &str = "urn:sd-core:schema.ai-tool.1";

/// Discovery document served on `GET /` so calling agents know the shapes.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescription {
    #[serde(rename = "$schema")]
    pub schema: &'static str,
    pub id: String,
    pub name: &'static str,
    pub description: &'static str,
    pub tags: Vec<&'static str>,
    pub service: ServiceInfo,
    pub request_schema: Schema,
    pub result_schema: Schema,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub license: License,
}

#[derive(Debug, Clone, Serialize)]
pub struct License {
    pub name: &'static str,
    pub url: &'static str,
}

const TOOL_NAME: &str = "conversion_service";

const TOOL_DESCRIPTION: &str = "Parse an uploaded document into markdown.\n\n\
This tool fetches a document artifact from platform storage, creates a copy in \
markdown format and uploads the result back to storage. A document that was \
converted before is answered from the index without converting it again.\n\n\
The result's `markdown_urn` names the markdown artifact; `$id` is the URN of \
the source document it is linked to.";

/// Build the tool description, with JSON Schemas generated from the wire types.
pub fn tool_description() -> ToolDescription {
    ToolDescription {
        schema: TOOL_DESCRIPTION_SCHEMA,
        id: format!("urn:sd-core:ai-tool.{TOOL_NAME}"),
        name: TOOL_NAME,
        description: TOOL_DESCRIPTION,
        tags: vec!["Markdown Conversion"],
        service: ServiceInfo {
            name: "Conversion to Markdown Service",
            version: env!("CARGO_PKG_VERSION"),
            license: License {
                name: "MIT",
                url: "https://opensource.org/license/MIT",
            },
        },
        request_schema: schemars::schema_for!(ConversionRequest),
        result_schema: schemars::schema_for!(ConversionResult),
    }
}
