//! HTTP/JSON wire types for the knowledge-base backend.

use serde::{Deserialize, Deserializer, Serialize};

/// Client → server: chat request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub question: &'a str,
}

/// A knowledge-base excerpt supporting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Source {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }
}

/// Server → client: chat reply.
///
/// Both fields are optional on the wire. A `sources` field that is present
/// but malformed decodes as `None` rather than failing the whole reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, deserialize_with = "lenient_sources")]
    pub sources: Option<Vec<Source>>,
}

fn lenient_sources<'de, D>(deserializer: D) -> Result<Option<Vec<Source>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(sources) => Ok(Some(sources)),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring malformed sources in chat reply");
            Ok(None)
        }
    }
}

/// Server → client: health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// Server → client: result of a document upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub success: bool,
    pub message: String,
}

/// One entry of the document listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    #[serde(rename = "uploadDate")]
    pub upload_date: String,
}

/// Server → client: result of a document deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub success: bool,
}
