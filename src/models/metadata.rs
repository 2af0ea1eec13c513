use serde::{Deserialize, Serialize};

/// Number of keywords the model is asked to produce for every image.
pub const TARGET_TAG_COUNT: usize = 47;

/// Hard upper bound on stored keywords. Longer model output is truncated.
pub const MAX_TAG_COUNT: usize = 50;

/// Title length the model is asked to respect. Not enforced on output.
pub const MAX_TITLE_CHARS: usize = 200;

/// Title used when the model returns none.
pub const DEFAULT_TITLE: &str = "Untitled Image";

/// Raw image bytes plus the MIME type they were uploaded with.
///
/// Owned by its job until admission moves it into the analysis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Marketplace metadata generated for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMetadata {
    pub title: String,
    pub tags: Vec<String>,
}

/// Metadata exactly as the model returned it, before normalization.
///
/// `tags` is kept as a raw JSON value so that a non-array answer degrades to
/// an empty tag list instead of failing the whole job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: serde_json::Value,
}

impl RawMetadata {
    /// Applies the storage rules: empty titles fall back to [`DEFAULT_TITLE`],
    /// tag lists are cut at `tag_cap` (itself clamped to [`MAX_TAG_COUNT`]).
    ///
    /// Short tag lists are stored as-is; the 47-keyword rule belongs to the
    /// prompt, not to this crate.
    pub fn normalize(self, tag_cap: usize) -> StockMetadata {
        let cap = tag_cap.min(MAX_TAG_COUNT);

        let title = match self.title {
            Some(title) if !title.trim().is_empty() => title,
            _ => DEFAULT_TITLE.to_string(),
        };

        let tags = match self.tags {
            serde_json::Value::Array(values) => values
                .into_iter()
                .take(cap)
                .map(|value| match value {
                    serde_json::Value::String(tag) => tag,
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };

        StockMetadata { title, tags }
    }
}
