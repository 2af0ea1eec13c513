use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::metadata::{ImagePayload, StockMetadata};
use super::preview::Preview;

/// Opaque identifier of a submitted image. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status of a metadata job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Status together with the data that only exists in that status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    InFlight,
    Completed(StockMetadata),
    Failed(String),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::InFlight => JobStatus::InFlight,
            JobState::Completed(_) => JobStatus::Completed,
            JobState::Failed(_) => JobStatus::Failed,
        }
    }
}

/// A requested state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Pending -> InFlight.
    Admit,
    /// InFlight -> Completed.
    Complete(StockMetadata),
    /// InFlight -> Failed.
    Fail(String),
}

impl Transition {
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Admit => JobStatus::InFlight,
            Transition::Complete(_) => JobStatus::Completed,
            Transition::Fail(_) => JobStatus::Failed,
        }
    }
}

/// An image accepted for analysis but not yet placed in the store.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub filename: String,
    pub payload: ImagePayload,
    pub preview: Preview,
}

impl NewImage {
    /// Builds the submission and renders its preview.
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let preview = Preview::generate(&bytes);
        Self {
            filename: filename.into(),
            payload: ImagePayload::new(bytes, content_type),
            preview,
        }
    }

    /// Builds the submission without decoding the image.
    pub fn without_preview(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            payload: ImagePayload::new(bytes, content_type),
            preview: Preview::unavailable(),
        }
    }
}

/// One submitted image and its processing state.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    filename: String,
    content_type: String,
    size_bytes: usize,
    payload: Option<ImagePayload>,
    preview: Preview,
    state: JobState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(image: NewImage) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            filename: image.filename,
            content_type: image.payload.content_type.clone(),
            size_bytes: image.payload.len(),
            payload: Some(image.payload),
            preview: image.preview,
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn metadata(&self) -> Option<&StockMetadata> {
        match &self.state {
            JobState::Completed(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Checks `transition` against the state machine without applying it.
    pub fn can_apply(&self, transition: &Transition) -> bool {
        match (&self.state, transition) {
            (JobState::Pending, Transition::Admit) => self.payload.is_some(),
            (JobState::InFlight, Transition::Complete(_) | Transition::Fail(_)) => true,
            _ => false,
        }
    }

    /// Applies a legal transition. Admission hands back the payload.
    ///
    /// Callers must check [`Job::can_apply`] first; an illegal transition
    /// leaves the job untouched and returns `None`.
    pub(crate) fn apply(&mut self, transition: Transition) -> Option<ImagePayload> {
        if !self.can_apply(&transition) {
            return None;
        }

        self.updated_at = Utc::now();
        match transition {
            Transition::Admit => {
                self.state = JobState::InFlight;
                self.payload.take()
            }
            Transition::Complete(meta) => {
                self.state = JobState::Completed(meta);
                None
            }
            Transition::Fail(error) => {
                self.state = JobState::Failed(error);
                None
            }
        }
    }

    pub fn summary(&self) -> JobSummary {
        let (title, tags) = match self.metadata() {
            Some(meta) => (Some(meta.title.clone()), meta.tags.clone()),
            None => (None, Vec::new()),
        };

        JobSummary {
            id: self.id,
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes,
            status: self.status(),
            title,
            tags,
            error: self.error().map(str::to_string),
            has_preview: self.preview.is_available(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Serializable snapshot of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: JobId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_preview: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
