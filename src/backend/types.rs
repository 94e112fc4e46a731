//! Request and response types exchanged with the generation backend.
//!
//! Requests are sent as `multipart/form-data`; responses are kept raw
//! ([`RawResponse`]) until the status mapper interprets them.

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Target depth of the generated material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

/// How long the generated material should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volume {
    Brief,
    #[default]
    Standard,
    Detailed,
}

/// Configuration object sent alongside the primary content as the `settings` field.
///
/// Field names match what the backend expects in the JSON blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub difficulty: Difficulty,
    pub subject: String,
    pub volume: Volume,
    /// Let the backend pause for human review between stages.
    #[serde(rename = "enableHITL")]
    pub enable_hitl: bool,
    #[serde(rename = "enableEditing")]
    pub enable_editing: bool,
    #[serde(rename = "enableGapQuestions")]
    pub enable_gap_questions: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::default(),
            subject: String::new(),
            volume: Volume::default(),
            enable_hitl: true,
            enable_editing: false,
            enable_gap_questions: false,
        }
    }
}

/// A binary file attached to a submission or a feedback message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read an image from disk, inferring its MIME type from the extension.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let mime_type = match extension.as_deref() {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            _ => "application/octet-stream",
        };
        Ok(Self::new(file_name, mime_type, bytes))
    }
}

/// Everything needed to start a new generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInput {
    /// Primary content: the question or topic to generate material for.
    pub content: String,
    pub settings: GenerationSettings,
    pub user_id: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl JobInput {
    pub fn new(content: impl Into<String>, settings: GenerationSettings) -> Self {
        Self {
            content: content.into(),
            settings,
            user_id: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Human feedback resuming an interrupted job.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackInput {
    pub job_id: String,
    pub message: String,
    /// The original primary content, re-sent as context.
    pub content: String,
    pub user_id: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Which endpoint a client polls, and therefore which response shape it maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollSource {
    /// `GET /process/result/{id}`, used after an accepted submission.
    #[default]
    ProcessResult,
    /// `GET /state/{id}`, the thread-state view of the job.
    ThreadState,
}

impl fmt::Display for PollSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollSource::ProcessResult => write!(f, "process_result"),
            PollSource::ThreadState => write!(f, "thread_state"),
        }
    }
}

/// A response as it came off the wire: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }
}
