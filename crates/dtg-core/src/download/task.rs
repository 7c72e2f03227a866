//! Core domain types for download item tasks.
//!
//! Pure data types with no I/O dependencies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Classification of a download item task.
///
/// Opaque to the scheduler; carried through for reporting only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    /// Video segment or progressive video file.
    #[default]
    Video,
    /// Audio track.
    Audio,
    /// Captions/subtitles.
    Text,
}

impl TrackType {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "text" | "caption" | "captions" | "subtitle" | "subtitles" => Ok(Self::Text),
            other => Err(format!("unknown track type: {other}")),
        }
    }
}

/// Resume data produced by a transport adapter when a transfer is suspended.
///
/// The scheduler never interprets a checkpoint; it only stores it and hands it
/// back to the transport on re-admission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeCheckpoint {
    /// Number of bytes already persisted at the destination.
    pub offset: u64,
    /// Validator (entity tag or last-modified) of the partially fetched resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

impl ResumeCheckpoint {
    /// Create a checkpoint at the given byte offset.
    #[must_use]
    pub const fn at(offset: u64) -> Self {
        Self {
            offset,
            validator: None,
        }
    }

    /// Attach a resource validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }
}

/// One fetchable unit of a download item (video, audio or captions file).
///
/// `content_url` is the unique key of the task within an item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItemTask {
    /// The remote resource. Must be unique within the item's task set.
    pub content_url: Url,
    /// Track classification.
    pub track_type: TrackType,
    /// Local destination owned exclusively by this task.
    pub destination_url: PathBuf,
    /// Resume data captured on suspension; `None` starts from zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_checkpoint: Option<ResumeCheckpoint>,
}

impl DownloadItemTask {
    /// Create a new task with no resume data.
    pub fn new(content_url: Url, track_type: TrackType, destination_url: impl Into<PathBuf>) -> Self {
        Self {
            content_url,
            track_type,
            destination_url: destination_url.into(),
            resume_checkpoint: None,
        }
    }

    /// Set the resume checkpoint.
    #[must_use]
    pub fn with_resume_checkpoint(mut self, checkpoint: ResumeCheckpoint) -> Self {
        self.resume_checkpoint = Some(checkpoint);
        self
    }

    /// The registry key of this task.
    #[must_use]
    pub fn key(&self) -> &str {
        self.content_url.as_str()
    }

    /// Destination path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination_url
    }
}
