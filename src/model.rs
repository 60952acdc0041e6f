use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A file attached to a chat message. Only `image/*` attachments matter to
/// the pipeline; everything else is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Provider identifier, used as the matching key for categorization.
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub download_uri: String,
    /// Opaque provider reference (upload tokens etc.), passed through as-is.
    #[serde(default)]
    pub reference: serde_json::Value,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.to_ascii_lowercase().starts_with("image/")
    }
}

/// One chat message, validated at the transcript boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable identity key (email). May be empty when the provider exposes none.
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Image attachments in original order.
    pub fn images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_image())
    }
}

/// Where an intervention's display date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    /// Parsed out of the message text (DD/MM).
    Extracted,
    /// Fallback to the first message timestamp.
    Timestamp,
}

impl DateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateSource::Extracted => "extracted",
            DateSource::Timestamp => "timestamp",
        }
    }
}

/// One unit of work activity: all messages from one author on one calendar
/// day (reference timezone). Immutable once produced by segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervention {
    pub author_id: String,
    pub author_name: String,
    /// Grouping key day, computed in the reference timezone.
    pub day: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,
    /// Constituent messages in timestamp order.
    pub messages: Vec<Message>,
    /// Non-empty message texts joined by newline, marker-only lines removed.
    pub raw_text: String,
    /// All image attachments across messages, in message order.
    pub images: Vec<Attachment>,
    pub has_before_after: bool,
    pub before_images: Vec<Attachment>,
    pub after_images: Vec<Attachment>,
    pub regular_images: Vec<Attachment>,
    pub display_date: NaiveDate,
    pub date_source: DateSource,
    pub category: String,
    /// Written by the enrichment collaborator, never by the pipeline.
    pub enhanced_text: Option<String>,
    pub title: Option<String>,
}

impl Intervention {
    /// Completeness/quality flags for reporting. Empty means publishable.
    pub fn quality_issues(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        let text = self.raw_text.trim();
        if text.is_empty() {
            issues.push("no text content");
        } else if text.len() < 3 {
            issues.push("text too short");
        }
        if matches!(text.to_lowercase().as_str(), "ok" | "okay" | "rien") {
            issues.push("minimal content");
        }
        if self.author_name.is_empty() {
            issues.push("no author information");
        }
        issues
    }
}

/// A participant in the reporting period: a message author (with email) or
/// an @-mentioned name (no email).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// Capitalization-normalized display name.
    pub name: String,
    pub email: Option<String>,
}
