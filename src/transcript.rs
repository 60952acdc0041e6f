use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::model::{Attachment, Message};

// Raw export shapes, kept loose on purpose: the validation happens here so
// the pipeline only ever sees well-typed messages.

#[derive(Debug, Deserialize)]
struct RawExport {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    text: String,
    #[serde(default)]
    create_time: String,
    #[serde(default)]
    sender: RawSender,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSender {
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttachment {
    #[serde(default)]
    name: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    download_uri: String,
    #[serde(default)]
    attachment_data_ref: serde_json::Value,
}

/// Parse a transcript export. A message whose timestamp cannot be parsed is
/// skipped with a warning; it cannot be placed in any calendar-day bucket.
/// Only a malformed export document itself is an error.
pub fn parse_export(json: &str) -> Result<Vec<Message>> {
    let export: RawExport = serde_json::from_str(json).context("parsing transcript export")?;

    let total = export.messages.len();
    let messages: Vec<Message> = export
        .messages
        .into_iter()
        .filter_map(|raw| {
            let timestamp = match DateTime::parse_from_rfc3339(&raw.create_time) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    warn!(
                        create_time = %raw.create_time,
                        sender = %raw.sender.email,
                        "skipping message with unparseable timestamp: {e}"
                    );
                    return None;
                }
            };
            Some(Message {
                author_id: raw.sender.email,
                author_name: raw.sender.display_name,
                text: raw.text,
                timestamp,
                attachments: raw
                    .attachments
                    .into_iter()
                    .map(|a| Attachment {
                        name: a.name,
                        content_type: a.content_type,
                        download_uri: a.download_uri,
                        reference: a.attachment_data_ref,
                    })
                    .collect(),
            })
        })
        .collect();

    if messages.len() < total {
        warn!("transcript: kept {} of {} messages", messages.len(), total);
    }
    Ok(messages)
}

/// Keep messages inside the inclusive `[from, to]` window.
pub fn filter_by_range(
    messages: Vec<Message>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|m| from <= m.timestamp && m.timestamp <= to)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "messages": [
            {
                "text": "Taille effectuée",
                "createTime": "2024-05-02T09:00:00Z",
                "sender": { "email": "ed@jardin.fr", "displayName": "Edward Carey" },
                "attachments": [
                    {
                        "name": "spaces/x/messages/y/attachments/z",
                        "contentType": "image/jpeg",
                        "downloadUri": "https://chat.example/dl/z",
                        "attachmentDataRef": { "resourceName": "ref-z" }
                    }
                ]
            },
            {
                "text": "horodatage cassé",
                "createTime": "pas une date",
                "sender": { "email": "nico@jardin.fr", "displayName": "Nicolas Dupont" }
            },
            {
                "text": "sans expéditeur",
                "createTime": "2024-05-02T10:00:00Z"
            }
        ]
    }"#;

    #[test]
    fn parses_and_skips_bad_timestamps() {
        let messages = parse_export(EXPORT).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].author_id, "ed@jardin.fr");
        assert_eq!(messages[0].attachments.len(), 1);
        assert!(messages[0].attachments[0].is_image());
        assert_eq!(
            messages[0].attachments[0].reference["resourceName"],
            "ref-z"
        );
        // Missing sender becomes an empty identity, not an error.
        assert_eq!(messages[1].author_id, "");
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_export("{ not json").is_err());
    }

    #[test]
    fn empty_export_is_empty() {
        assert!(parse_export(r#"{"messages": []}"#).unwrap().is_empty());
        assert!(parse_export("{}").unwrap().is_empty());
    }

    #[test]
    fn range_filter_is_inclusive() {
        let messages = parse_export(EXPORT).unwrap();
        let from = DateTime::parse_from_rfc3339("2024-05-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let to = DateTime::parse_from_rfc3339("2024-05-02T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let kept = filter_by_range(messages, from, to);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].author_id, "ed@jardin.fr");
    }
}
