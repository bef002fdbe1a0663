//! Inbound webhook payload types.
//!
//! The Cloud API wraps messages in entry/change envelopes; a single POST may
//! carry several message fragments from several senders. Unknown message
//! kinds are kept (as `kind` strings) so the ingest can log and skip them
//! instead of failing the whole payload.

use serde::{Deserialize, Serialize};

/// Top-level webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
}

/// A raw inbound message as the provider delivers it.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Sender phone number.
    pub from: String,
    /// Provider message id; the idempotency key downstream.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub image: Option<MediaBody>,
    #[serde(default)]
    pub audio: Option<MediaBody>,
    #[serde(default)]
    pub video: Option<MediaBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaBody {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A normalized message fragment ready for intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundFragment {
    /// Sender phone number; the party external id.
    pub sender: String,
    /// Sender display name when the payload carries one.
    pub sender_name: Option<String>,
    /// Provider message id.
    pub external_id: String,
    /// "text", "image", "audio" or "video".
    pub message_type: String,
    /// Text body or media caption; empty for caption-less media.
    pub content: String,
    /// Provider media id for non-text fragments.
    pub media_id: Option<String>,
}

impl WebhookPayload {
    /// Flatten the envelope into normalized fragments, skipping message
    /// kinds this system does not handle (stickers, reactions, ...).
    pub fn fragments(&self) -> Vec<InboundFragment> {
        let mut fragments = Vec::new();

        for entry in &self.entry {
            for change in &entry.changes {
                if change.field != "messages" {
                    continue;
                }
                let name_of = |wa_id: &str| {
                    change
                        .value
                        .contacts
                        .iter()
                        .find(|c| c.wa_id == wa_id)
                        .and_then(|c| c.profile.as_ref())
                        .map(|p| p.name.clone())
                };

                for message in &change.value.messages {
                    let fragment = match message.kind.as_str() {
                        "text" => message.text.as_ref().map(|t| InboundFragment {
                            sender: message.from.clone(),
                            sender_name: name_of(&message.from),
                            external_id: message.id.clone(),
                            message_type: "text".to_string(),
                            content: t.body.clone(),
                            media_id: None,
                        }),
                        kind @ ("image" | "audio" | "video") => {
                            let media = match kind {
                                "image" => message.image.as_ref(),
                                "audio" => message.audio.as_ref(),
                                _ => message.video.as_ref(),
                            };
                            media.map(|m| InboundFragment {
                                sender: message.from.clone(),
                                sender_name: name_of(&message.from),
                                external_id: message.id.clone(),
                                message_type: kind.to_string(),
                                content: m.caption.clone().unwrap_or_default(),
                                media_id: Some(m.id.clone()),
                            })
                        }
                        other => {
                            tracing::debug!(kind = other, "skipping unsupported message kind");
                            None
                        }
                    };
                    fragments.extend(fragment);
                }
            }
        }

        fragments
    }
}
