//! Serde types for the chat platform's webhook envelope, plus content
//! classification used by the policy pipeline.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub edited_message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub message_thread_id: Option<i64>,
    pub from: Option<TgUser>,
    pub chat: Chat,
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub entities: Option<Vec<MessageEntity>>,
    pub caption_entities: Option<Vec<MessageEntity>>,
    pub forward_origin: Option<ForwardOrigin>,
    pub photo: Option<Vec<PhotoSize>>,
    pub video: Option<FileRef>,
    pub document: Option<FileRef>,
    pub audio: Option<FileRef>,
    pub voice: Option<FileRef>,
    pub video_note: Option<FileRef>,
    pub sticker: Option<FileRef>,
    pub animation: Option<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: i64,
    pub length: i64,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardOrigin {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<Message>,
    pub data: Option<String>,
}

/// Exactly one kind per message, decided in the priority order the
/// type-filter switches are checked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Forward { from_channel: bool },
    Audio,
    Sticker,
    Media,
    Link,
    Text,
}

impl ContentKind {
    /// The config switch guarding this kind.
    pub fn switch_key(&self) -> &'static str {
        match self {
            ContentKind::Forward { .. } => "enable_forward_forwarding",
            ContentKind::Audio => "enable_audio_forwarding",
            ContentKind::Sticker => "enable_sticker_forwarding",
            ContentKind::Media => "enable_media_forwarding",
            ContentKind::Link => "enable_link_forwarding",
            ContentKind::Text => "enable_text_forwarding",
        }
    }
}

pub fn classify(msg: &Message) -> ContentKind {
    if let Some(origin) = &msg.forward_origin {
        return ContentKind::Forward {
            from_channel: origin.kind == "channel",
        };
    }
    if msg.audio.is_some() || msg.voice.is_some() {
        return ContentKind::Audio;
    }
    if msg.sticker.is_some() || msg.animation.is_some() {
        return ContentKind::Sticker;
    }
    if msg.photo.is_some() || msg.video.is_some() || msg.document.is_some() || msg.video_note.is_some() {
        return ContentKind::Media;
    }
    if has_link(msg) {
        return ContentKind::Link;
    }
    ContentKind::Text
}

fn has_link(msg: &Message) -> bool {
    let entities = msg
        .entities
        .iter()
        .chain(msg.caption_entities.iter())
        .flatten();
    for e in entities {
        if e.kind == "url" || e.kind == "text_link" {
            return true;
        }
    }
    let text = msg.text_or_caption().unwrap_or("");
    text.contains("http://") || text.contains("https://")
}

impl Message {
    pub fn text_or_caption(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    pub fn is_private(&self) -> bool {
        self.chat.kind == "private"
    }

    /// True when the text is exactly `cmd` or `cmd@botname`.
    pub fn is_command(&self, cmd: &str) -> bool {
        match self.text.as_deref().map(str::trim) {
            Some(t) => t == cmd || t.strip_prefix(cmd).is_some_and(|rest| rest.starts_with('@')),
            None => false,
        }
    }
}

impl TgUser {
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(ln) if !ln.is_empty() => format!("{} {}", self.first_name, ln),
            _ => self.first_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_from_json(body: serde_json::Value) -> Message {
        serde_json::from_value(body).expect("message json")
    }

    fn base_msg() -> serde_json::Value {
        serde_json::json!({
            "message_id": 10,
            "chat": {"id": 1, "type": "private"},
            "date": 1700000000
        })
    }

    #[test]
    fn classify_priority_forward_beats_media() {
        let mut v = base_msg();
        v["forward_origin"] = serde_json::json!({"type": "channel"});
        v["photo"] = serde_json::json!([{"file_id": "p1"}]);
        assert_eq!(
            classify(&msg_from_json(v)),
            ContentKind::Forward { from_channel: true }
        );
    }

    #[test]
    fn classify_voice_is_audio_and_animation_is_sticker() {
        let mut v = base_msg();
        v["voice"] = serde_json::json!({"file_id": "v1"});
        assert_eq!(classify(&msg_from_json(v)), ContentKind::Audio);

        let mut v = base_msg();
        v["animation"] = serde_json::json!({"file_id": "a1"});
        assert_eq!(classify(&msg_from_json(v)), ContentKind::Sticker);
    }

    #[test]
    fn classify_link_by_entity_and_by_raw_text() {
        let mut v = base_msg();
        v["text"] = serde_json::json!("click here");
        v["entities"] = serde_json::json!([{"type": "text_link", "offset": 0, "length": 5, "url": "https://example.com"}]);
        assert_eq!(classify(&msg_from_json(v)), ContentKind::Link);

        let mut v = base_msg();
        v["text"] = serde_json::json!("see https://example.com");
        assert_eq!(classify(&msg_from_json(v)), ContentKind::Link);
    }

    #[test]
    fn classify_plain_text() {
        let mut v = base_msg();
        v["text"] = serde_json::json!("hello");
        assert_eq!(classify(&msg_from_json(v)), ContentKind::Text);
    }

    #[test]
    fn command_matching_accepts_bot_suffix() {
        let mut v = base_msg();
        v["text"] = serde_json::json!("/start@relay_bot");
        assert!(msg_from_json(v).is_command("/start"));

        let mut v = base_msg();
        v["text"] = serde_json::json!("/startling");
        assert!(!msg_from_json(v).is_command("/start"));
    }

    #[test]
    fn update_envelope_parses_with_unknown_fields() {
        let raw = serde_json::json!({
            "update_id": 5,
            "message": {
                "message_id": 2,
                "chat": {"id": 9, "type": "supergroup", "title": "ops"},
                "message_thread_id": 44,
                "date": 1700000001,
                "text": "hi",
                "some_future_field": {"x": 1}
            }
        });
        let upd: Update = serde_json::from_value(raw).expect("update json");
        let msg = upd.message.expect("message");
        assert_eq!(msg.message_thread_id, Some(44));
        assert!(!msg.is_private());
    }
}
