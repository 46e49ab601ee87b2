//! Thin wrapper over the chat platform's JSON-RPC surface.
//!
//! One transport primitive, [`TgClient::call`], plus typed conveniences for
//! the methods the relay and console use. No retries; callers decide.

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api error: {description}")]
    Api { description: String },
    #[error("response missing field: {0}")]
    Shape(&'static str),
}

impl ApiError {
    /// The platform reports a dead forum thread with wording like
    /// "message thread not found"; both substrings are treated as the
    /// topic-lost signal.
    pub fn is_topic_lost(&self) -> bool {
        match self {
            ApiError::Api { description } => {
                let d = description.to_lowercase();
                d.contains("thread") || d.contains("not found")
            }
            _ => false,
        }
    }
}

/// Media kinds an admin may store as the welcome message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelcomeMedia {
    Photo,
    Video,
    Animation,
}

impl WelcomeMedia {
    pub fn from_type_str(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(WelcomeMedia::Photo),
            "video" => Some(WelcomeMedia::Video),
            "animation" => Some(WelcomeMedia::Animation),
            _ => None,
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            WelcomeMedia::Photo => "photo",
            WelcomeMedia::Video => "video",
            WelcomeMedia::Animation => "animation",
        }
    }

    fn method(&self) -> &'static str {
        match self {
            WelcomeMedia::Photo => "sendPhoto",
            WelcomeMedia::Video => "sendVideo",
            WelcomeMedia::Animation => "sendAnimation",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            WelcomeMedia::Photo => "photo",
            WelcomeMedia::Video => "video",
            WelcomeMedia::Animation => "animation",
        }
    }
}

/// Outbound text message. Only the fields this bot actually sends.
#[derive(Debug, Clone)]
pub struct OutMessage {
    pub chat_id: i64,
    pub text: String,
    pub thread_id: Option<i64>,
    pub reply_to: Option<i64>,
    pub silent: bool,
    pub html: bool,
    pub reply_markup: Option<Value>,
}

impl OutMessage {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            thread_id: None,
            reply_to: None,
            silent: false,
            html: false,
            reply_markup: None,
        }
    }

    pub fn thread(mut self, thread_id: i64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn html(mut self) -> Self {
        self.html = true;
        self
    }

    pub fn markup(mut self, markup: Value) -> Self {
        self.reply_markup = Some(markup);
        self
    }

    fn into_body(self) -> Value {
        let mut body = json!({
            "chat_id": self.chat_id,
            "text": self.text,
        });
        if let Some(t) = self.thread_id {
            body["message_thread_id"] = json!(t);
        }
        if let Some(r) = self.reply_to {
            body["reply_parameters"] = json!({
                "message_id": r,
                "allow_sending_without_reply": true,
            });
        }
        if self.silent {
            body["disable_notification"] = json!(true);
        }
        if self.html {
            body["parse_mode"] = json!("HTML");
        }
        if let Some(m) = self.reply_markup {
            body["reply_markup"] = m;
        }
        body
    }
}

#[derive(Clone)]
pub struct TgClient {
    http: reqwest::Client,
    base: String,
}

impl TgClient {
    pub fn new(http: reqwest::Client, bot_token: &str) -> Self {
        Self {
            http,
            base: format!("https://api.telegram.org/bot{bot_token}"),
        }
    }

    /// Single entry point to the platform. Surfaces the platform's textual
    /// error description; never retries.
    pub async fn call(&self, method: &str, body: &Value) -> Result<Value, ApiError> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await?;
        let mut val: Value = resp.json().await?;
        if val["ok"].as_bool() == Some(true) {
            Ok(val["result"].take())
        } else {
            let description = val["description"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            Err(ApiError::Api { description })
        }
    }

    pub async fn send_message(&self, msg: OutMessage) -> Result<i64, ApiError> {
        let result = self.call("sendMessage", &msg.into_body()).await?;
        message_id(&result)
    }

    pub async fn send_media(
        &self,
        chat_id: i64,
        media: WelcomeMedia,
        file_id: &str,
        caption: Option<&str>,
        reply_markup: Option<Value>,
    ) -> Result<i64, ApiError> {
        let mut body = json!({ "chat_id": chat_id });
        body[media.field()] = json!(file_id);
        if let Some(c) = caption {
            body["caption"] = json!(c);
        }
        if let Some(m) = reply_markup {
            body["reply_markup"] = m;
        }
        let result = self.call(media.method(), &body).await?;
        message_id(&result)
    }

    pub async fn forward_message(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        from_chat_id: i64,
        from_message_id: i64,
    ) -> Result<i64, ApiError> {
        let mut body = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat_id,
            "message_id": from_message_id,
        });
        if let Some(t) = thread_id {
            body["message_thread_id"] = json!(t);
        }
        let result = self.call("forwardMessage", &body).await?;
        message_id(&result)
    }

    pub async fn copy_message(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
        from_chat_id: i64,
        from_message_id: i64,
    ) -> Result<i64, ApiError> {
        let mut body = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat_id,
            "message_id": from_message_id,
        });
        if let Some(t) = thread_id {
            body["message_thread_id"] = json!(t);
        }
        let result = self.call("copyMessage", &body).await?;
        message_id(&result)
    }

    /// Returns the new topic's thread id.
    pub async fn create_forum_topic(&self, chat_id: i64, name: &str) -> Result<i64, ApiError> {
        let result = self
            .call("createForumTopic", &json!({ "chat_id": chat_id, "name": name }))
            .await?;
        result["message_thread_id"]
            .as_i64()
            .ok_or(ApiError::Shape("message_thread_id"))
    }

    pub async fn edit_forum_topic(
        &self,
        chat_id: i64,
        thread_id: i64,
        name: &str,
    ) -> Result<(), ApiError> {
        self.call(
            "editForumTopic",
            &json!({ "chat_id": chat_id, "message_thread_id": thread_id, "name": name }),
        )
        .await?;
        Ok(())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        html: bool,
        reply_markup: Option<Value>,
    ) -> Result<(), ApiError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if html {
            body["parse_mode"] = json!("HTML");
        }
        if let Some(m) = reply_markup {
            body["reply_markup"] = m;
        }
        self.call("editMessageText", &body).await?;
        Ok(())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError> {
        self.call(
            "deleteMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    pub async fn pin_chat_message(&self, chat_id: i64, message_id: i64) -> Result<(), ApiError> {
        self.call(
            "pinChatMessage",
            &json!({ "chat_id": chat_id, "message_id": message_id, "disable_notification": true }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_message_reaction(
        &self,
        chat_id: i64,
        message_id: i64,
        emoji: &str,
    ) -> Result<(), ApiError> {
        self.call(
            "setMessageReaction",
            &json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "reaction": [{ "type": "emoji", "emoji": emoji }],
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(t) = text {
            body["text"] = json!(t);
        }
        self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

fn message_id(result: &Value) -> Result<i64, ApiError> {
    result["message_id"]
        .as_i64()
        .ok_or(ApiError::Shape("message_id"))
}

/// Inline keyboard helpers. The platform wants `inline_keyboard` as rows of
/// button objects; building them as raw JSON keeps the client method-agnostic.
pub fn callback_button(text: &str, data: &str) -> Value {
    json!({ "text": text, "callback_data": data })
}

pub fn url_button(text: &str, url: &str) -> Value {
    json!({ "text": text, "url": url })
}

pub fn web_app_button(text: &str, url: &str) -> Value {
    json!({ "text": text, "web_app": { "url": url } })
}

pub fn inline_keyboard(rows: Vec<Vec<Value>>) -> Value {
    json!({ "inline_keyboard": rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_lost_detected_by_substring() {
        let e = ApiError::Api {
            description: "Bad Request: message thread not found".into(),
        };
        assert!(e.is_topic_lost());

        let e = ApiError::Api {
            description: "Forbidden: bot was blocked by the user".into(),
        };
        assert!(!e.is_topic_lost());

        let e = ApiError::Shape("message_id");
        assert!(!e.is_topic_lost());
    }

    #[test]
    fn out_message_body_includes_optional_fields() {
        let body = OutMessage::new(5, "hi")
            .thread(42)
            .reply_to(9)
            .silent()
            .html()
            .markup(inline_keyboard(vec![vec![callback_button("ok", "noop")]]))
            .into_body();

        assert_eq!(body["chat_id"], 5);
        assert_eq!(body["message_thread_id"], 42);
        assert_eq!(body["reply_parameters"]["message_id"], 9);
        assert_eq!(body["disable_notification"], true);
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "noop"
        );
    }

    #[test]
    fn out_message_body_omits_defaults() {
        let body = OutMessage::new(5, "hi").into_body();
        assert!(body.get("message_thread_id").is_none());
        assert!(body.get("reply_parameters").is_none());
        assert!(body.get("disable_notification").is_none());
        assert!(body.get("parse_mode").is_none());
    }
}
