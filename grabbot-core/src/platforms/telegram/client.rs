// File: grabbot-core/src/platforms/telegram/client.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::http::{DefaultHttpClient, HttpClient};
use crate::platforms::ChatSender;
use crate::Error;

/// Telegram caps message text at 4096 characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub channel_post: Option<Message>,
}

impl Update {
    /// Private/group messages and channel posts are treated alike.
    pub fn into_message(self) -> Option<Message> {
        self.message.or(self.channel_post)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<TgUser>,
    pub text: Option<String>,
    pub caption: Option<String>,
}

impl Message {
    /// Text, or the caption of a photo/document post.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// Channel posts have no `from`; the channel itself is the sender.
    pub fn sender_id(&self) -> i64 {
        self.from.as_ref().map(|u| u.id).unwrap_or(self.chat.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

/// Thin Bot API wrapper: long polling plus sendMessage.
pub struct TelegramClient {
    http: Arc<dyn HttpClient>,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(http: Arc<dyn HttpClient>, api_base: &str, bot_token: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    /// The HTTP timeout has to outlive the long-poll timeout.
    pub fn with_poll_timeout(api_base: &str, bot_token: &str, poll_timeout_secs: u64) -> Result<Self, Error> {
        let http = DefaultHttpClient::new(Duration::from_secs(poll_timeout_secs + 15))?;
        Ok(Self::new(Arc::new(http), api_base, bot_token))
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, Error> {
        let reply = self
            .http
            .post_json(&self.method_url(method), &BTreeMap::new(), &body)
            .await?;
        let envelope: ApiEnvelope<T> = serde_json::from_str(&reply.body).map_err(|e| {
            Error::Platform(format!("Telegram {method}: HTTP {} unparsable reply => {e}", reply.status))
        })?;
        if !envelope.ok {
            return Err(Error::Platform(format!(
                "Telegram {method} failed: {}",
                envelope.description.unwrap_or_else(|| format!("HTTP {}", reply.status))
            )));
        }
        envelope
            .result
            .ok_or_else(|| Error::Platform(format!("Telegram {method}: ok without result")))
    }

    pub async fn get_me(&self) -> Result<TgUser, Error> {
        self.call("getMe", json!({})).await
    }

    /// Long-polls for updates with `update_id >= offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, Error> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "channel_post"],
        });
        let updates: Vec<Update> = self.call("getUpdates", body).await?;
        debug!("getUpdates(offset={}) => {} updates", offset, updates.len());
        Ok(updates)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), Error> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let _: Value = self
                .call("sendMessage", json!({ "chat_id": chat_id, "text": chunk }))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatSender for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), Error> {
        self.send_message(chat_id, text).await
    }
}

/// Splits on character boundaries into pieces of at most `max` chars.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpReply;
    use parking_lot::Mutex;

    struct ScriptedHttp {
        replies: Mutex<Vec<HttpReply>>,
        urls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn post_json(&self, url: &str, _h: &BTreeMap<String, String>, body: &Value) -> Result<HttpReply, Error> {
            self.urls.lock().push((url.to_string(), body.clone()));
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                return Err(Error::Platform("script exhausted".into()));
            }
            Ok(replies.remove(0))
        }
    }

    fn scripted(bodies: &[&str]) -> Arc<ScriptedHttp> {
        Arc::new(ScriptedHttp {
            replies: Mutex::new(
                bodies.iter().map(|b| HttpReply { status: 200, body: b.to_string() }).collect(),
            ),
            urls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn get_updates_parses_messages_and_channel_posts() {
        let http = scripted(&[r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":-100,"type":"supergroup","title":"drops"},
             "from":{"id":42,"is_bot":false},"text":"Code: AB3D9F8K"}},
            {"update_id":11,"channel_post":{"message_id":2,"chat":{"id":-200,"type":"channel"},"caption":"XY12ZT34"}}
        ]}"#]);
        let client = TelegramClient::new(http.clone(), "https://api.test/", "123:abc");

        let updates = client.get_updates(10, 30).await.unwrap();
        assert_eq!(updates.len(), 2);

        let first = updates[0].clone().into_message().unwrap();
        assert_eq!(first.sender_id(), 42);
        assert_eq!(first.body(), Some("Code: AB3D9F8K"));

        let second = updates[1].clone().into_message().unwrap();
        assert_eq!(second.sender_id(), -200);
        assert_eq!(second.body(), Some("XY12ZT34"));

        let urls = http.urls.lock();
        assert_eq!(urls[0].0, "https://api.test/bot123:abc/getUpdates");
        assert_eq!(urls[0].1["offset"], 10);
    }

    #[tokio::test]
    async fn not_ok_envelope_is_an_error() {
        let http = scripted(&[r#"{"ok":false,"description":"Unauthorized"}"#]);
        let client = TelegramClient::new(http, "https://api.test", "bad");
        let err = client.get_me().await.unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn long_messages_are_split() {
        let http = scripted(&[r#"{"ok":true,"result":{}}"#, r#"{"ok":true,"result":{}}"#]);
        let client = TelegramClient::new(http.clone(), "https://api.test", "t");
        let text = "x".repeat(MAX_MESSAGE_LEN + 1);
        client.send_message(7, &text).await.unwrap();
        assert_eq!(http.urls.lock().len(), 2);
    }

    #[tokio::test]
    async fn failed_poll_error_does_not_contain_the_token() {
        let client = TelegramClient::with_poll_timeout("http://127.0.0.1:1", "123456:SUPERSECRET", 1).unwrap();
        let err = client.get_updates(0, 0).await.unwrap_err();
        assert!(!err.to_string().contains("SUPERSECRET"), "leaked: {err}");
    }

    #[test]
    fn split_respects_char_boundaries() {
        let parts = split_message("🔑🔑🔑", 2);
        assert_eq!(parts, vec!["🔑🔑".to_string(), "🔑".to_string()]);
    }
}
