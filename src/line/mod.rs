pub mod client;
pub mod signature;
pub mod types;

use crate::line::types::{EventMessage, Mentionee, Source, WebhookEvent, WebhookPayload};
use std::fmt::{Debug, Formatter};
use tracing::log::debug;

#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
    #[error("Malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Single-use handle tying a reply to the event it came from. It is not `Clone`,
/// so sending a reply consumes it.
#[derive(PartialEq, Eq)]
pub struct ReplyToken(String);
impl ReplyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Debug for ReplyToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Tokens are short-lived credentials, only log a prefix.
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "ReplyToken({prefix}…)")
    }
}

/// A text message that can be answered.
#[derive(Debug)]
pub struct MessageEvent {
    pub source: Source,
    pub text: String,
    pub reply_token: ReplyToken,
    pub mentionees: Vec<Mentionee>,
}

/// Lazily yields the answerable text messages of a webhook delivery, skipping
/// every other event and message kind.
pub fn extract_events(payload: WebhookPayload) -> impl Iterator<Item = MessageEvent> {
    payload.events.into_iter().filter_map(|event| {
        let raw = match event {
            WebhookEvent::Message(raw) => raw,
            WebhookEvent::Unsupported => {
                debug!("Ignoring unsupported webhook event");
                return None;
            }
        };

        let text = match raw.message {
            EventMessage::Text(text) => text,
            EventMessage::Unsupported => {
                debug!("Ignoring non-text message from {}", raw.source.kind());
                return None;
            }
        };

        let Some(reply_token) = raw.reply_token else {
            debug!("Ignoring text message without a reply token");
            return None;
        };

        Some(MessageEvent {
            source: raw.source,
            text: text.text,
            reply_token: ReplyToken::new(reply_token),
            mentionees: text.mention.unwrap_or_default().mentionees,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(body: &str) -> Vec<MessageEvent> {
        extract_events(WebhookPayload::parse(body.as_bytes()).unwrap()).collect()
    }

    #[test]
    fn test_private_text_message() {
        let events = extract(
            r#"{"events":[{"type":"message","message":{"type":"text","text":"翻訳：こんにちは"},"replyToken":"abc","source":{"type":"user"}}]}"#,
        );
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.text, "翻訳：こんにちは");
        assert_eq!(event.reply_token.as_str(), "abc");
        assert_eq!(event.source, Source::User { user_id: None });
        assert!(event.mentionees.is_empty());
    }

    #[test]
    fn test_group_message_with_mentions() {
        let events = extract(
            r#"{
                "destination": "Ubot",
                "events": [{
                    "type": "message",
                    "mode": "active",
                    "timestamp": 1462629479859,
                    "webhookEventId": "01FZ74A0TDDPYRVKNK77XKC3ZR",
                    "replyToken": "token-1",
                    "source": {"type": "group", "groupId": "Cgroup", "userId": "Uauthor"},
                    "message": {
                        "id": "444573844083572737",
                        "type": "text",
                        "quoteToken": "q3Plxr4AgKd...",
                        "text": "@Bot hello",
                        "mention": {
                            "mentionees": [
                                {"index": 0, "length": 4, "userId": "Ubot", "type": "user", "isSelf": true}
                            ]
                        }
                    }
                }]
            }"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].source,
            Source::Group {
                group_id: Some("Cgroup".to_string()),
                user_id: Some("Uauthor".to_string()),
            }
        );
        assert_eq!(
            events[0].mentionees,
            vec![Mentionee {
                index: 0,
                length: 4,
                user_id: Some("Ubot".to_string()),
                is_self: true,
            }]
        );
    }

    #[test]
    fn test_skips_unsupported_events() {
        let events = extract(
            r#"{"events":[
                {"type":"follow","replyToken":"f","source":{"type":"user","userId":"U1"}},
                {"type":"message","replyToken":"s","source":{"type":"user"},"message":{"type":"sticker","packageId":"1","stickerId":"1"}},
                {"type":"message","source":{"type":"user"},"message":{"type":"text","text":"no token"}},
                {"type":"message","replyToken":"r","source":{"type":"room","roomId":"R1"},"message":{"type":"text","text":"kept"}}
            ]}"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "kept");
        assert!(events[0].source.is_multi_party());
    }

    #[test]
    fn test_empty_events() {
        assert!(extract(r#"{"destination":"U0","events":[]}"#).is_empty());
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(WebhookPayload::parse(b"not json").is_err());
        assert!(WebhookPayload::parse(br#"{"destination":"U0"}"#).is_err());
        assert!(WebhookPayload::parse(br#"{"events":{}}"#).is_err());
    }

    #[test]
    fn test_reply_token_debug_is_truncated() {
        let token = ReplyToken::new("nHuyWiB7yP5Zw52FIkcQobQuGDXCTA");
        assert_eq!(format!("{token:?}"), "ReplyToken(nHuyWi…)");
    }
}
