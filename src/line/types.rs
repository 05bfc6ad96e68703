use serde::{Deserialize, Serialize};

/// Body of a LINE Messaging API webhook delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookEvent {
    Message(RawMessageEvent),

    /// Follow, join, postback, unsend and every other event kind.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessageEvent {
    #[serde(default)]
    pub reply_token: Option<String>,
    pub source: Source,
    pub message: EventMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Source {
    User {
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },
    Group {
        #[serde(default, rename = "groupId")]
        group_id: Option<String>,
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },
    Room {
        #[serde(default, rename = "roomId")]
        room_id: Option<String>,
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },
}
impl Source {
    /// Groups and rooms are shared conversations, where the bot only answers when mentioned.
    pub fn is_multi_party(&self) -> bool {
        !matches!(self, Source::User { .. })
    }

    /// The group or room ID, or the user ID for private chats.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Source::User { user_id } => user_id.as_deref(),
            Source::Group { group_id, .. } => group_id.as_deref(),
            Source::Room { room_id, .. } => room_id.as_deref(),
        }
    }

    /// The user who sent the message, when LINE shares it.
    pub fn sender_id(&self) -> Option<&str> {
        match self {
            Source::User { user_id } | Source::Group { user_id, .. } | Source::Room { user_id, .. } => {
                user_id.as_deref()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Source::User { .. } => "user",
            Source::Group { .. } => "group",
            Source::Room { .. } => "room",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventMessage {
    Text(TextMessage),

    /// Images, stickers, locations etc.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub struct TextMessage {
    pub text: String,

    #[serde(default)]
    pub mention: Option<Mention>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Mention {
    #[serde(default)]
    pub mentionees: Vec<Mentionee>,
}

/// A mention span inside the message text. `index` and `length` count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentionee {
    pub index: usize,
    pub length: usize,

    #[serde(default)]
    pub user_id: Option<String>,

    /// Set by LINE when the mentioned user is the bot receiving the webhook.
    #[serde(default)]
    pub is_self: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMessageRequest<'a> {
    pub reply_token: &'a str,
    pub messages: Vec<OutgoingMessage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage<'a> {
    Text { text: &'a str },
}
