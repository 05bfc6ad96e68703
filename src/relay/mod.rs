pub mod mention;
pub mod prompt;

use crate::completion::CompletionBackend;
use crate::line::client::ReplyBackend;
use crate::line::MessageEvent;
use crate::relay::mention::{filter_mention, BotIdentity};
use crate::relay::prompt::{PromptBuilder, PromptKind};
use std::sync::Arc;
use tracing::log::{debug, error, warn};

/// What happened to a single message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Replied { kind: PromptKind },
    RepliedWithFallback { kind: PromptKind },
    NotMentioned,
    DeliveryFailed,
}

/// Turns message events into replies. Holds no per-request state, so one
/// instance is shared by every webhook delivery.
#[derive(Clone)]
pub struct Relay {
    bot: BotIdentity,
    prompts: PromptBuilder,
    completion: Arc<dyn CompletionBackend>,
    replies: Arc<dyn ReplyBackend>,
}
impl Relay {
    pub fn new(
        bot: BotIdentity,
        prompts: PromptBuilder,
        completion: Arc<dyn CompletionBackend>,
        replies: Arc<dyn ReplyBackend>,
    ) -> Self {
        Self {
            bot,
            prompts,
            completion,
            replies,
        }
    }

    pub async fn handle(&self, event: MessageEvent) -> Outcome {
        let text = match filter_mention(&event, &self.bot) {
            Ok(text) => text,
            Err(_) => {
                debug!(
                    "Skipping {} message in {}, bot was not mentioned",
                    event.source.kind(),
                    event.source.conversation_id().unwrap_or("unknown")
                );
                return Outcome::NotMentioned;
            }
        };

        if text.is_empty() {
            debug!("Message only mentioned the bot, answering with the default instruction alone");
        }
        let prompt = self.prompts.build(&text);
        debug!(
            "Built {:?} prompt with instruction {:?} ({} chars of content)",
            prompt.kind,
            prompt.instruction(),
            prompt.content().chars().count()
        );
        let (reply, fell_back) = match self.completion.complete(&prompt).await {
            Ok(reply) => (reply, false),
            Err(e) => {
                if e.is_rate_limited() {
                    warn!("Completion API is rate limiting requests: {e}");
                } else {
                    warn!("Failed to get completion: {e}");
                }
                (self.prompts.fallback_text().to_string(), true)
            }
        };

        if let Err(e) = self.replies.reply(event.reply_token, &reply).await {
            error!("Failed to send reply: {e}");
            return Outcome::DeliveryFailed;
        }

        let kind = prompt.kind;
        debug!(
            "Replied to {} in {} {}",
            event.source.sender_id().unwrap_or("unknown sender"),
            event.source.kind(),
            event.source.conversation_id().unwrap_or("unknown")
        );
        if fell_back {
            Outcome::RepliedWithFallback { kind }
        } else {
            Outcome::Replied { kind }
        }
    }
}
