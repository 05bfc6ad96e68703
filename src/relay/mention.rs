use crate::line::types::Mentionee;
use crate::line::MessageEvent;
use std::ops::Range;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Bot was not mentioned")]
pub struct NotMentioned;

/// How the bot recognises itself in a mention list.
#[derive(Debug, Clone, Default)]
pub struct BotIdentity {
    pub user_id: Option<String>,
}
impl BotIdentity {
    pub fn new(user_id: Option<String>) -> Self {
        Self { user_id }
    }

    fn is_me(&self, mentionee: &Mentionee) -> bool {
        mentionee.is_self
            || matches!(
                (&self.user_id, &mentionee.user_id),
                (Some(mine), Some(theirs)) if mine == theirs
            )
    }
}

/// Returns the text to answer. Private chats pass through untouched, group and
/// room messages must mention the bot and have those mentions removed.
pub fn filter_mention(event: &MessageEvent, bot: &BotIdentity) -> Result<String, NotMentioned> {
    if !event.source.is_multi_party() {
        return Ok(event.text.clone());
    }

    if !event.mentionees.iter().any(|mentionee| bot.is_me(mentionee)) {
        return Err(NotMentioned);
    }

    // Spans whose end overflows can't be in the text and are dropped.
    let spans: Vec<Range<usize>> = event
        .mentionees
        .iter()
        .filter(|mentionee| bot.is_me(mentionee))
        .filter_map(|mentionee| {
            let end = mentionee.index.checked_add(mentionee.length)?;
            Some(mentionee.index..end)
        })
        .collect();

    Ok(remove_utf16_spans(&event.text, spans).trim().to_string())
}

/// Removes UTF-16 code unit ranges from `text`. Ranges outside the text or
/// splitting a surrogate pair are ignored.
fn remove_utf16_spans(text: &str, mut spans: Vec<Range<usize>>) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    spans.retain(|span| span.start < span.end && span.end <= units.len());
    spans.retain(|span| !splits_surrogate(&units, span.start) && !splits_surrogate(&units, span.end));
    spans.sort_by_key(|span| span.start);

    let mut kept = Vec::with_capacity(units.len());
    let mut cursor = 0;
    for span in spans {
        if span.start >= cursor {
            kept.extend_from_slice(&units[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    kept.extend_from_slice(&units[cursor..]);

    String::from_utf16_lossy(&kept)
}

fn splits_surrogate(units: &[u16], idx: usize) -> bool {
    // A low surrogate at `idx` means the boundary falls inside a pair.
    units
        .get(idx)
        .is_some_and(|unit| (0xDC00..=0xDFFF).contains(unit))
}
