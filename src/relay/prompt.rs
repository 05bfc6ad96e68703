use crate::config::PromptConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}
impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Translate,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub temperature: f32,

    /// Always the system instruction followed by the user content.
    messages: Vec<ChatMessage>,
}
impl Prompt {
    pub fn new(kind: PromptKind, temperature: f32, instruction: &str, content: &str) -> Self {
        Self {
            kind,
            temperature,
            messages: vec![
                ChatMessage::new(Role::System, instruction),
                ChatMessage::new(Role::User, content),
            ],
        }
    }

    pub fn instruction(&self) -> &str {
        &self.messages[0].content
    }

    pub fn content(&self) -> &str {
        &self.messages[1].content
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    config: PromptConfig,
}
impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Text starting with the trigger prefix gets the translate instruction with
    /// the prefix stripped, anything else gets the default instruction verbatim.
    pub fn build(&self, text: &str) -> Prompt {
        match text.strip_prefix(self.config.trigger_prefix.as_str()) {
            Some(rest) if !self.config.trigger_prefix.is_empty() => Prompt::new(
                PromptKind::Translate,
                self.config.translate_temperature,
                &self.config.translate_instruction,
                rest.trim(),
            ),
            _ => Prompt::new(
                PromptKind::Default,
                self.config.default_temperature,
                &self.config.default_instruction,
                text,
            ),
        }
    }

    pub fn fallback_text(&self) -> &str {
        &self.config.fallback_text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(PromptConfig::default())
    }

    #[test]
    fn test_trigger_prefix_selects_translation() {
        let prompt = builder().build("翻訳：こんにちは");
        assert_eq!(prompt.kind, PromptKind::Translate);
        assert_eq!(prompt.instruction(), "日本語をシンハラ語に翻訳してください。");
        assert_eq!(prompt.content(), "こんにちは");
        assert_eq!(prompt.temperature, 0.2);
        let roles: Vec<Role> = prompt.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
    }

    #[test]
    fn test_prefix_and_surrounding_whitespace_stripped() {
        let prompt = builder().build("翻訳：  おはよう 翻訳： ございます \n");
        assert_eq!(prompt.kind, PromptKind::Translate);

        // Only the leading prefix goes, later occurrences are content.
        assert_eq!(prompt.content(), "おはよう 翻訳： ございます");
    }

    #[test]
    fn test_default_instruction_is_verbatim() {
        for text in ["こんにちは", " 翻訳：leading space", "翻訳:ascii colon", "ほんやく：kana", ""] {
            let prompt = builder().build(text);
            assert_eq!(prompt.kind, PromptKind::Default, "{text:?}");
            assert_eq!(prompt.instruction(), "シンハラ語で答えてください。");
            assert_eq!(prompt.content(), text);
            assert_eq!(prompt.temperature, 0.5);
        }
    }

    #[test]
    fn test_prefix_match_is_case_sensitive() {
        let builder = PromptBuilder::new(PromptConfig {
            trigger_prefix: "tr:".to_string(),
            translate_instruction: "translate A to B".to_string(),
            ..PromptConfig::default()
        });
        assert_eq!(builder.build("tr: hello").content(), "hello");
        assert_eq!(builder.build("tr: hello").instruction(), "translate A to B");
        assert_eq!(builder.build("TR: hello").kind, PromptKind::Default);
    }

    #[test]
    fn test_empty_prefix_never_translates() {
        let builder = PromptBuilder::new(PromptConfig {
            trigger_prefix: String::new(),
            ..PromptConfig::default()
        });
        assert_eq!(builder.build("hello").kind, PromptKind::Default);
    }
}
