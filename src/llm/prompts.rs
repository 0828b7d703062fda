use serde::{Deserialize, Serialize};

use crate::models::Cue;

pub const SYSTEM_PROMPT: &str = r#"You are a professional subtitle translator.
Each input line has the form "[n] text". Translate the text of every line and
answer with exactly one line per input line, keeping the "[n] " prefix and the
original numbering. "\N" marks a line break inside a subtitle; keep it where it
belongs in the translation. Do not merge, split, skip or explain lines."#;

/// Marker for a line break inside one cue while it travels through the prompt.
pub const LINE_BREAK_MARKER: &str = "\\N";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationOptions {
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub translation_options: Option<TranslationOptions>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            translation_options: None,
        }
    }

    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(model, vec![ChatMessage::user(prompt)])
    }

    pub fn with_translation(mut self, options: TranslationOptions) -> Self {
        self.translation_options = Some(options);
        self
    }

    pub fn estimate_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

/// Qwen-MT models take languages through `translation_options` and no system prompt.
pub fn is_translation_model(model: &str) -> bool {
    model.to_lowercase().starts_with("qwen-mt")
}

#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub cues: Vec<Cue>,
    pub source_lang: String,
    pub target_lang: String,
}

impl TranslationRequest {
    pub fn new(cues: Vec<Cue>, source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            cues,
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
        }
    }

    pub fn to_prompt(&self) -> String {
        self.cues
            .iter()
            .enumerate()
            .map(|(i, cue)| format!("[{}] {}", i + 1, encode_line_breaks(&cue.text)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_completion_request(&self, model: &str) -> CompletionRequest {
        let prompt = self.to_prompt();

        if is_translation_model(model) {
            return CompletionRequest::prompt(model, prompt).with_translation(TranslationOptions {
                source_lang: self.source_lang.clone(),
                target_lang: self.target_lang.clone(),
            });
        }

        CompletionRequest::new(
            model,
            vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(format!(
                    "Translate from {} to {}:\n\n{}",
                    self.source_lang, self.target_lang, prompt
                )),
            ],
        )
    }
}

pub fn encode_line_breaks(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(LINE_BREAK_MARKER)
}

pub fn decode_line_breaks(text: &str) -> String {
    text.split(LINE_BREAK_MARKER)
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cues() -> Vec<Cue> {
        vec![
            Cue::new(7, 0, 1000, "你好"),
            Cue::new(8, 1000, 2000, "第一行\n第二行"),
        ]
    }

    #[test]
    fn test_prompt_numbers_within_batch() {
        let request = TranslationRequest::new(cues(), "Chinese", "English");
        assert_eq!(request.to_prompt(), "[1] 你好\n[2] 第一行\\N第二行");
    }

    #[test]
    fn test_mt_model_uses_translation_options() {
        let request = TranslationRequest::new(cues(), "Chinese", "English");
        let completion = request.to_completion_request("qwen-mt-plus");
        assert_eq!(completion.messages.len(), 1);
        assert_eq!(completion.messages[0].role, "user");
        assert_eq!(
            completion.translation_options,
            Some(TranslationOptions {
                source_lang: "Chinese".into(),
                target_lang: "English".into(),
            })
        );
    }

    #[test]
    fn test_chat_model_uses_system_prompt() {
        let request = TranslationRequest::new(cues(), "Chinese", "English");
        let completion = request.to_completion_request("qwen-plus");
        assert!(completion.translation_options.is_none());
        assert_eq!(completion.messages[0].role, "system");
        assert!(completion.messages[1].content.starts_with("Translate from Chinese to English"));
        assert!(completion.messages[1].content.ends_with("[2] 第一行\\N第二行"));
    }

    #[test]
    fn test_line_break_markers() {
        assert_eq!(encode_line_breaks("a\r\nb"), "a\\Nb");
        assert_eq!(decode_line_breaks("a \\N b"), "a\nb");
    }
}
