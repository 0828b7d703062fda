use std::path::Path;

use crate::config::LanguageEntry;
use crate::models::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Subtitle,
    Video,
    Audio,
    Unknown,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        let ext = extension(path).to_lowercase();
        match ext.as_str() {
            ".srt" | ".vtt" | ".ass" | ".ssa" => FileKind::Subtitle,
            ".mp4" | ".avi" | ".mkv" | ".mov" | ".wmv" | ".flv" | ".webm" | ".m4v" => {
                FileKind::Video
            }
            ".mp3" | ".wav" | ".aac" | ".flac" | ".ogg" | ".m4a" | ".wma" => FileKind::Audio,
            _ => FileKind::Unknown,
        }
    }

    pub fn actions(&self) -> &'static [Action] {
        match self {
            FileKind::Subtitle => &[Action::TranslateSubtitle],
            FileKind::Video | FileKind::Audio => &[Action::GenerateSubtitle],
            FileKind::Unknown => &[Action::GenerateSubtitle, Action::TranslateSubtitle],
        }
    }
}

// (code, English name, Chinese name)
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("zh", "Chinese", "中文"),
    ("en", "English", "英文"),
    ("ja", "Japanese", "日文"),
    ("ko", "Korean", "韩文"),
    ("fr", "French", "法文"),
    ("de", "German", "德文"),
    ("es", "Spanish", "西班牙文"),
    ("ru", "Russian", "俄文"),
    ("pt", "Portuguese", "葡萄牙文"),
    ("it", "Italian", "意大利文"),
    ("nl", "Dutch", "荷兰文"),
    ("ar", "Arabic", "阿拉伯文"),
    ("th", "Thai", "泰文"),
    ("vi", "Vietnamese", "越南文"),
];

pub fn builtin_languages() -> impl Iterator<Item = LanguageEntry> {
    LANGUAGES.iter().map(|(code, name, _)| LanguageEntry {
        name: name.to_string(),
        code: code.to_string(),
    })
}

/// Resolves a language name (English or Chinese, any case) to its code.
/// Configured languages take precedence over the built-in table.
pub fn language_code(name: &str, configured: &[LanguageEntry]) -> Option<String> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    if let Some(entry) = configured
        .iter()
        .find(|e| e.name.to_lowercase() == wanted)
    {
        return Some(entry.code.clone());
    }

    LANGUAGES
        .iter()
        .find(|(_, en, zh)| en.to_lowercase() == wanted || *zh == wanted)
        .map(|(code, _, _)| code.to_string())
}

pub fn language_name(code: &str) -> Option<&'static str> {
    let wanted = code.trim().to_lowercase();
    LANGUAGES
        .iter()
        .find(|(c, _, _)| *c == wanted)
        .map(|(_, en, _)| *en)
}

pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(i) if i > 0 && i < name.len() - 1 => name[..i].to_string(),
        _ => name,
    }
}

/// Extension including the dot, or empty when there is none.
pub fn extension(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(i) if i > 0 && i < name.len() - 1 => name[i..].to_string(),
        _ => String::new(),
    }
}

pub fn subtitle_file_name(input: &Path) -> String {
    format!("{}.srt", base_name(input))
}

pub fn audio_file_name(input: &Path) -> String {
    format!("{}.aac", base_name(input))
}

pub fn translated_file_name(input: &Path, target_lang: &str, configured: &[LanguageEntry]) -> String {
    let base = base_name(input);
    match language_code(target_lang, configured) {
        Some(code) => format!("{}.{}.srt", base, code),
        None => format!("{}_translated.srt", base),
    }
}
