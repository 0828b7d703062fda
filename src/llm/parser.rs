use lazy_static::lazy_static;
use regex::Regex;

use crate::llm::prompts::decode_line_breaks;
use crate::models::Cue;

lazy_static! {
    static ref NUMBERED_LINE: Regex =
        Regex::new(r"^\[(\d+)\]\s*(.+)$").expect("valid numbered line regex");
}

/// Maps a translated batch back onto the original cues.
///
/// Index and timing always come from `original`. Lines are matched by their
/// `[n]` prefix; when the model dropped the numbering but returned exactly one
/// line per cue the lines are taken in order. Anything else keeps the original
/// text for the cues that were not translated.
pub fn parse_translated_batch(original: &[Cue], response: &str) -> Vec<Cue> {
    let lines: Vec<&str> = response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut translated: Vec<Option<String>> = vec![None; original.len()];
    let mut numbered = 0;

    for line in &lines {
        let Some(caps) = NUMBERED_LINE.captures(line) else {
            continue;
        };
        numbered += 1;
        let Ok(n) = caps[1].parse::<usize>() else {
            continue;
        };
        if n == 0 || n > original.len() {
            continue;
        }
        let slot = &mut translated[n - 1];
        if slot.is_none() {
            *slot = Some(decode_line_breaks(caps[2].trim()));
        }
    }

    if translated.iter().all(Option::is_some) {
        return original
            .iter()
            .zip(translated)
            .map(|(cue, text)| cue.with_text(text.unwrap_or_default()))
            .collect();
    }

    if numbered == 0 && lines.len() == original.len() {
        tracing::debug!("Translation lines carry no numbering, matching by position");
        return original
            .iter()
            .zip(lines)
            .map(|(cue, line)| cue.with_text(decode_line_breaks(line)))
            .collect();
    }

    let missing = translated.iter().filter(|t| t.is_none()).count();
    tracing::warn!(
        "Translation incomplete: {} of {} subtitles keep their original text",
        missing,
        original.len()
    );

    original
        .iter()
        .zip(translated)
        .map(|(cue, text)| match text {
            Some(text) => cue.with_text(text),
            None => cue.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<Cue> {
        vec![
            Cue::new(11, 0, 1000, "一"),
            Cue::new(12, 1000, 2000, "二"),
            Cue::new(13, 2000, 3000, "三"),
        ]
    }

    #[test]
    fn test_numbered_lines_any_order() {
        let result = parse_translated_batch(&batch(), "[2] two\n\n[1] one\n[3]   three  ");
        let texts: Vec<_> = result.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(result[0].index, 11);
        assert_eq!(result[2].start_ms, 2000);
    }

    #[test]
    fn test_first_duplicate_wins_and_out_of_range_ignored() {
        let result = parse_translated_batch(&batch(), "[1] one\n[1] uno\n[2] two\n[3] three\n[9] nine");
        assert_eq!(result[0].text, "one");
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_positional_fallback() {
        let result = parse_translated_batch(&batch(), "one\ntwo\nthree\n");
        let texts: Vec<_> = result.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_partial_keeps_original_text() {
        let result = parse_translated_batch(&batch(), "[1] one\n[3] three");
        let texts: Vec<_> = result.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "二", "three"]);
    }

    #[test]
    fn test_garbage_keeps_everything() {
        let result = parse_translated_batch(&batch(), "Sorry, I cannot help with that.");
        assert_eq!(result, batch());
    }

    #[test]
    fn test_line_breaks_restored() {
        let original = vec![Cue::new(1, 0, 1000, "a\nb")];
        let result = parse_translated_batch(&original, "[1] first \\N second");
        assert_eq!(result[0].text, "first\nsecond");
    }
}
