use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::Cue;

lazy_static! {
    static ref TIMING_LINE: Regex = Regex::new(
        r"^(\d{2}:\d{2}:\d{2},\d{3})\s*-->\s*(\d{2}:\d{2}:\d{2},\d{3})$"
    )
    .expect("valid timing regex");
    static ref INDEX_LINE: Regex = Regex::new(r"^\d+$").expect("valid index regex");
}

pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

pub fn parse_timestamp(text: &str) -> Result<u64> {
    let invalid = || Error::InvalidSubtitle(format!("bad timestamp '{}'", text));

    let (hms, millis) = text.trim().split_once(',').ok_or_else(invalid)?;
    let mut parts = hms.split(':');
    let mut next = || -> Result<u64> {
        parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(invalid)
    };
    let hours = next()?;
    let minutes = next()?;
    let seconds = next()?;
    let millis: u64 = millis.parse().map_err(|_| invalid())?;

    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return Err(invalid());
    }
    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1000 + millis)
}

pub fn format_timing(cue: &Cue) -> String {
    format!(
        "{} --> {}",
        format_timestamp(cue.start_ms),
        format_timestamp(cue.end_ms)
    )
}

#[derive(Default)]
struct PendingCue {
    index: Option<u32>,
    timing: Option<(u64, u64)>,
    lines: Vec<String>,
}

impl PendingCue {
    fn finish(self, fallback_index: u32) -> Option<Cue> {
        let (start_ms, end_ms) = self.timing?;
        if self.lines.is_empty() {
            return None;
        }
        Some(Cue {
            index: self.index.unwrap_or(fallback_index),
            start_ms,
            end_ms,
            text: self.lines.join("\n"),
        })
    }
}

/// Parses SRT text. Cues lacking a timing line or any text are dropped.
pub fn parse_srt(input: &str) -> Vec<Cue> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut cues = Vec::new();
    let mut pending = PendingCue::default();

    for raw in input.lines() {
        let line = raw.trim();

        if line.is_empty() {
            let done = std::mem::take(&mut pending);
            if let Some(cue) = done.finish(cues.len() as u32 + 1) {
                cues.push(cue);
            }
            continue;
        }

        if pending.timing.is_none() && INDEX_LINE.is_match(line) {
            pending.index = line.parse().ok();
            continue;
        }

        if let Some(caps) = TIMING_LINE.captures(line) {
            if pending.lines.is_empty() {
                if let (Ok(start), Ok(end)) = (parse_timestamp(&caps[1]), parse_timestamp(&caps[2])) {
                    pending.timing = Some((start, end));
                    continue;
                }
            }
        }

        if pending.timing.is_some() {
            pending.lines.push(line.to_string());
        } else {
            tracing::debug!("Skipping stray subtitle line: {}", line);
        }
    }

    if let Some(cue) = pending.finish(cues.len() as u32 + 1) {
        cues.push(cue);
    }

    cues
}

/// Serializes cues. Blocks are separated by one blank line, no trailing blank line.
pub fn write_srt(cues: &[Cue]) -> String {
    cues.iter()
        .map(|cue| format!("{}\n{}\n{}\n", cue.index, format_timing(cue), cue.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn renumber(cues: &mut [Cue]) {
    for (i, cue) in cues.iter_mut().enumerate() {
        cue.index = i as u32 + 1;
    }
}

pub async fn read_srt_file(path: &std::path::Path) -> Result<Vec<Cue>> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(parse_srt(&text))
}

pub async fn write_srt_file(path: &std::path::Path, cues: &[Cue]) -> Result<()> {
    tokio::fs::write(path, write_srt(cues)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n2\n00:00:03,000 --> 00:00:04,000\nTwo\nlines\n";

    #[test]
    fn test_timestamp_format_and_parse() {
        assert_eq!(format_timestamp(0), "00:00:00,000");
        assert_eq!(format_timestamp(3_723_004), "01:02:03,004");
        assert_eq!(parse_timestamp("01:02:03,004").unwrap(), 3_723_004);
        assert!(parse_timestamp("01:62:03,004").is_err());
        assert!(parse_timestamp("garbage").is_err());
    }

    #[test]
    fn test_parse_basic_srt() {
        let cues = parse_srt(SAMPLE);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], Cue::new(1, 1000, 2500, "Hello there"));
        assert_eq!(cues[1].text, "Two\nlines");
    }

    #[test]
    fn test_parse_crlf_bom_and_missing_trailing_newline() {
        let input = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nHi\r\n\r\n2\r\n00:00:02,000 --> 00:00:03,000\r\nBye";
        let cues = parse_srt(input);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].text, "Bye");
    }

    #[test]
    fn test_numeric_text_line_stays_in_cue() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\nCount down\n42\n";
        let cues = parse_srt(input);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Count down\n42");
    }

    #[test]
    fn test_cue_without_timing_is_dropped() {
        let input = "1\nno timing here\n\n2\n00:00:01,000 --> 00:00:02,000\nkept\n";
        let cues = parse_srt(input);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].index, 2);
    }

    #[test]
    fn test_write_srt_layout() {
        let cues = parse_srt(SAMPLE);
        let written = write_srt(&cues);
        assert_eq!(
            written,
            "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n2\n00:00:03,000 --> 00:00:04,000\nTwo\nlines\n"
        );
        assert_eq!(parse_srt(&written), cues);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_srt("").is_empty());
        assert!(parse_srt("\n\n  \n").is_empty());
        assert_eq!(write_srt(&[]), "");
    }
}
