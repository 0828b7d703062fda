use crate::models::{Cue, TranscriptionDocument};

/// Sentences without an end time are shown for this long.
const DEFAULT_SENTENCE_MS: u64 = 5_000;

pub const NO_SPEECH_TEXT: &str = "No speech recognized";

pub fn cues_from_transcription(doc: &TranscriptionDocument) -> Vec<Cue> {
    let mut cues = Vec::new();

    for transcript in &doc.transcripts {
        for sentence in &transcript.sentences {
            let text = sentence.text.as_deref().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            let begin = sentence.begin_time.unwrap_or(0);
            let end = sentence
                .end_time
                .unwrap_or(begin + DEFAULT_SENTENCE_MS);

            cues.push(Cue::new(cues.len() as u32 + 1, begin, end, text));
        }
    }

    cues
}

pub fn no_speech_cue() -> Cue {
    Cue::new(1, 0, DEFAULT_SENTENCE_MS, NO_SPEECH_TEXT)
}
