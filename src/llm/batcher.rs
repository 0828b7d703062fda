use crate::models::Cue;

pub struct SubtitleBatcher {
    max_cues: usize,
    max_chars: usize,
}

impl SubtitleBatcher {
    pub fn new(max_cues: usize, max_chars: usize) -> Self {
        Self {
            max_cues: max_cues.max(1),
            max_chars: max_chars.max(1),
        }
    }

    pub fn create_batches(&self, cues: Vec<Cue>) -> Vec<Vec<Cue>> {
        let mut batches = Vec::new();
        let mut current_batch = Vec::new();
        let mut current_chars = 0;

        for cue in cues {
            let cue_chars = Self::estimate_cue_chars(&cue);

            // An oversize cue goes out alone rather than being cut
            if cue_chars > self.max_chars {
                if !current_batch.is_empty() {
                    batches.push(std::mem::take(&mut current_batch));
                    current_chars = 0;
                }
                batches.push(vec![cue]);
                continue;
            }

            if current_batch.len() >= self.max_cues || current_chars + cue_chars > self.max_chars {
                if !current_batch.is_empty() {
                    batches.push(std::mem::take(&mut current_batch));
                }
                current_chars = 0;
            }

            current_chars += cue_chars;
            current_batch.push(cue);
        }

        if !current_batch.is_empty() {
            batches.push(current_batch);
        }

        batches
    }

    fn estimate_cue_chars(cue: &Cue) -> usize {
        cue.char_len() + 8
    }
}

impl Default for SubtitleBatcher {
    fn default() -> Self {
        Self::new(10, 6_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cues(n: u32, text: &str) -> Vec<Cue> {
        (1..=n).map(|i| Cue::new(i, 0, 1000, text)).collect()
    }

    #[test]
    fn test_batches_by_count() {
        let batches = SubtitleBatcher::new(10, 6_000).create_batches(cues(25, "hello"));
        let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(batches[1][0].index, 11);
    }

    #[test]
    fn test_batches_by_chars() {
        // 12 + 8 chars per cue, 50 chars fit two cues
        let batches = SubtitleBatcher::new(10, 50).create_batches(cues(5, "abcdefghijkl"));
        let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_oversize_cue_is_alone() {
        let mut input = cues(2, "ok");
        input.insert(1, Cue::new(99, 0, 1000, "x".repeat(100)));
        let batches = SubtitleBatcher::new(10, 50).create_batches(input);
        let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
        assert_eq!(batches[1][0].index, 99);
    }

    #[test]
    fn test_empty_input() {
        assert!(SubtitleBatcher::default().create_batches(Vec::new()).is_empty());
    }
}
