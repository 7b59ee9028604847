use super::engine::OcrLine;
use super::RecognitionCandidate;

/// Frame and separator artifacts Tesseract reads at the edges of a seat box.
const EDGE_NOISE: &[char] = &[
    '|', '_', '~', '=', '[', ']', '(', ')', '{', '}', '<', '>', '.', ',', ':', ';', '\'', '`',
];

/// Lines below this Tesseract confidence (0-100) are discarded as noise.
pub const MIN_LINE_CONFIDENCE: f32 = 20.0;

/// Strips border artifacts from recognized text.
pub fn clean_text(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || EDGE_NOISE.contains(&c))
        .to_string()
}

/// Turns Tesseract lines into candidates.
///
/// Each non-empty line above `MIN_LINE_CONFIDENCE` becomes one candidate
/// with its confidence scaled to 0.0-1.0.
pub fn lines_to_candidates(lines: &[OcrLine]) -> Vec<RecognitionCandidate> {
    lines
        .iter()
        .filter(|line| line.confidence >= MIN_LINE_CONFIDENCE)
        .filter_map(|line| {
            let text = clean_text(&line.text);
            if text.is_empty() {
                None
            } else {
                Some(RecognitionCandidate::new(text, line.confidence / 100.0))
            }
        })
        .collect()
}
