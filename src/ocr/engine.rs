use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbaImage};
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;

use super::extract::lines_to_candidates;
use super::preprocess::prepare_for_ocr;
use super::setup::{find_tessdata_dir, find_tesseract_executable};
use super::{RecognitionCandidate, Recognizer};

/// Tesseract page segmentation mode 7: treat the image as a single text line.
const PSM_SINGLE_LINE: &str = "7";

/// Represents a line of OCR text with confidence score
#[derive(Debug, Clone)]
pub struct OcrLine {
    pub text: String,
    /// Mean word confidence, 0-100
    pub confidence: f32,
}

/// Recognizer that shells out to the Tesseract CLI for one language set.
///
/// Register one instance per script: `eng` as primary, a CJK set as secondary.
pub struct TesseractRecognizer {
    name: String,
    language: String,
    executable: PathBuf,
    tessdata_dir: PathBuf,
}

impl TesseractRecognizer {
    /// Locates Tesseract and the traineddata for `language`.
    pub fn new(name: &str, language: &str) -> Result<Self> {
        let executable = find_tesseract_executable()?;
        let tessdata_dir = find_tessdata_dir(language)?;
        log::info!(
            "Recognizer '{}' ready: {} ({}) with tessdata {}",
            name,
            executable.display(),
            language,
            tessdata_dir.display()
        );
        Ok(Self {
            name: name.to_string(),
            language: language.to_string(),
            executable,
            tessdata_dir,
        })
    }

    /// Runs Tesseract on a preprocessed grayscale image.
    /// Returns structured output with lines and confidence scores.
    pub fn recognize_lines(&self, img: &GrayImage) -> Result<Vec<OcrLine>> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let output = Command::new(&self.executable)
            .arg(temp_input.path())
            .arg(&output_base)
            .arg("--tessdata-dir")
            .arg(&self.tessdata_dir)
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(PSM_SINGLE_LINE)
            .arg("tsv")
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, img: &RgbaImage) -> Result<Vec<RecognitionCandidate>> {
        let prepared = prepare_for_ocr(img);
        let lines = self.recognize_lines(&prepared)?;
        Ok(lines_to_candidates(&lines))
    }
}

/// Accumulates the words of the line being parsed.
#[derive(Default)]
struct LineBuilder {
    words: Vec<String>,
    conf_sum: f32,
}

impl LineBuilder {
    fn push(&mut self, text: &str, confidence: f32) {
        self.words.push(text.to_string());
        self.conf_sum += confidence;
    }

    fn finish(&mut self) -> Option<OcrLine> {
        if self.words.is_empty() {
            return None;
        }
        let words = std::mem::take(&mut self.words);
        let confidence = self.conf_sum / words.len() as f32;
        self.conf_sum = 0.0;
        Some(OcrLine {
            text: words.join(" "),
            confidence,
        })
    }
}

/// Parses Tesseract TSV output into lines of words.
///
/// TSV fields: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Only level 5 (word) rows carry text.
pub fn parse_tsv_output(tsv: &str) -> Vec<OcrLine> {
    let mut lines = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut builder = LineBuilder::default();

    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        // block, paragraph, line identify a physical line
        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current_key.is_some_and(|k| k != key) {
            lines.extend(builder.finish());
        }
        current_key = Some(key);
        builder.push(text, conf);
    }

    lines.extend(builder.finish());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(block: i32, line: i32, word: i32, conf: f32, text: &str) -> String {
        format!(
            "5\t1\t{}\t1\t{}\t{}\t0\t0\t10\t10\t{}\t{}",
            block, line, word, conf, text
        )
    }

    #[test]
    fn test_parse_tsv_single_line() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t20\t-1\t".to_string(),
            word_row(1, 1, 1, 96.0, "Hero77"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hero77");
        assert_eq!(lines[0].confidence, 96.0);
    }

    #[test]
    fn test_parse_tsv_groups_words_by_line() {
        let tsv = [
            HEADER.to_string(),
            word_row(1, 1, 1, 90.0, "Big"),
            word_row(1, 1, 2, 80.0, "Fish"),
            word_row(1, 2, 1, 50.0, "noise"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Big Fish");
        assert_eq!(lines[0].confidence, 85.0);
        assert_eq!(lines[1].text, "noise");
    }

    #[test]
    fn test_parse_tsv_skips_empty_and_negative_confidence() {
        let tsv = [
            HEADER.to_string(),
            word_row(1, 1, 1, -1.0, "ghost"),
            word_row(1, 1, 2, 70.0, " "),
        ]
        .join("\n");

        assert!(parse_tsv_output(&tsv).is_empty());
    }
}
