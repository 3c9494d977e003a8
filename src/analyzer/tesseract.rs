use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::local::{RecognizedText, TextRecognizer};
use crate::error::AnalysisError;
use crate::frame::Frame;

pub const DEFAULT_LANGUAGES: &str = "eng+chi_sim";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
/// Assume a single uniform block of text.
const PAGE_SEGMENTATION_MODE: &str = "6";

/// Text recognition through the `tesseract` command-line engine.
pub struct TesseractRecognizer {
    binary: PathBuf,
    languages: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<PathBuf>, languages: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn requested_languages(&self) -> Vec<&str> {
        self.languages
            .split('+')
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .collect()
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new("tesseract", DEFAULT_LANGUAGES)
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn initialize(&self) -> Result<(), AnalysisError> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary)
                .arg("--list-langs")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AnalysisError::Initialization("tesseract --list-langs timed out".into()))?
        .map_err(|err| {
            AnalysisError::Initialization(format!("cannot run {}: {err}", self.binary.display()))
        })?;

        if !output.status.success() {
            return Err(AnalysisError::Initialization(format!(
                "tesseract --list-langs exited with {}",
                output.status
            )));
        }

        // Older builds print the list on stderr.
        let listing = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let installed = parse_language_list(&listing);
        let requested = self.requested_languages();
        if requested.is_empty() {
            return Err(AnalysisError::Initialization("no recognition languages configured".into()));
        }
        let missing: Vec<&str> = requested
            .into_iter()
            .filter(|lang| !installed.iter().any(|have| have == lang))
            .collect();

        if !missing.is_empty() {
            return Err(AnalysisError::Initialization(format!(
                "missing tesseract language data: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    async fn recognize(&self, frame: &Frame) -> Result<RecognizedText, AnalysisError> {
        let mut child = Command::new(&self.binary)
            .args([
                "stdin",
                "stdout",
                "-l",
                self.languages.as_str(),
                "--psm",
                PAGE_SEGMENTATION_MODE,
                "tsv",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnalysisError::Recognition("tesseract stdin unavailable".into()))?;
        let image = frame.encoded().to_vec();

        let run = async move {
            stdin.write_all(&image).await?;
            drop(stdin);
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| AnalysisError::Recognition(format!("timed out after {:?}", self.timeout)))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

/// Fold tesseract TSV output into text (one line per recognized line) and the
/// mean word confidence.
fn parse_tsv(tsv: &str) -> RecognizedText {
    let mut lines: Vec<(String, Vec<String>)> = Vec::new();
    let mut confidence_sum = 0.0f32;
    let mut word_count = 0usize;

    for row in tsv.lines().skip(1) {
        let columns: Vec<&str> = row.split('\t').collect();
        if columns.len() < 12 || columns[0] != "5" {
            continue;
        }
        let text = columns[11].trim();
        let Ok(confidence) = columns[10].trim().parse::<f32>() else {
            continue;
        };
        if text.is_empty() || confidence < 0.0 {
            continue;
        }

        let line_key = format!("{}:{}:{}", columns[2], columns[3], columns[4]);
        match lines.last_mut() {
            Some((key, words)) if *key == line_key => words.push(text.to_string()),
            _ => lines.push((line_key, vec![text.to_string()])),
        }
        confidence_sum += confidence;
        word_count += 1;
    }

    let text = lines
        .into_iter()
        .map(|(_, words)| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let confidence = if word_count == 0 {
        0.0
    } else {
        confidence_sum / word_count as f32
    };

    RecognizedText { text, confidence }
}
