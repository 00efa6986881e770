//! Strategies that shell out to poppler and tesseract.

use super::{ExtractionStrategy, PAGE_DELIMITER, join_pages, write_artifact};
use crate::config::OcrConfig;
use crate::error::{BenchError, Result};
use crate::llm::{ChatBackend, Message, Prompts};
use crate::metrics::ExtraMetrics;
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Run a command to completion, returning stdout.
async fn run_tool<I, S>(program: &str, args: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| BenchError::external_tool(program, e))?;

    if !output.status.success() {
        return Err(BenchError::external_tool(
            program,
            format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(output.stdout)
}

/// Layout-preserving text via `pdftotext -layout`.
#[derive(Debug, Clone)]
pub struct PdftotextLayout {
    binary: String,
}

impl PdftotextLayout {
    pub fn new(ocr: &OcrConfig) -> Self {
        Self {
            binary: ocr.pdftotext.clone(),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for PdftotextLayout {
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics> {
        let stdout = run_tool(
            &self.binary,
            [OsStr::new("-q"), OsStr::new("-layout"), input.as_os_str(), OsStr::new("-")],
        )
        .await?;
        write_artifact(output, &String::from_utf8_lossy(&stdout))?;
        Ok(ExtraMetrics::none())
    }
}

/// Scratch folder for page images, removed on drop.
struct ScratchDir(PathBuf);

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Rasterise `input` with pdftoppm and OCR every page with tesseract.
async fn ocr_pages(ocr: &OcrConfig, input: &Path, output: &Path) -> Result<Vec<String>> {
    let scratch = ScratchDir(output.with_extension("pages"));
    tokio::fs::create_dir_all(&scratch.0)
        .await
        .map_err(|e| BenchError::io(&scratch.0, e))?;

    let prefix = scratch.0.join("page");
    run_tool(
        &ocr.pdftoppm,
        [
            OsStr::new("-r"),
            OsStr::new(&ocr.dpi.to_string()),
            OsStr::new("-png"),
            input.as_os_str(),
            prefix.as_os_str(),
        ],
    )
    .await?;

    let mut images = Vec::new();
    let mut entries = tokio::fs::read_dir(&scratch.0)
        .await
        .map_err(|e| BenchError::io(&scratch.0, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| BenchError::io(&scratch.0, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "png") {
            images.push(path);
        }
    }
    // pdftoppm zero-pads page numbers, so name order is page order.
    images.sort();

    let mut pages = Vec::with_capacity(images.len());
    for image in &images {
        debug!(image = %image.display(), "running tesseract");
        let stdout = run_tool(
            &ocr.tesseract,
            [
                image.as_os_str(),
                OsStr::new("stdout"),
                OsStr::new("-l"),
                OsStr::new(&ocr.language),
            ],
        )
        .await?;
        pages.push(String::from_utf8_lossy(&stdout).into_owned());
    }
    Ok(pages)
}

/// Plain OCR of rasterised pages.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    ocr: OcrConfig,
}

impl TesseractOcr {
    pub fn new(ocr: OcrConfig) -> Self {
        Self { ocr }
    }
}

#[async_trait]
impl ExtractionStrategy for TesseractOcr {
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics> {
        let pages = ocr_pages(&self.ocr, input, output).await?;
        write_artifact(output, &join_pages(&pages))?;
        Ok(ExtraMetrics::none())
    }
}

/// OCR followed by page-by-page LLM correction.
///
/// Writes the corrected text to the artifact path and the raw OCR next to it
/// as `<stem>_raw_ocr.md`. Reports the LLM tokens spent.
pub struct OcrLlmCorrected {
    ocr: OcrConfig,
    backend: Arc<dyn ChatBackend>,
    model: String,
}

impl OcrLlmCorrected {
    pub fn new(ocr: OcrConfig, backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self {
            ocr,
            backend,
            model: model.into(),
        }
    }
}

/// Sibling path for the raw OCR text of an artifact.
pub fn raw_ocr_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}_raw_ocr.md", stem))
}

/// Ask the model to correct each page; returns corrected pages and tokens used.
pub async fn correct_pages(
    backend: &dyn ChatBackend,
    model: &str,
    pages: &[String],
) -> Result<(Vec<String>, u64)> {
    let mut corrected = Vec::with_capacity(pages.len());
    let mut tokens = 0u64;

    for page in pages {
        if page.trim().is_empty() {
            corrected.push(String::new());
            continue;
        }
        let messages = [Message::system(Prompts::ocr_correction()), Message::user(page.as_str())];
        let response = backend.chat(model, &messages, Some(0.0)).await?;
        tokens += response.usage.map(|u| u.total_tokens as u64).unwrap_or(0);
        corrected.push(response.content.trim().to_string());
    }
    Ok((corrected, tokens))
}

#[async_trait]
impl ExtractionStrategy for OcrLlmCorrected {
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics> {
        let pages = ocr_pages(&self.ocr, input, output).await?;
        write_artifact(&raw_ocr_path(output), &join_pages(&pages))?;

        let (corrected, tokens) = correct_pages(self.backend.as_ref(), &self.model, &pages).await?;
        write_artifact(output, &corrected.join("\n\n"))?;
        Ok(ExtraMetrics::with_llm_tokens(tokens))
    }
}

/// Split a form-feed delimited artifact back into pages.
pub fn split_pages(text: &str) -> Vec<&str> {
    text.split(PAGE_DELIMITER).filter(|p| !p.is_empty()).collect()
}
