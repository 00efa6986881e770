//! In-process extractors built on `pdf-extract` and `lopdf`.
//!
//! These are CPU-bound, so they run on the blocking thread pool.

use super::{ExtractionStrategy, join_pages, write_artifact};
use crate::error::{BenchError, Result};
use crate::metrics::ExtraMetrics;
use async_trait::async_trait;
use std::fs;
use std::path::Path;

async fn run_blocking<F>(name: &'static str, job: F) -> Result<ExtraMetrics>
where
    F: FnOnce() -> Result<ExtraMetrics> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| BenchError::strategy(name, format!("extraction task aborted: {}", e)))?
}

/// Whole-document text via `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractText;

#[async_trait]
impl ExtractionStrategy for PdfExtractText {
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics> {
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        run_blocking("pdf_extract", move || {
            let bytes = fs::read(&input).map_err(|e| BenchError::io(&input, e))?;
            let text = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| BenchError::strategy("pdf_extract", e))?;
            write_artifact(&output, text.trim())?;
            Ok(ExtraMetrics::none())
        })
        .await
    }
}

/// Text of every page in page order.
fn lopdf_page_texts(input: &Path, strategy: &str) -> Result<Vec<String>> {
    let doc = lopdf::Document::load(input).map_err(|e| BenchError::strategy(strategy, e))?;
    doc.get_pages()
        .keys()
        .map(|&number| {
            doc.extract_text(&[number])
                .map_err(|e| BenchError::strategy(strategy, format!("page {}: {}", number, e)))
        })
        .collect()
}

/// Per-page content-stream text via `lopdf`, pages separated by form feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfPages;

#[async_trait]
impl ExtractionStrategy for LopdfPages {
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics> {
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        run_blocking("lopdf_pages", move || {
            let pages = lopdf_page_texts(&input, "lopdf_pages")?;
            write_artifact(&output, &join_pages(&pages))?;
            Ok(ExtraMetrics::none())
        })
        .await
    }
}

/// HTML reconstruction: one `<div class="page">` per page, one `<p>` per text line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfHtml;

#[async_trait]
impl ExtractionStrategy for LopdfHtml {
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics> {
        let (input, output) = (input.to_path_buf(), output.to_path_buf());
        run_blocking("lopdf_html", move || {
            let pages = lopdf_page_texts(&input, "lopdf_html")?;
            let title = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            write_artifact(&output, &render_pages_html(&title, &pages))?;
            Ok(ExtraMetrics::none())
        })
        .await
    }
}

/// Render page texts as a standalone HTML document.
pub fn render_pages_html<S: AsRef<str>>(title: &str, pages: &[S]) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n",
        escape_html(title)
    );
    for (index, page) in pages.iter().enumerate() {
        html.push_str(&format!("<div class=\"page\" data-page=\"{}\">\n", index + 1));
        for line in page.as_ref().lines().map(str::trim).filter(|l| !l.is_empty()) {
            html.push_str("  <p>");
            html.push_str(&escape_html(line));
            html.push_str("</p>\n");
        }
        html.push_str("</div>\n");
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
