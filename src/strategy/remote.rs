//! Remote parsing service client (LlamaParse-compatible job API).
//!
//! A job is uploaded, polled until it completes and its result fetched as
//! markdown or plain text.

use super::{ExtractionStrategy, write_artifact};
use crate::config::ParseServiceConfig;
use crate::document::page_count;
use crate::error::{BenchError, Result};
use crate::metrics::ExtraMetrics;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which rendition of the parsed document to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResultType {
    Markdown,
    Text,
}

impl ParseResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseResultType::Markdown => "markdown",
            ParseResultType::Text => "text",
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Job state reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Success,
    Failed(String),
}

fn parse_status(body: &str) -> Result<JobStatus> {
    let status: StatusResponse = serde_json::from_str(body)
        .map_err(|e| BenchError::ParseService(format!("bad status response: {}", e)))?;
    Ok(match status.status.to_ascii_uppercase().as_str() {
        "SUCCESS" => JobStatus::Success,
        "PENDING" => JobStatus::Pending,
        other => JobStatus::Failed(other.to_string()),
    })
}

fn parse_result(body: &str, result_type: ParseResultType) -> Result<String> {
    let result: ResultResponse = serde_json::from_str(body)
        .map_err(|e| BenchError::ParseService(format!("bad result response: {}", e)))?;
    let content = match result_type {
        ParseResultType::Markdown => result.markdown,
        ParseResultType::Text => result.text,
    };
    content.ok_or_else(|| {
        BenchError::ParseService(format!("result has no '{}' field", result_type.as_str()))
    })
}

/// HTTP client for the parsing service.
#[derive(Clone)]
pub struct ParseServiceClient {
    client: Client,
    config: ParseServiceConfig,
}

impl ParseServiceClient {
    pub fn new(config: ParseServiceConfig, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/parsing/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BenchError::ParseService(format!("{} from {}: {}", status, url, body)));
        }
        Ok(body)
    }

    /// Upload a document and return the job id.
    pub async fn upload(&self, input: &Path, result_type: ParseResultType) -> Result<String> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| BenchError::io(input, e))?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")?;
        let form = Form::new()
            .part("file", part)
            .text("result_type", result_type.as_str())
            .text("language", self.config.language.clone());

        let response = self
            .client
            .post(self.url("upload"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BenchError::ParseService(format!("upload failed ({}): {}", status, body)));
        }

        let upload: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| BenchError::ParseService(format!("bad upload response: {}", e)))?;
        Ok(upload.id)
    }

    /// Poll until the job succeeds, fails or `max_polls` is exhausted.
    pub async fn wait(&self, job_id: &str) -> Result<()> {
        let url = self.url(&format!("job/{}", job_id));
        for poll in 1..=self.config.max_polls.max(1) {
            match parse_status(&self.get_text(&url).await?)? {
                JobStatus::Success => return Ok(()),
                JobStatus::Failed(status) => {
                    return Err(BenchError::ParseService(format!(
                        "job {} ended with status {}",
                        job_id, status
                    )));
                }
                JobStatus::Pending => {
                    debug!(job_id, poll, "parse job pending");
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
            }
        }
        Err(BenchError::ParseService(format!(
            "job {} did not finish after {} polls",
            job_id, self.config.max_polls
        )))
    }

    /// Fetch a finished job's result.
    pub async fn result(&self, job_id: &str, result_type: ParseResultType) -> Result<String> {
        let url = self.url(&format!("job/{}/result/{}", job_id, result_type.as_str()));
        parse_result(&self.get_text(&url).await?, result_type)
    }

    /// Upload, wait and fetch in one go.
    pub async fn parse(&self, input: &Path, result_type: ParseResultType) -> Result<String> {
        let job_id = self.upload(input, result_type).await?;
        info!(job_id = %job_id, file = %input.display(), "parse job submitted");
        self.wait(&job_id).await?;
        self.result(&job_id, result_type).await
    }
}

/// Extraction through the remote service. Reports the number of pages billed.
pub struct RemoteParse {
    client: ParseServiceClient,
    result_type: ParseResultType,
}

impl RemoteParse {
    pub fn new(client: ParseServiceClient, result_type: ParseResultType) -> Self {
        Self {
            client,
            result_type,
        }
    }

    fn name(&self) -> &'static str {
        match self.result_type {
            ParseResultType::Markdown => "remote_parse_md",
            ParseResultType::Text => "remote_parse_txt",
        }
    }
}

#[async_trait]
impl ExtractionStrategy for RemoteParse {
    async fn extract(&self, input: &Path, output: &Path) -> Result<ExtraMetrics> {
        if !self.client.is_configured() {
            return Err(BenchError::strategy(
                self.name(),
                "parse service API key is not set (PARSE_API_KEY)",
            ));
        }
        let content = self.client.parse(input, self.result_type).await?;
        write_artifact(output, &content)?;

        Ok(ExtraMetrics {
            pages_calls: billed_pages(input),
            ..ExtraMetrics::none()
        })
    }
}

/// Page count of the uploaded document, or `None` when lopdf cannot read it.
fn billed_pages(input: &Path) -> Option<u64> {
    match page_count(input) {
        Ok(pages) => Some(pages as u64),
        Err(e) => {
            warn!(file = %input.display(), error = %e, "could not count pages, recording N/A");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing::write_sample_pdf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(r#"{"status":"SUCCESS"}"#).unwrap(), JobStatus::Success);
        assert_eq!(parse_status(r#"{"status":"pending"}"#).unwrap(), JobStatus::Pending);
        assert_eq!(
            parse_status(r#"{"status":"ERROR","id":"x"}"#).unwrap(),
            JobStatus::Failed("ERROR".to_string())
        );
        assert!(parse_status("not json").is_err());
    }

    #[test]
    fn test_parse_result_picks_rendition() {
        let body = r##"{"markdown":"# Title","job_metadata":{}}"##;
        assert_eq!(parse_result(body, ParseResultType::Markdown).unwrap(), "# Title");
        assert!(parse_result(body, ParseResultType::Text).is_err());

        let body = r#"{"text":"plain"}"#;
        assert_eq!(parse_result(body, ParseResultType::Text).unwrap(), "plain");
    }

    #[test]
    fn test_url() {
        let client = ParseServiceClient::new(
            ParseServiceConfig {
                api_base: "https://parse.example.com/".to_string(),
                ..Default::default()
            },
            5,
        );
        assert_eq!(
            client.url("job/abc/result/text"),
            "https://parse.example.com/api/parsing/job/abc/result/text"
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let dir = TempDir::new().unwrap();
        let client = ParseServiceClient::new(ParseServiceConfig::default(), 5);
        let strategy = RemoteParse::new(client, ParseResultType::Markdown);

        let err = strategy
            .extract(&dir.path().join("in.pdf"), &dir.path().join("remote_parse.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Strategy { ref strategy, .. } if strategy == "remote_parse_md"));
        assert!(!dir.path().join("remote_parse.md").exists());
    }

    #[test]
    fn test_billed_pages_counts_readable_pdf() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("two.pdf");
        write_sample_pdf(&input, &["first", "second"]);
        assert_eq!(billed_pages(&input), Some(2));
    }

    #[test]
    fn test_billed_pages_unreadable_pdf_is_absent() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.pdf");
        std::fs::write(&input, b"not a pdf").unwrap();
        assert_eq!(billed_pages(&input), None);
    }
}
