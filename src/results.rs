//! Answer and score tables on disk.
//!
//! Both tables are CSV. The answers table is written once at the end of an
//! answering run under a timestamped name; the scored table repeats its
//! columns and adds the judge's verdict.

use crate::answer::AnswerRecord;
use crate::error::{BenchError, Result};
use crate::judge::Verdict;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Header of the answers table.
pub const ANSWER_HEADERS: [&str; 7] = [
    "Model",
    "Folder",
    "File",
    "Question",
    "Answer",
    "Correct Answer",
    "Not Mention",
];

/// Column the judge's verdict is written to.
pub const VERDICT_HEADER: &str = "AI Answer";

/// One row of the scored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Folder")]
    pub folder: String,
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Answer")]
    pub answer: String,
    #[serde(rename = "Correct Answer")]
    pub correct_answer: String,
    #[serde(rename = "Not Mention", default)]
    pub not_mention: Option<String>,
    #[serde(rename = "AI Answer")]
    pub verdict: String,
}

impl ScoredRecord {
    pub fn new(record: AnswerRecord, verdict: Verdict) -> Self {
        Self {
            model: record.model,
            folder: record.folder,
            file: record.file,
            question: record.question,
            answer: record.answer,
            correct_answer: record.correct_answer,
            not_mention: record.not_mention,
            verdict: verdict.as_str().to_string(),
        }
    }

    pub fn verdict(&self) -> Option<Verdict> {
        Verdict::from_cell(&self.verdict)
    }
}

/// `responses_<YYYYmmdd_HHMMSS>.csv` for the given time.
pub fn answers_file_name(at: DateTime<Local>) -> String {
    format!("responses_{}.csv", at.format("%Y%m%d_%H%M%S"))
}

/// `<stem>_scored.csv` next to an answers table.
pub fn scored_path(answers: &Path) -> PathBuf {
    let stem = answers
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "responses".to_string());
    answers.with_file_name(format!("{}_scored.csv", stem))
}

/// Write `rows` as a CSV table, retrying per `retry`.
fn write_table<T: Serialize>(path: &Path, rows: &[T], headers: &[&str], retry: &RetryPolicy) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }

    retry.run_blocking("write results table", |_| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| BenchError::persistence(path, e))?;
        writer
            .write_record(headers)
            .map_err(|e| BenchError::persistence(path, e))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| BenchError::persistence(path, e))?;
        }
        writer.flush().map_err(|e| BenchError::persistence(path, e))
    })
}

fn read_table<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Err(BenchError::persistence(path, "table does not exist"));
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| BenchError::persistence(path, e))?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| BenchError::Serialization(format!("{}: {}", path.display(), e)))
}

/// Write the answers table into `dir` under a timestamped name.
pub fn write_answers(dir: &Path, records: &[AnswerRecord], retry: &RetryPolicy) -> Result<PathBuf> {
    let path = dir.join(answers_file_name(Local::now()));
    write_table(&path, records, &ANSWER_HEADERS, retry)?;
    Ok(path)
}

pub fn read_answers(path: &Path) -> Result<Vec<AnswerRecord>> {
    read_table(path)
}

/// Write the scored table to `path`.
pub fn write_scored(path: &Path, records: &[ScoredRecord], retry: &RetryPolicy) -> Result<()> {
    let mut headers = ANSWER_HEADERS.to_vec();
    headers.push(VERDICT_HEADER);
    write_table(path, records, &headers, retry)
}

pub fn read_scored(path: &Path) -> Result<Vec<ScoredRecord>> {
    read_table(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(question: &str, not_mention: Option<&str>) -> AnswerRecord {
        AnswerRecord {
            model: "gpt-3.5-turbo".to_string(),
            folder: "report".to_string(),
            file: "lopdf_pages.txt".to_string(),
            question: question.to_string(),
            answer: "It was \"ten\", roughly".to_string(),
            correct_answer: "10".to_string(),
            not_mention: not_mention.map(str::to_string),
        }
    }

    #[test]
    fn test_answers_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(answers_file_name(at), "responses_20240309_140507.csv");
    }

    #[test]
    fn test_scored_path() {
        assert_eq!(
            scored_path(Path::new("results/responses_20240309_140507.csv")),
            PathBuf::from("results/responses_20240309_140507_scored.csv")
        );
    }

    #[test]
    fn test_answers_table() {
        let dir = TempDir::new().unwrap();
        let records = vec![record("How much?", None), record("Currency?", Some("EUR"))];

        let path = write_answers(&dir.path().join("results"), &records, &RetryPolicy::none()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next().unwrap(), ANSWER_HEADERS.join(","));

        let loaded = read_answers(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_empty_answers_table_has_header() {
        let dir = TempDir::new().unwrap();
        let path = write_answers(dir.path(), &[], &RetryPolicy::none()).unwrap();
        assert!(read_answers(&path).unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), ANSWER_HEADERS.join(","));
    }

    #[test]
    fn test_scored_table_adds_verdict_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scored.csv");
        let rows = vec![
            ScoredRecord::new(record("a", None), Verdict::Correct),
            ScoredRecord::new(record("b", None), Verdict::Failed),
        ];

        write_scored(&path, &rows, &RetryPolicy::none()).unwrap();
        let header = fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
        assert!(header.ends_with(",AI Answer"));

        let loaded = read_scored(&path).unwrap();
        assert_eq!(loaded[0].verdict(), Some(Verdict::Correct));
        assert_eq!(loaded[1].verdict, "error");
    }

    #[test]
    fn test_read_missing_table() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_answers(&dir.path().join("nope.csv")),
            Err(BenchError::Persistence { .. })
        ));
    }
}
