//! LLM-as-judge grading of answers against ground truth.

use crate::answer::AnswerRecord;
use crate::error::{BenchError, Result};
use crate::llm::{ChatBackend, Message, Prompts};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Judge decision for one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Correct,
    Incorrect,
    /// The judge call itself failed.
    Failed,
}

impl Verdict {
    /// Cell value in the scored table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Correct => "1",
            Verdict::Incorrect => "0",
            Verdict::Failed => "error",
        }
    }

    pub fn from_cell(cell: &str) -> Option<Self> {
        match cell.trim() {
            "1" => Some(Verdict::Correct),
            "0" => Some(Verdict::Incorrect),
            "error" => Some(Verdict::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpret the judge's reply. Anything but a bare `1` is incorrect.
pub fn parse_verdict(reply: &str) -> Verdict {
    let cleaned = reply.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`'));
    match cleaned {
        "1" => Verdict::Correct,
        "0" => Verdict::Incorrect,
        other => {
            debug!(reply = %other, "ambiguous judge reply, treating as incorrect");
            Verdict::Incorrect
        }
    }
}

/// Accuracy over graded rows, ignoring failed calls.
pub fn accuracy(verdicts: &[Verdict]) -> Option<f64> {
    let graded = verdicts.iter().filter(|v| **v != Verdict::Failed).count();
    if graded == 0 {
        return None;
    }
    let correct = verdicts.iter().filter(|v| **v == Verdict::Correct).count();
    Some(correct as f64 / graded as f64)
}

/// Grades answers with a fixed rubric at temperature 0.
pub struct ScoringClient {
    backend: Arc<dyn ChatBackend>,
    model: String,
}

impl ScoringClient {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Grade one answer.
    pub async fn score(
        &self,
        answer: &str,
        correct_answer: &str,
        not_mention: Option<&str>,
    ) -> Result<Verdict> {
        let messages = [
            Message::system(Prompts::grading_rubric()),
            Message::user(Prompts::grading_request(answer, correct_answer, not_mention)),
        ];
        let response = self.backend.chat(&self.model, &messages, Some(0.0)).await?;
        Ok(parse_verdict(&response.content))
    }

    /// Grade the same answer `samples` times and return the majority verdict.
    ///
    /// Ties go to [`Verdict::Incorrect`]. Fails only when every call fails.
    pub async fn score_majority(
        &self,
        answer: &str,
        correct_answer: &str,
        not_mention: Option<&str>,
        samples: usize,
    ) -> Result<Verdict> {
        let (mut correct, mut incorrect) = (0usize, 0usize);
        let mut last_error = None;

        for _ in 0..samples.max(1) {
            match self.score(answer, correct_answer, not_mention).await {
                Ok(Verdict::Correct) => correct += 1,
                Ok(_) => incorrect += 1,
                Err(e) => last_error = Some(e),
            }
        }

        match (correct + incorrect, last_error) {
            (0, Some(e)) => Err(e),
            (0, None) => Err(BenchError::LlmApi("judge returned no verdicts".to_string())),
            _ if correct > incorrect => Ok(Verdict::Correct),
            _ => Ok(Verdict::Incorrect),
        }
    }

    /// Grade every row with at most `workers` calls in flight.
    ///
    /// The result has one verdict per row, at the row's index. A failed call
    /// marks only its own row as [`Verdict::Failed`].
    pub async fn score_table(&self, rows: &[AnswerRecord], workers: usize, samples: usize) -> Vec<Verdict> {
        let mut verdicts = vec![Verdict::Failed; rows.len()];

        let mut results = stream::iter(rows.iter().enumerate())
            .map(|(index, row)| async move {
                let verdict = self
                    .score_majority(&row.answer, &row.correct_answer, row.not_mention.as_deref(), samples)
                    .await;
                (index, verdict)
            })
            .buffer_unordered(workers.max(1));

        while let Some((index, result)) = results.next().await {
            verdicts[index] = match result {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(row = index, error = %e, "judge call failed");
                    Verdict::Failed
                }
            };
        }
        verdicts
    }
}
