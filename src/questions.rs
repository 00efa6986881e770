//! Ground-truth question sets.
//!
//! One JSON file per document stem, `<stem>_questions.json`:
//!
//! ```json
//! {"questions": [{"question": "...", "answer": "...", "not_mention": "..."}]}
//! ```

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A question with its expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    pub answer: String,
    /// Content the answer must not contain to be graded correct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_mention: Option<String>,
}

/// The questions for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<QuestionRecord>,
}

impl QuestionSet {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Location of the question set for `stem`.
pub fn question_set_path(questions_dir: &Path, stem: &str) -> PathBuf {
    questions_dir.join(format!("{}_questions.json", stem))
}

/// Load the question set for `stem`.
///
/// Returns [`BenchError::QuestionSetNotFound`] when the file is absent so the
/// caller can skip the folder.
pub fn load_question_set(questions_dir: &Path, stem: &str) -> Result<QuestionSet> {
    let path = question_set_path(questions_dir, stem);
    if !path.is_file() {
        return Err(BenchError::QuestionSetNotFound(path));
    }
    let content = fs::read_to_string(&path).map_err(|e| BenchError::io(&path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| BenchError::Serialization(format!("{}: {}", path.display(), e)))
}
