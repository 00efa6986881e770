//! Question-answering fan-out.
//!
//! For every per-document folder under the output directory, every artifact
//! in it and every configured model, one conversation is held: the system
//! prompt, the artifact content as the first user turn, then each question
//! in order. Conversations run concurrently on a bounded pool; questions
//! within a conversation are strictly sequential.

use crate::config::{AnswerConfig, ConversationMode};
use crate::error::{BenchError, Result};
use crate::llm::{ChatBackend, Message, Prompts};
use crate::questions::{QuestionSet, load_question_set};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ordered messages of one conversation.
///
/// Extending a transcript yields a new value; nothing is mutated in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// System prompt followed by the document content as the first user turn.
    pub fn base(system: &str, content: &str) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(content)],
        }
    }

    pub fn with_user(self, content: impl Into<String>) -> Self {
        self.with(Message::user(content))
    }

    pub fn with_assistant(self, content: impl Into<String>) -> Self {
        self.with(Message::assistant(content))
    }

    fn with(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// One row of the answers table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
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
}

/// A conversation that could not be completed.
#[derive(Debug, Clone)]
pub struct ConversationFailure {
    pub model: String,
    pub folder: String,
    pub file: String,
    pub error: String,
}

/// Result of a fan-out run.
#[derive(Debug, Clone, Default)]
pub struct AnswerRun {
    pub records: Vec<AnswerRecord>,
    /// Folders skipped because their question set was absent or unreadable.
    pub missing_question_sets: Vec<String>,
    pub failures: Vec<ConversationFailure>,
}

impl AnswerRun {
    pub fn print_summary(&self) {
        println!("\n========== Answering Run ==========");
        println!("Answers recorded:       {}", self.records.len());
        println!("Failed conversations:   {}", self.failures.len());
        println!("Folders without questions: {}", self.missing_question_sets.len());
        for folder in &self.missing_question_sets {
            println!("  - {}", folder);
        }
        for failure in &self.failures {
            println!(
                "FAILED {} on {}/{}: {}",
                failure.model, failure.folder, failure.file, failure.error
            );
        }
        println!("===================================\n");
    }
}

/// One (model, artifact) conversation to hold.
#[derive(Debug, Clone)]
struct Conversation {
    model: String,
    folder: String,
    file: String,
    content: String,
    questions: Arc<QuestionSet>,
}

/// Distributes question sets over artifacts and models.
pub struct AnswerFanout {
    backend: Arc<dyn ChatBackend>,
    config: AnswerConfig,
    workers: usize,
}

impl AnswerFanout {
    pub fn new(backend: Arc<dyn ChatBackend>, config: AnswerConfig, workers: usize) -> Self {
        Self {
            backend,
            config,
            workers: workers.max(1),
        }
    }

    fn system_prompt(&self) -> &str {
        self.config
            .system_prompt
            .as_deref()
            .unwrap_or(Prompts::answer_system())
    }

    /// Answer every question set against every artifact under `output_dir`.
    ///
    /// Records come back grouped by conversation, in folder, file and model
    /// order, regardless of which conversation finished first.
    pub async fn run(&self, output_dir: &Path, questions_dir: &Path) -> Result<AnswerRun> {
        let mut run = AnswerRun::default();
        let mut conversations = Vec::new();

        for folder in list_subdirs(output_dir)? {
            let folder_name = file_name(&folder);
            let questions = match load_question_set(questions_dir, &folder_name) {
                Ok(set) => Arc::new(set),
                Err(e) => {
                    warn!(folder = %folder_name, error = %e, "no usable question set, skipping folder");
                    run.missing_question_sets.push(folder_name);
                    continue;
                }
            };

            for artifact in list_files(&folder)? {
                let artifact_name = file_name(&artifact);
                let content = match fs::read_to_string(&artifact) {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(file = %artifact.display(), error = %e, "unreadable artifact, skipping");
                        continue;
                    }
                };
                for model in &self.config.models {
                    conversations.push(Conversation {
                        model: model.clone(),
                        folder: folder_name.clone(),
                        file: artifact_name.clone(),
                        content: content.clone(),
                        questions: questions.clone(),
                    });
                }
            }
        }

        info!(
            conversations = conversations.len(),
            workers = self.workers,
            mode = ?self.config.mode,
            "starting answering run"
        );

        let outcomes: Vec<_> = stream::iter(conversations)
            .map(|conversation| async move {
                let result = self.converse(&conversation).await;
                (conversation, result)
            })
            .buffered(self.workers)
            .collect()
            .await;

        for (conversation, result) in outcomes {
            match result {
                Ok(records) => run.records.extend(records),
                Err(e) => {
                    warn!(
                        model = %conversation.model,
                        folder = %conversation.folder,
                        file = %conversation.file,
                        error = %e,
                        "conversation failed, dropping its answers"
                    );
                    run.failures.push(ConversationFailure {
                        model: conversation.model,
                        folder: conversation.folder,
                        file: conversation.file,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(run)
    }

    /// Ask every question of one conversation in order.
    async fn converse(&self, conversation: &Conversation) -> Result<Vec<AnswerRecord>> {
        let base = Transcript::base(self.system_prompt(), &conversation.content);
        let mut transcript = base.clone();
        let mut records = Vec::with_capacity(conversation.questions.len());

        for item in &conversation.questions.questions {
            let request = match self.config.mode {
                ConversationMode::Cumulative => transcript.with_user(item.question.as_str()),
                ConversationMode::Independent => base.clone().with_user(item.question.as_str()),
            };
            let response = self
                .backend
                .chat(&conversation.model, request.messages(), None)
                .await?;
            debug!(model = %conversation.model, question = %item.question, answer = %response.content, "answered");

            records.push(AnswerRecord {
                model: conversation.model.clone(),
                folder: conversation.folder.clone(),
                file: conversation.file.clone(),
                question: item.question.clone(),
                answer: response.content.clone(),
                correct_answer: item.answer.clone(),
                not_mention: item.not_mention.clone(),
            });
            transcript = request.with_assistant(response.content);
        }
        Ok(records)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn list_entries(dir: &Path, want_dirs: bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| BenchError::io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BenchError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| BenchError::io(entry.path(), e))?;
        if file_type.is_dir() == want_dirs && (want_dirs || file_type.is_file()) {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}

fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    list_entries(dir, true)
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_entries(dir, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Replies "reply <n>" and keeps every request it saw.
    #[derive(Default)]
    struct Scripted {
        requests: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl ChatBackend for Scripted {
        async fn chat(
            &self,
            model: &str,
            messages: &[Message],
            _temperature: Option<f32>,
        ) -> Result<LlmResponse> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            if model == "broken" {
                return Err(BenchError::LlmApi("rate limited".to_string()));
            }
            Ok(LlmResponse {
                content: format!("reply {}", requests.len()),
                finish_reason: Some("stop".to_string()),
                usage: None,
            })
        }
    }

    /// Slow backend that records the most calls it saw in flight at once.
    #[derive(Default)]
    struct Gauged {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for Gauged {
        async fn chat(&self, _model: &str, _messages: &[Message], _temperature: Option<f32>) -> Result<LlmResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(LlmResponse {
                content: "ok".to_string(),
                finish_reason: None,
                usage: None,
            })
        }
    }

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("output");
        let questions = dir.path().join("questions");
        fs::create_dir_all(output.join("report")).unwrap();
        fs::create_dir_all(&questions).unwrap();
        fs::write(output.join("report/lopdf_pages.txt"), "Revenue was ten dollars.").unwrap();
        fs::write(
            questions.join("report_questions.json"),
            r#"{"questions": [
                {"question": "What was revenue?", "answer": "10"},
                {"question": "In which currency?", "answer": "USD", "not_mention": "EUR"}
            ]}"#,
        )
        .unwrap();
        (dir, output, questions)
    }

    fn config(models: &[&str], mode: ConversationMode) -> AnswerConfig {
        AnswerConfig {
            models: models.iter().map(|m| m.to_string()).collect(),
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_transcript_is_extended_by_value() {
        let base = Transcript::base("sys", "doc");
        let extended = base.clone().with_user("q").with_assistant("a");
        assert_eq!(base.len(), 2);
        assert_eq!(extended.len(), 4);
        assert_eq!(extended.messages()[3], Message::assistant("a"));
    }

    #[tokio::test]
    async fn test_cumulative_mode_carries_previous_reply() {
        let (_dir, output, questions) = fixture();
        let backend = Arc::new(Scripted::default());
        let fanout = AnswerFanout::new(
            backend.clone(),
            config(&["gpt-3.5-turbo"], ConversationMode::Cumulative),
            4,
        );

        let run = fanout.run(&output, &questions).await.unwrap();
        assert_eq!(run.records.len(), 2);
        assert_eq!(run.records[0].answer, "reply 1");
        assert_eq!(run.records[1].not_mention.as_deref(), Some("EUR"));
        assert_eq!(run.records[1].folder, "report");
        assert_eq!(run.records[1].file, "lopdf_pages.txt");

        let requests = backend.requests.lock().unwrap();
        let second = &requests[1];
        assert_eq!(second[0].content, Prompts::answer_system());
        assert_eq!(second[1].content, "Revenue was ten dollars.");
        assert_eq!(second[3], Message::assistant("reply 1"));
        assert_eq!(second[4], Message::user("In which currency?"));
    }

    #[tokio::test]
    async fn test_independent_mode_resets_context() {
        let (_dir, output, questions) = fixture();
        let backend = Arc::new(Scripted::default());
        let fanout = AnswerFanout::new(
            backend.clone(),
            config(&["gpt-3.5-turbo"], ConversationMode::Independent),
            1,
        );

        fanout.run(&output, &questions).await.unwrap();
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[1].len(), 3);
        assert!(requests[1].iter().all(|m| m.content != "reply 1"));
    }

    #[tokio::test]
    async fn test_missing_question_set_yields_no_answers() {
        let (_dir, output, questions) = fixture();
        fs::create_dir_all(output.join("orphan")).unwrap();
        fs::write(output.join("orphan/pdf_extract.txt"), "text").unwrap();
        fs::remove_file(questions.join("report_questions.json")).unwrap();

        let fanout = AnswerFanout::new(
            Arc::new(Scripted::default()),
            config(&["gpt-3.5-turbo"], ConversationMode::Cumulative),
            2,
        );
        let run = fanout.run(&output, &questions).await.unwrap();
        assert!(run.records.is_empty());
        let mut missing = run.missing_question_sets.clone();
        missing.sort();
        assert_eq!(missing, vec!["orphan", "report"]);
    }

    #[tokio::test]
    async fn test_failed_conversation_is_isolated_and_order_kept() {
        let (_dir, output, questions) = fixture();
        let fanout = AnswerFanout::new(
            Arc::new(Scripted::default()),
            config(&["broken", "model-a", "model-b"], ConversationMode::Cumulative),
            3,
        );

        let run = fanout.run(&output, &questions).await.unwrap();
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].model, "broken");
        let models: Vec<_> = run.records.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["model-a", "model-a", "model-b", "model-b"]);
    }

    #[tokio::test]
    async fn test_run_bounds_conversations_in_flight() {
        let (_dir, output, questions) = fixture();
        fs::write(output.join("report/pdf_extract.txt"), "Revenue: 10").unwrap();
        let backend = Arc::new(Gauged::default());
        let fanout = AnswerFanout::new(
            backend.clone(),
            config(&["m1", "m2", "m3", "m4"], ConversationMode::Cumulative),
            3,
        );

        let run = fanout.run(&output, &questions).await.unwrap();

        assert_eq!(run.records.len(), 16);
        assert!(run.failures.is_empty());
        let peak = backend.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "{peak} calls in flight with 3 workers");
        assert!(peak > 1, "conversations never overlapped");
    }
}
