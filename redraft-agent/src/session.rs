//! Session implementation - drives the generate/review loop
//!
//! One `Session` owns one run at a time: the transcript, the iteration
//! budget, the patch engine, and the cancel token. There is no
//! process-wide registry; callers construct a session per run.

use crate::prompts;
use redraft_engine::patch::{PatchEngine, PatchReport};
use redraft_engine::provider::{
    ChatMessage, CompletionRequest, LlmProvider, ReasoningEffort, UsageTracker,
};
use redraft_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Transcript
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

/// One exchanged message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
}

/// The ordered message history of one run.
///
/// Append-only while the run executes; cleared at the start of the next
/// run on the same session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            role: TranscriptRole::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            role: TranscriptRole::Assistant,
            content: content.into(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Render as JSON for persistence
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Caller-settable stop signal, checked between rounds.
///
/// Cancelling never interrupts an in-flight service call; the run ends
/// cleanly before the next round starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Configuration for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of generate rounds; every round except the last is followed
    /// by one review call
    pub max_iterations: usize,
    /// Model identifier, provider default when None
    pub model: Option<String>,
    /// Max output token budget per call
    pub max_output_tokens: Option<usize>,
    /// Reasoning effort hint forwarded to the provider
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Print progress while running
    pub verbose: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            model: None,
            max_output_tokens: None,
            reasoning_effort: None,
            verbose: true,
        }
    }
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Generate rounds that completed
    pub rounds_completed: usize,
    /// True when the cancel token ended the run before the budget
    pub stopped_early: bool,
    pub transcript: Transcript,
    /// One report per non-empty generation, in round order
    pub reports: Vec<PatchReport>,
    /// The last generated text
    pub final_text: String,
}

/// Drives the generate/review conversation loop against one provider,
/// applying each non-empty generation through the patch engine.
pub struct Session<P: LlmProvider> {
    provider: P,
    engine: PatchEngine,
    config: SessionConfig,
    transcript: Transcript,
    cancel: CancelToken,
    usage: UsageTracker,
}

impl<P: LlmProvider> Session<P> {
    pub fn new(provider: P, engine: PatchEngine, config: SessionConfig) -> Self {
        Self {
            provider,
            engine,
            config,
            transcript: Transcript::new(),
            cancel: CancelToken::new(),
            usage: UsageTracker::new(),
        }
    }

    /// Get a handle on this session's stop signal
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Token usage accumulated across all calls so far
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Run up to `max_iterations` rounds for the given task.
    ///
    /// Round 0 uses the task verbatim as the generate system instruction;
    /// later rounds use the fixed improve instruction with the previous
    /// output and review feedback folded into the user message. A failed
    /// service call aborts the whole run; there is no retry and no
    /// per-round isolation.
    pub async fn run(&mut self, task: &str) -> Result<RunOutcome> {
        if self.config.max_iterations == 0 {
            return Err(Error::invalid_argument("max_iterations must be positive")
                .with_operation("session::run"));
        }

        self.transcript.clear();
        let budget = self.config.max_iterations;
        let mut reports = Vec::new();
        let mut previous = String::new();
        let mut feedback = String::new();
        let mut rounds_completed = 0;
        let mut stopped_early = false;

        for round in 0..budget {
            if self.cancel.is_cancelled() {
                if self.config.verbose {
                    println!("Stop requested, ending after {} rounds", rounds_completed);
                }
                stopped_early = true;
                break;
            }

            if self.config.verbose {
                println!("Round {}/{}: generating...", round + 1, budget);
            }

            let (system, user) = if round == 0 {
                (task.to_string(), prompts::kickoff_user())
            } else {
                (
                    prompts::IMPROVE_SYSTEM.to_string(),
                    prompts::revision_user(&previous, &feedback),
                )
            };

            let generated = self.exchange(&system, user).await?;
            if self.config.verbose {
                println!("   Response: {} chars", generated.len());
            }

            if !generated.trim().is_empty() {
                let report = self.engine.apply_source(&generated).map_err(|e| {
                    e.with_operation("session::run")
                        .with_context("round", round.to_string())
                })?;

                if self.config.verbose {
                    println!(
                        "   Applied {} blocks ({} skipped)",
                        report.applied.len(),
                        report.skipped.len()
                    );
                    for skip in &report.skipped {
                        println!("      skipped: {}", skip.reason);
                    }
                }
                reports.push(report);
            }

            rounds_completed = round + 1;
            previous = generated;

            if round + 1 < budget {
                if self.config.verbose {
                    println!("Round {}/{}: reviewing...", round + 1, budget);
                }
                let review_system = prompts::review_system(&previous);
                feedback = self
                    .exchange(&review_system, prompts::REVIEW_USER.to_string())
                    .await?;
                if self.config.verbose {
                    println!("   Review: {} chars", feedback.len());
                }
            }
        }

        Ok(RunOutcome {
            rounds_completed,
            stopped_early,
            transcript: self.transcript.clone(),
            reports,
            final_text: previous,
        })
    }

    /// One service call: append the outgoing user message, send
    /// `[system] + transcript`, append the assistant reply.
    async fn exchange(&mut self, system: &str, user: String) -> Result<String> {
        self.transcript.push_user(user);

        let mut messages = Vec::with_capacity(self.transcript.len() + 1);
        messages.push(ChatMessage::system(system));
        for entry in self.transcript.entries() {
            messages.push(match entry.role {
                TranscriptRole::User => ChatMessage::user(entry.content.as_str()),
                TranscriptRole::Assistant => ChatMessage::assistant(entry.content.as_str()),
            });
        }

        let mut request = CompletionRequest::new(messages);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.clone());
        }
        if let Some(max) = self.config.max_output_tokens {
            request = request.with_max_tokens(max);
        }
        if let Some(effort) = self.config.reasoning_effort {
            request = request.with_reasoning_effort(effort);
        }

        let response = self.provider.complete(request).await.map_err(|e| {
            Error::completion_failed(e.to_string())
                .with_operation("session::exchange")
                .with_context("provider", self.provider.name().to_string())
        })?;

        self.usage.track(&response.model, &response.usage);

        let content = response.content.ok_or_else(|| {
            Error::completion_failed("empty assistant content")
                .with_operation("session::exchange")
                .with_context("provider", self.provider.name().to_string())
        })?;

        self.transcript.push_assistant(content.clone());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redraft_engine::patch::{PatchBlock, PatchOperation};
    use redraft_engine::provider::{
        CompletionResponse, FinishReason, ProviderError, Usage,
    };
    use redraft_error::ErrorKind;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type ScriptStep = std::result::Result<String, ProviderError>;

    /// Provider that replays a fixed script of responses and records
    /// every request it sees.
    struct ScriptedProvider {
        script: Mutex<VecDeque<ScriptStep>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ScriptStep>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> CompletionRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn models(&self) -> Vec<String> {
            vec!["scripted-1".into()]
        }

        fn default_model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            next.map(|content| CompletionResponse {
                id: "resp".into(),
                model: "scripted-1".into(),
                content: Some(content),
                finish_reason: FinishReason::Stop,
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    fn session_with(
        script: Vec<ScriptStep>,
        iterations: usize,
    ) -> (TempDir, Session<ScriptedProvider>) {
        let dir = TempDir::new().unwrap();
        let config = SessionConfig {
            max_iterations: iterations,
            verbose: false,
            ..Default::default()
        };
        let session = Session::new(
            ScriptedProvider::new(script),
            PatchEngine::new(dir.path()),
            config,
        );
        (dir, session)
    }

    fn gen_block(file: &str, content: &str) -> String {
        PatchBlock::new(file, "b1", 1, PatchOperation::Append, content).render()
    }

    #[tokio::test]
    async fn test_single_iteration_is_one_generate_no_review() {
        let (dir, mut session) =
            session_with(vec![Ok(gen_block("out.txt", "hello"))], 1);

        let outcome = session.run("write hello").await.unwrap();

        assert_eq!(session.provider.call_count(), 1);
        assert_eq!(outcome.rounds_completed, 1);
        assert!(!outcome.stopped_early);
        // one call appends exactly two transcript entries
        assert_eq!(outcome.transcript.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_three_iterations_alternate_generate_and_review() {
        let (_dir, mut session) = session_with(
            vec![
                Ok(gen_block("a.txt", "v1")),
                Ok("review one".into()),
                Ok(gen_block("a.txt", "v2")),
                Ok("review two".into()),
                Ok(gen_block("a.txt", "v3")),
            ],
            3,
        );

        let outcome = session.run("the task").await.unwrap();

        // generate, review, generate, review, generate - no trailing review
        assert_eq!(session.provider.call_count(), 5);
        assert_eq!(outcome.rounds_completed, 3);
        assert_eq!(outcome.transcript.len(), 10);
        assert_eq!(outcome.reports.len(), 3);

        // round 0 sends the task verbatim as the system instruction
        let first = session.provider.request(0);
        assert_eq!(first.messages[0].content, "the task");

        // the review call embeds the just-generated text in its system prompt
        let review = session.provider.request(1);
        assert!(review.messages[0].content.contains(&gen_block("a.txt", "v1")));

        // the next generate folds previous output and feedback into the user message
        let second_gen = session.provider.request(2);
        assert_eq!(second_gen.messages[0].content, prompts::IMPROVE_SYSTEM);
        let outgoing = &second_gen.messages.last().unwrap().content;
        assert!(outgoing.contains(&gen_block("a.txt", "v1")));
        assert!(outgoing.contains("review one"));
    }

    #[tokio::test]
    async fn test_two_iterations_append_four_entries_for_nonfinal_round() {
        let (_dir, mut session) = session_with(
            vec![
                Ok(gen_block("a.txt", "v1")),
                Ok("feedback".into()),
                Ok(gen_block("a.txt", "v2")),
            ],
            2,
        );

        let outcome = session.run("task").await.unwrap();

        // non-final round: four entries; final round: two
        assert_eq!(outcome.transcript.len(), 6);
        let roles: Vec<TranscriptRole> = outcome
            .transcript
            .entries()
            .iter()
            .map(|e| e.role)
            .collect();
        assert_eq!(
            roles,
            vec![
                TranscriptRole::User,
                TranscriptRole::Assistant,
                TranscriptRole::User,
                TranscriptRole::Assistant,
                TranscriptRole::User,
                TranscriptRole::Assistant,
            ]
        );
    }

    #[tokio::test]
    async fn test_first_round_failure_aborts_without_writes() {
        let (dir, mut session) = session_with(
            vec![Err(ProviderError::Network("connection refused".into()))],
            3,
        );

        let err = session.run("task").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CompletionFailed);
        assert_eq!(session.provider.call_count(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_review_failure_aborts_run() {
        let (_dir, mut session) = session_with(
            vec![
                Ok(gen_block("a.txt", "v1")),
                Err(ProviderError::Api {
                    status: 500,
                    message: "boom".into(),
                }),
            ],
            2,
        );

        let err = session.run("task").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CompletionFailed);
        assert_eq!(session.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_run_stops_immediately() {
        let (_dir, mut session) = session_with(vec![Ok("unused".into())], 3);
        session.cancel_token().cancel();

        let outcome = session.run("task").await.unwrap();

        assert!(outcome.stopped_early);
        assert_eq!(outcome.rounds_completed, 0);
        assert_eq!(session.provider.call_count(), 0);
        assert!(outcome.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_generation_without_blocks_yields_empty_report() {
        let (dir, mut session) =
            session_with(vec![Ok("no blocks, just prose".into())], 1);

        let outcome = session.run("task").await.unwrap();

        assert_eq!(outcome.reports.len(), 1);
        assert!(outcome.reports[0].applied.is_empty());
        assert!(outcome.reports[0].skipped.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_usage_accumulates_across_calls() {
        let (_dir, mut session) = session_with(
            vec![
                Ok(gen_block("a.txt", "v1")),
                Ok("review".into()),
                Ok(gen_block("a.txt", "v2")),
            ],
            2,
        );

        session.run("task").await.unwrap();

        assert_eq!(session.usage().total_calls, 3);
        assert_eq!(session.usage().total_tokens(), 45);
    }

    #[tokio::test]
    async fn test_transcript_cleared_between_runs() {
        let (_dir, mut session) = session_with(
            vec![Ok(gen_block("a.txt", "v1")), Ok(gen_block("a.txt", "v2"))],
            1,
        );

        let first = session.run("task one").await.unwrap();
        assert_eq!(first.transcript.len(), 2);

        let second = session.run("task two").await.unwrap();
        assert_eq!(second.transcript.len(), 2);
        assert!(second.transcript.entries()[0].content.contains("patch blocks"));
    }

    #[test]
    fn test_transcript_json_round_trips() {
        let mut transcript = Transcript::new();
        transcript.push_user("ask");
        transcript.push_assistant("answer");

        let json = transcript.to_json();
        let parsed: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.entries()[0].role, TranscriptRole::User);
        assert_eq!(parsed.entries()[1].content, "answer");
    }

    #[tokio::test]
    async fn test_zero_iterations_rejected() {
        let (_dir, mut session) = session_with(vec![], 0);
        let err = session.run("task").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
