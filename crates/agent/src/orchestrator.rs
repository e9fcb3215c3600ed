//! The conversation loop: ask the model, run the tools it asks for, repeat
//! until it answers or a bound is hit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use holdwise_core::domain::conversation::{HistoryEntry, Question};
use holdwise_core::domain::identity::VerifiedIdentity;
use holdwise_core::ports::Row;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{FailureClass, FailureClassifier, PhraseClassifier};
use crate::guardrails::GuardrailPolicy;
use crate::llm::{Completion, CompletionError, CompletionRequest, LlmClient};
use crate::prompts::SystemPrompts;
use crate::tools::{watchlist, Resolution, ToolArtifact, ToolContext, ToolRegistry};
use crate::transcript::{ToolCallRequest, ToolResult, Transcript};

pub const QUOTA_MESSAGE: &str = "This question is too large for the assistant to handle right now. \
     Please rephrase it or ask something simpler.";
pub const TURN_BOUND_MESSAGE: &str = "I wasn't able to complete your request within the allowed \
     number of steps. Please try a more specific question.";
pub const CANCELLED_MESSAGE: &str = "The request was cancelled before an answer was produced.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorLimits {
    pub max_turns: u32,
    pub completion_timeout: Duration,
}

impl Default for OrchestratorLimits {
    fn default() -> Self {
        Self { max_turns: 10, completion_timeout: Duration::from_secs(60) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentRequest {
    pub question: Question,
    pub history: Vec<HistoryEntry>,
    pub identity: Option<VerifiedIdentity>,
    pub include_sql: bool,
    pub include_rows: bool,
    pub correlation_id: String,
}

impl AgentRequest {
    pub fn new(question: Question, correlation_id: impl Into<String>) -> Self {
        Self {
            question,
            history: Vec::new(),
            identity: None,
            include_sql: false,
            include_rows: false,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_identity(mut self, identity: Option<VerifiedIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn include_sql(mut self, include: bool) -> Self {
        self.include_sql = include;
        self
    }

    pub fn include_rows(mut self, include: bool) -> Self {
        self.include_rows = include;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ModelQuotaOrSize,
    ModelOther,
    TurnBoundExceeded,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelQuotaOrSize => "model_quota_or_size",
            Self::ModelOther => "model_other",
            Self::TurnBoundExceeded => "turn_bound_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: FailureKind,
    pub message: String,
}

/// Everything the caller learns about one orchestrated question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_sql_queries: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Vec<Row>>,
    pub execution_time_ms: u64,
    pub tool_calls: u32,
    pub turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl Outcome {
    /// `Kind: message` form used for analytics grouping.
    pub fn error_label(&self) -> Option<String> {
        self.error.as_ref().map(|error| format!("{}: {}", error.kind.as_str(), error.message))
    }
}

#[derive(Debug, Default)]
struct RunState {
    turns: u32,
    tool_calls: u32,
    sql_queries: Vec<String>,
    raw_rows: Option<Vec<Row>>,
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    classifier: Arc<dyn FailureClassifier>,
    registry: ToolRegistry,
    guardrails: GuardrailPolicy,
    prompts: SystemPrompts,
    limits: OrchestratorLimits,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        prompts: SystemPrompts,
        limits: OrchestratorLimits,
    ) -> Self {
        Self {
            llm,
            classifier: Arc::new(PhraseClassifier::default()),
            registry,
            guardrails: GuardrailPolicy::default(),
            prompts,
            limits,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn limits(&self) -> OrchestratorLimits {
        self.limits
    }

    pub async fn run(&self, request: &AgentRequest, cancel: &CancellationToken) -> Outcome {
        self.run_with_transcript(request, cancel).await.0
    }

    /// Same as [`Orchestrator::run`], also handing back the final transcript.
    pub async fn run_with_transcript(
        &self,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> (Outcome, Transcript) {
        let started = Instant::now();
        let correlation_id = request.correlation_id.as_str();
        let identity = request.identity.as_ref();

        let tools = self.registry.descriptors(&self.guardrails, identity);
        let watchlist_offered = tools.iter().any(|tool| tool.name == watchlist::NAME);
        let mut transcript = Transcript::seeded(
            self.prompts.select(watchlist_offered),
            &request.history,
            &request.question,
        );
        let context = ToolContext { identity, correlation_id };
        let mut state = RunState::default();

        info!(
            event_name = "agent.run.start",
            correlation_id = %correlation_id,
            question = %request.question.preview(),
            tools = tools.len(),
            history = request.history.len(),
            "orchestration started"
        );

        loop {
            if state.turns >= self.limits.max_turns {
                let outcome = self.fail(
                    request,
                    state,
                    started,
                    FailureKind::TurnBoundExceeded,
                    TURN_BOUND_MESSAGE.to_string(),
                    format!("Maximum conversation turns ({}) reached", self.limits.max_turns),
                );
                return (outcome, transcript);
            }
            if cancel.is_cancelled() {
                let outcome = self.fail(
                    request,
                    state,
                    started,
                    FailureKind::Cancelled,
                    CANCELLED_MESSAGE.to_string(),
                    "caller aborted the request".to_string(),
                );
                return (outcome, transcript);
            }

            state.turns += 1;
            debug!(
                event_name = "agent.turn.start",
                correlation_id = %correlation_id,
                turn = state.turns,
                "requesting completion"
            );

            let completion = tokio::time::timeout(
                self.limits.completion_timeout,
                self.llm.complete(CompletionRequest { messages: transcript.messages(), tools: &tools }),
            )
            .await
            .unwrap_or(Err(CompletionError::Timeout));

            let (content, calls) = match completion {
                Ok(Completion::Answer(answer)) => {
                    transcript.push_answer(answer.clone());
                    return (self.succeed(request, state, started, answer), transcript);
                }
                Ok(Completion::ToolCalls { content, calls }) if calls.is_empty() => {
                    let answer = content.unwrap_or_default();
                    transcript.push_answer(answer.clone());
                    return (self.succeed(request, state, started, answer), transcript);
                }
                Ok(Completion::ToolCalls { content, calls }) => {
                    (content, distinct_call_ids(calls, state.turns))
                }
                Err(error) => {
                    return (self.model_failure(request, state, started, &error), transcript);
                }
            };

            transcript.push_tool_calls(content, calls.clone());
            for call in &calls {
                let result = if cancel.is_cancelled() {
                    ToolResult::rejected(call, "Request cancelled before this tool ran")
                } else {
                    self.dispatch(call, &context, &mut state).await
                };
                transcript.push_tool_result(result);
            }
        }
    }

    async fn dispatch(
        &self,
        call: &ToolCallRequest,
        context: &ToolContext<'_>,
        state: &mut RunState,
    ) -> ToolResult {
        state.tool_calls += 1;

        let tool = match self.registry.resolve(&call.tool_name, &self.guardrails, context.identity) {
            Resolution::Available(tool) => tool,
            Resolution::Unavailable { tool, message } => {
                info!(
                    event_name = "agent.tool.unavailable",
                    correlation_id = %context.correlation_id,
                    tool,
                    "tool withheld by guardrails"
                );
                return ToolResult::rejected(call, message);
            }
            Resolution::Unknown => {
                warn!(
                    event_name = "agent.tool.unknown",
                    correlation_id = %context.correlation_id,
                    tool = %call.tool_name,
                    "model requested an unregistered tool"
                );
                return ToolResult::rejected(call, format!("Unknown tool: {}", call.tool_name));
            }
        };

        debug!(
            event_name = "agent.tool.dispatch",
            correlation_id = %context.correlation_id,
            tool = tool.name(),
            call_id = %call.id,
            "dispatching tool call"
        );
        let output = tool.execute(context, call.arguments.clone()).await;

        if let Some(ToolArtifact::Query { sql, rows }) = output.artifact {
            state.sql_queries.push(sql);
            if rows.is_some() {
                state.raw_rows = rows;
            }
        }

        ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            success: output.success,
            payload: output.payload,
            error: output.error,
        }
    }

    fn model_failure(
        &self,
        request: &AgentRequest,
        state: RunState,
        started: Instant,
        error: &CompletionError,
    ) -> Outcome {
        match self.classifier.classify(error) {
            FailureClass::QuotaOrSize => self.fail(
                request,
                state,
                started,
                FailureKind::ModelQuotaOrSize,
                QUOTA_MESSAGE.to_string(),
                error.to_string(),
            ),
            FailureClass::Other => self.fail(
                request,
                state,
                started,
                FailureKind::ModelOther,
                format!("I encountered an error while processing your question: {error}"),
                error.to_string(),
            ),
        }
    }

    fn succeed(&self, request: &AgentRequest, state: RunState, started: Instant, answer: String) -> Outcome {
        info!(
            event_name = "agent.run.completed",
            correlation_id = %request.correlation_id,
            turns = state.turns,
            tool_calls = state.tool_calls,
            "orchestration answered"
        );
        outcome(request, state, started, answer, None)
    }

    fn fail(
        &self,
        request: &AgentRequest,
        state: RunState,
        started: Instant,
        kind: FailureKind,
        answer: String,
        message: String,
    ) -> Outcome {
        warn!(
            event_name = "agent.run.failed",
            correlation_id = %request.correlation_id,
            kind = kind.as_str(),
            turns = state.turns,
            error = %message,
            "orchestration terminated without an answer"
        );
        outcome(request, state, started, answer, Some(OutcomeError { kind, message }))
    }
}

fn outcome(
    request: &AgentRequest,
    state: RunState,
    started: Instant,
    answer: String,
    error: Option<OutcomeError>,
) -> Outcome {
    let include_sql = request.include_sql && !state.sql_queries.is_empty();
    Outcome {
        success: error.is_none(),
        answer,
        sql_query: include_sql.then(|| state.sql_queries.last().cloned()).flatten(),
        all_sql_queries: include_sql.then_some(state.sql_queries),
        raw_data: if request.include_rows { state.raw_rows } else { None },
        execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        tool_calls: state.tool_calls,
        turns: state.turns,
        error,
    }
}

/// Every call in one assistant message needs its own id so each tool result
/// answers exactly one request. Empty or repeated ids are replaced with
/// `call_{turn}_{index}`.
fn distinct_call_ids(calls: Vec<ToolCallRequest>, turn: u32) -> Vec<ToolCallRequest> {
    let mut seen = HashSet::new();

    calls
        .into_iter()
        .enumerate()
        .map(|(index, mut call)| {
            if call.id.trim().is_empty() || seen.contains(&call.id) {
                let mut candidate = format!("call_{turn}_{index}");
                while seen.contains(&candidate) {
                    candidate.push('_');
                }
                call.id = candidate;
            }
            seen.insert(call.id.clone());
            call
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use holdwise_core::domain::conversation::Question;
    use holdwise_core::domain::identity::VerifiedIdentity;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use super::{AgentRequest, FailureKind, Orchestrator, OrchestratorLimits, TURN_BOUND_MESSAGE};
    use crate::llm::{Completion, CompletionError, CompletionRequest, LlmClient};
    use crate::prompts::SystemPrompts;
    use crate::tools::{Tool, ToolContext, ToolDescriptor, ToolOutput, ToolRegistry};
    use crate::transcript::{Message, ToolCallRequest};

    /// Replays scripted completions; repeats the last one when exhausted.
    struct Scripted {
        script: Mutex<VecDeque<Result<Completion, CompletionError>>>,
        seen: Mutex<Vec<(Vec<Message>, Vec<&'static str>)>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(script: Vec<Result<Completion, CompletionError>>) -> Self {
            Self { script: Mutex::new(script.into()), seen: Mutex::new(Vec::new()), delay: None }
        }

        fn calls(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, CompletionError> {
            self.seen.lock().expect("lock").push((
                request.messages.to_vec(),
                request.tools.iter().map(|tool| tool.name).collect(),
            ));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut script = self.script.lock().expect("lock");
            if script.len() > 1 {
                script.pop_front().unwrap_or(Err(CompletionError::Timeout))
            } else {
                script.front().cloned().unwrap_or(Err(CompletionError::Timeout))
            }
        }
    }

    struct Echo {
        name: &'static str,
        mutation: bool,
        invocations: Arc<Mutex<u32>>,
        cancel_on_call: Option<CancellationToken>,
    }

    impl Echo {
        fn new(name: &'static str) -> Self {
            Self { name, mutation: false, invocations: Arc::default(), cancel_on_call: None }
        }
    }

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &'static str {
            self.name
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor { name: self.name, description: String::new(), parameters: json!({}) }
        }

        fn requires_identity(&self) -> bool {
            self.mutation
        }

        async fn execute(&self, _context: &ToolContext<'_>, arguments: Value) -> ToolOutput {
            *self.invocations.lock().expect("lock") += 1;
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            ToolOutput::success(json!({ "success": true, "echo": arguments }))
        }
    }

    fn call(id: &str, tool: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, tool, json!({ "id": id }))
    }

    fn tool_calls(calls: Vec<ToolCallRequest>) -> Result<Completion, CompletionError> {
        Ok(Completion::ToolCalls { content: None, calls })
    }

    fn request(text: &str) -> AgentRequest {
        let question = Question::parse(text).unwrap_or_else(|error| panic!("question: {error}"));
        AgentRequest::new(question, "req-test")
    }

    fn orchestrator(llm: Arc<Scripted>, registry: ToolRegistry, max_turns: u32) -> Orchestrator {
        Orchestrator::new(
            llm,
            registry,
            SystemPrompts::build("managers(cik TEXT PK)\n", 1000, false),
            OrchestratorLimits { max_turns, completion_timeout: Duration::from_secs(5) },
        )
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(Echo::new("query_database"));
        registry
    }

    #[tokio::test]
    async fn never_answering_model_stops_at_exactly_max_turns() {
        for max_turns in [1, 3, 10] {
            let llm = Arc::new(Scripted::new(vec![tool_calls(vec![call("c", "query_database")])]));
            let outcome = orchestrator(llm.clone(), echo_registry(), max_turns)
                .run(&request("loop forever please"), &CancellationToken::new())
                .await;

            assert!(!outcome.success);
            assert_eq!(outcome.answer, TURN_BOUND_MESSAGE);
            assert_eq!(outcome.error.as_ref().map(|e| e.kind), Some(FailureKind::TurnBoundExceeded));
            assert_eq!(outcome.turns, max_turns);
            assert_eq!(llm.calls(), max_turns as usize);
        }
    }

    #[tokio::test]
    async fn calls_are_dispatched_in_order_and_correlated() {
        let llm = Arc::new(Scripted::new(vec![
            tool_calls(vec![call("a", "query_database"), call("b", "nope"), call("c", "query_database")]),
            Ok(Completion::Answer("done".into())),
        ]));
        let orchestrator = orchestrator(llm.clone(), echo_registry(), 10);

        let (outcome, transcript) =
            orchestrator.run_with_transcript(&request("three calls"), &CancellationToken::new()).await;

        assert!(outcome.success);
        assert_eq!(outcome.tool_calls, 3);
        assert_eq!(outcome.turns, 2);
        assert!(transcript.is_correlated());

        let seen = llm.seen.lock().expect("lock");
        let second_turn = &seen[1].0;
        let tool_ids: Vec<_> = second_turn
            .iter()
            .filter_map(|message| match message {
                Message::Tool { tool_call_id, content, .. } => Some((tool_call_id.as_str(), content.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(tool_ids.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(tool_ids[1].1.contains("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn repeated_and_empty_call_ids_are_made_distinct() {
        let llm = Arc::new(Scripted::new(vec![
            tool_calls(vec![
                call("a", "query_database"),
                call("a", "query_database"),
                call("", "query_database"),
                call("call_1_1", "query_database"),
            ]),
            Ok(Completion::Answer("done".into())),
        ]));
        let orchestrator = orchestrator(llm.clone(), echo_registry(), 10);

        let (outcome, transcript) =
            orchestrator.run_with_transcript(&request("duplicate ids"), &CancellationToken::new()).await;

        assert!(outcome.success);
        assert_eq!(outcome.tool_calls, 4);
        assert!(transcript.is_correlated());

        let seen = llm.seen.lock().expect("lock");
        let tool_ids: Vec<_> = seen[1]
            .0
            .iter()
            .filter_map(|message| match message {
                Message::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_ids, vec!["a", "call_1_1", "call_1_2", "call_1_3"]);
    }

    #[tokio::test]
    async fn mutation_tool_is_hidden_and_unavailable_without_identity() {
        let invocations = Arc::new(Mutex::new(0));
        let mut registry = echo_registry();
        registry.register(Echo {
            name: "add_to_watchlist",
            mutation: true,
            invocations: invocations.clone(),
            cancel_on_call: None,
        });
        let llm = Arc::new(Scripted::new(vec![
            tool_calls(vec![call("w", "add_to_watchlist")]),
            Ok(Completion::Answer("sign in first".into())),
        ]));

        let outcome = orchestrator(llm.clone(), registry, 10)
            .run(&request("track apple"), &CancellationToken::new())
            .await;

        assert!(outcome.success);
        assert_eq!(*invocations.lock().expect("lock"), 0);
        let seen = llm.seen.lock().expect("lock");
        assert_eq!(seen[0].1, vec!["query_database"]);
        match &seen[0].0[0] {
            Message::System { content } => assert!(!content.contains("add_to_watchlist")),
            other => panic!("expected system prompt first, got {other:?}"),
        }
        assert!(matches!(&seen[1].0[3], Message::Tool { content, .. } if content.contains("not signed in")));
    }

    #[tokio::test]
    async fn verified_identity_unlocks_mutation_tool() {
        let invocations = Arc::new(Mutex::new(0));
        let mut registry = echo_registry();
        registry.register(Echo {
            name: "add_to_watchlist",
            mutation: true,
            invocations: invocations.clone(),
            cancel_on_call: None,
        });
        let llm = Arc::new(Scripted::new(vec![
            tool_calls(vec![call("w", "add_to_watchlist")]),
            Ok(Completion::Answer("added".into())),
        ]));

        let request = request("track apple").with_identity(Some(VerifiedIdentity::new("analyst-1")));
        let outcome = orchestrator(llm.clone(), registry, 10).run(&request, &CancellationToken::new()).await;

        assert!(outcome.success);
        assert_eq!(*invocations.lock().expect("lock"), 1);
        assert_eq!(llm.seen.lock().expect("lock")[0].1, vec!["query_database", "add_to_watchlist"]);
    }

    #[tokio::test]
    async fn other_model_failures_embed_the_cause() {
        let llm = Arc::new(Scripted::new(vec![Err(CompletionError::Provider {
            status: 500,
            message: "upstream exploded".into(),
        })]));
        let outcome =
            orchestrator(llm, echo_registry(), 10).run(&request("anything"), &CancellationToken::new()).await;

        assert!(!outcome.success);
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.error.as_ref().map(|e| e.kind), Some(FailureKind::ModelOther));
        assert!(outcome.answer.starts_with("I encountered an error while processing your question:"));
        assert!(outcome.answer.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn stalled_completion_times_out() {
        let llm = Arc::new(Scripted {
            delay: Some(Duration::from_secs(30)),
            ..Scripted::new(vec![Ok(Completion::Answer("late".into()))])
        });
        let orchestrator = Orchestrator::new(
            llm,
            echo_registry(),
            SystemPrompts::build("", 1000, false),
            OrchestratorLimits { max_turns: 10, completion_timeout: Duration::from_millis(20) },
        );

        let outcome = orchestrator.run(&request("slow model"), &CancellationToken::new()).await;
        assert_eq!(outcome.error.as_ref().map(|e| e.kind), Some(FailureKind::ModelOther));
        assert!(outcome.answer.contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_is_honoured_at_the_next_checkpoint() {
        let token = CancellationToken::new();
        let invocations = Arc::new(Mutex::new(0));
        let mut registry = ToolRegistry::default();
        registry.register(Echo {
            name: "query_database",
            mutation: false,
            invocations: invocations.clone(),
            cancel_on_call: Some(token.clone()),
        });
        let llm = Arc::new(Scripted::new(vec![
            tool_calls(vec![call("a", "query_database"), call("b", "query_database")]),
            Ok(Completion::Answer("never reached".into())),
        ]));

        let (outcome, transcript) =
            orchestrator(llm.clone(), registry, 10).run_with_transcript(&request("cancel me"), &token).await;

        assert_eq!(outcome.error.as_ref().map(|e| e.kind), Some(FailureKind::Cancelled));
        assert_eq!(outcome.turns, 1);
        assert_eq!(llm.calls(), 1);
        assert_eq!(*invocations.lock().expect("lock"), 1, "second call skipped after cancel");
        assert!(transcript.is_correlated());
    }

    #[tokio::test]
    async fn cancelled_before_start_issues_no_completion() {
        let token = CancellationToken::new();
        token.cancel();
        let llm = Arc::new(Scripted::new(vec![Ok(Completion::Answer("x".into()))]));

        let outcome = orchestrator(llm.clone(), echo_registry(), 10).run(&request("abc"), &token).await;
        assert_eq!(outcome.turns, 0);
        assert_eq!(llm.calls(), 0);
        assert_eq!(outcome.error.map(|e| e.kind), Some(FailureKind::Cancelled));
    }

    #[tokio::test]
    async fn empty_tool_call_list_is_treated_as_an_answer() {
        let llm = Arc::new(Scripted::new(vec![Ok(Completion::ToolCalls {
            content: Some("nothing to run".into()),
            calls: Vec::new(),
        })]));
        let outcome =
            orchestrator(llm, echo_registry(), 10).run(&request("hello there"), &CancellationToken::new()).await;
        assert!(outcome.success);
        assert_eq!(outcome.answer, "nothing to run");
        assert_eq!(outcome.turns, 1);
    }
}
