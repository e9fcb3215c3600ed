//! Agent runtime: drives a completion service through tool calls until it
//! answers.
//!
//! # Architecture
//!
//! 1. **Transcript** (`transcript`) - role-tagged messages of one question
//! 2. **Completion** (`llm`, `classifier`) - OpenAI-compatible client and
//!    terminal failure classification
//! 3. **Tools** (`tools`) - SQL execution, filing-text search, watchlist
//!    mutation, gated by `guardrails`
//! 4. **Orchestration** (`orchestrator`, `runtime`) - the bounded turn loop
//!    and its wiring from configuration
//!
//! # Safety Principle
//!
//! The model only proposes. SQL it writes passes the safety validator before
//! it reaches storage, and side-effecting tools need a verified caller.

pub mod classifier;
pub mod guardrails;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod runtime;
pub mod tools;
pub mod transcript;

pub use classifier::{FailureClass, FailureClassifier, PhraseClassifier};
pub use llm::{Completion, CompletionError, CompletionRequest, LlmClient, OpenAiCompatibleClient};
pub use orchestrator::{
    AgentRequest, FailureKind, Orchestrator, OrchestratorLimits, Outcome, OutcomeError,
};
pub use runtime::{AgentRuntime, RuntimeParts};
pub use tools::{Tool, ToolDescriptor, ToolRegistry};
pub use transcript::{Message, ToolCallRequest, ToolResult, Transcript};
