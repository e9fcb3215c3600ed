use std::sync::Arc;
use std::time::Duration;

use holdwise_core::config::AppConfig;
use holdwise_core::errors::ApplicationError;
use holdwise_core::ports::{RowStore, SchemaSource, SnippetIndex, WatchlistStore};
use holdwise_core::sql::SqlValidator;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::classifier::FailureClassifier;
use crate::guardrails::GuardrailPolicy;
use crate::llm::{LlmClient, OpenAiCompatibleClient};
use crate::orchestrator::{AgentRequest, Orchestrator, OrchestratorLimits, Outcome};
use crate::prompts::{compact_schema, SystemPrompts};
use crate::retrieval::HttpSnippetIndex;
use crate::tools::{AddToWatchlistTool, QueryDatabaseTool, SearchFilingTextTool, ToolRegistry};

/// Collaborators an [`AgentRuntime`] is assembled from.
pub struct RuntimeParts {
    pub llm: Arc<dyn LlmClient>,
    pub store: Arc<dyn RowStore>,
    pub schema: Arc<dyn SchemaSource>,
    pub watchlists: Option<Arc<dyn WatchlistStore>>,
    pub snippets: Option<Arc<dyn SnippetIndex>>,
}

/// The orchestrator wired to live collaborators.
pub struct AgentRuntime {
    orchestrator: Orchestrator,
}

impl AgentRuntime {
    /// Builds the HTTP completion client and, when enabled, the retrieval
    /// client from configuration.
    pub async fn from_config(
        config: &AppConfig,
        store: Arc<dyn RowStore>,
        schema: Arc<dyn SchemaSource>,
        watchlists: Option<Arc<dyn WatchlistStore>>,
    ) -> Result<Self, ApplicationError> {
        let llm = OpenAiCompatibleClient::from_config(&config.llm)
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;
        let snippets = HttpSnippetIndex::from_config(&config.retrieval)
            .map_err(|error| ApplicationError::Integration(error.to_string()))?
            .map(|index| Arc::new(index) as Arc<dyn SnippetIndex>);

        Self::assemble(config, RuntimeParts { llm: Arc::new(llm), store, schema, watchlists, snippets })
            .await
    }

    /// Introspects the live schema once and registers every available tool.
    pub async fn assemble(config: &AppConfig, parts: RuntimeParts) -> Result<Self, ApplicationError> {
        let agent = &config.agent;
        let validator = SqlValidator::new(&agent.allowed_tables);
        let tables = parts.schema.tables().await?;
        let rendered = compact_schema(&tables, &validator);

        let mut registry = ToolRegistry::default();
        registry.register(QueryDatabaseTool::new(
            parts.store,
            validator,
            agent.max_rows,
            Duration::from_secs(agent.statement_timeout_secs),
            &tables,
        ));
        let retrieval = parts.snippets.is_some();
        if let Some(index) = parts.snippets {
            registry.register(SearchFilingTextTool::new(
                index,
                agent.retrieval_top_k as usize,
                Duration::from_secs(config.retrieval.timeout_secs),
            ));
        }
        if let Some(watchlists) = parts.watchlists {
            registry.register(AddToWatchlistTool::new(watchlists));
        }

        info!(
            event_name = "agent.runtime.assembled",
            tools = registry.len(),
            tables = tables.len(),
            max_turns = agent.max_turns,
            "agent runtime assembled"
        );

        let orchestrator = Orchestrator::new(
            parts.llm,
            registry,
            SystemPrompts::build(&rendered, agent.max_rows, retrieval),
            OrchestratorLimits {
                max_turns: agent.max_turns,
                completion_timeout: Duration::from_secs(config.llm.timeout_secs),
            },
        );
        Ok(Self { orchestrator })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.orchestrator = self.orchestrator.with_classifier(classifier);
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.orchestrator = self.orchestrator.with_guardrails(guardrails);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn answer(&self, request: &AgentRequest, cancel: &CancellationToken) -> Outcome {
        self.orchestrator.run(request, cancel).await
    }
}
