use std::collections::HashMap;

use async_trait::async_trait;
use holdwise_core::domain::identity::VerifiedIdentity;
use holdwise_core::ports::Row;
use serde::Serialize;
use serde_json::{json, Value};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};

pub mod query;
pub mod search;
pub mod watchlist;

pub use query::QueryDatabaseTool;
pub use search::SearchFilingTextTool;
pub use watchlist::AddToWatchlistTool;

/// Capability description handed to the completion service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

pub struct ToolContext<'a> {
    pub identity: Option<&'a VerifiedIdentity>,
    pub correlation_id: &'a str,
}

/// Side data a tool hands back to the orchestrator alongside its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolArtifact {
    /// A sanitized statement reached the store; `rows` is set when it succeeded.
    Query { sql: String, rows: Option<Vec<Row>> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub payload: Value,
    pub error: Option<String>,
    pub artifact: Option<ToolArtifact>,
}

impl ToolOutput {
    pub fn success(payload: Value) -> Self {
        Self { success: true, payload, error: None, artifact: None }
    }

    /// `payload` is extended with `success: false` and the error text.
    pub fn failure(error: impl Into<String>, payload: Value) -> Self {
        let error = error.into();
        let mut payload = match payload {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        payload.insert("success".to_string(), Value::Bool(false));
        payload.insert("error".to_string(), Value::String(error.clone()));
        Self { success: false, payload: Value::Object(payload), error: Some(error), artifact: None }
    }

    pub fn with_artifact(mut self, artifact: ToolArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn descriptor(&self) -> ToolDescriptor;

    /// Side-effecting tools are only offered to verified callers.
    fn requires_identity(&self) -> bool {
        false
    }

    /// Failures are reported in the output, never raised.
    async fn execute(&self, context: &ToolContext<'_>, arguments: Value) -> ToolOutput;
}

pub enum Resolution<'a> {
    Available(&'a dyn Tool),
    Unavailable { tool: &'static str, message: String },
    Unknown,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Box::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors of the tools `policy` allows for this caller, in
    /// registration order.
    pub fn descriptors(
        &self,
        policy: &GuardrailPolicy,
        identity: Option<&VerifiedIdentity>,
    ) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .filter(|tool| policy.evaluate(tool.as_ref(), identity) == GuardrailDecision::Allow)
            .map(|tool| tool.descriptor())
            .collect()
    }

    pub fn resolve(
        &self,
        name: &str,
        policy: &GuardrailPolicy,
        identity: Option<&VerifiedIdentity>,
    ) -> Resolution<'_> {
        let Some(tool) = self.tools.get(name) else {
            return Resolution::Unknown;
        };

        match policy.evaluate(tool.as_ref(), identity) {
            GuardrailDecision::Allow => Resolution::Available(tool.as_ref()),
            GuardrailDecision::Deny { user_message, .. } => {
                Resolution::Unavailable { tool: tool.name(), message: user_message }
            }
        }
    }
}

/// Shared JSON Schema helper: an object with the given properties.
pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
