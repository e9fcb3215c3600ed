use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use holdwise_core::ports::{ContentType, IndexError, SearchFilters, SnippetIndex};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{object_schema, Tool, ToolContext, ToolDescriptor, ToolOutput};

pub const NAME: &str = "search_filing_text";
pub const MAX_TOP_K: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchArguments {
    #[serde(default)]
    query: String,
    #[serde(default)]
    top_k: Option<i64>,
    #[serde(default)]
    filter_accession: Option<String>,
    #[serde(default)]
    filter_content_type: Option<String>,
}

/// Semantic search over filing text through an external index.
pub struct SearchFilingTextTool {
    index: Arc<dyn SnippetIndex>,
    default_top_k: usize,
    timeout: Duration,
}

impl SearchFilingTextTool {
    pub fn new(index: Arc<dyn SnippetIndex>, default_top_k: usize, timeout: Duration) -> Self {
        Self { index, default_top_k: default_top_k.clamp(1, MAX_TOP_K), timeout }
    }

    fn top_k(&self, requested: Option<i64>) -> usize {
        match requested {
            Some(value) => value.clamp(1, MAX_TOP_K as i64) as usize,
            None => self.default_top_k,
        }
    }
}

fn empty_results(query: &str) -> Value {
    json!({ "query": query, "results_count": 0, "results": [] })
}

fn round3(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

#[async_trait]
impl Tool for SearchFilingTextTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn descriptor(&self) -> ToolDescriptor {
        let content_types: Vec<&str> = ContentType::ALL.iter().map(|kind| kind.as_str()).collect();
        ToolDescriptor {
            name: NAME,
            description: "Search Form 13F filing text with semantic search.\n\n\
                 Form 13F filings are regulatory documents; they rarely contain investment strategy \
                 or market commentary. Best for manager contact details, amendment notices, \
                 explanatory notes and other regulatory disclosures."
                .to_string(),
            parameters: object_schema(
                json!({
                    "query": {
                        "type": "string",
                        "description": "Natural language description of the text to find"
                    },
                    "top_k": {
                        "type": "integer",
                        "description": format!("Number of results to return (1-{MAX_TOP_K}, default: {})", self.default_top_k),
                        "minimum": 1,
                        "maximum": MAX_TOP_K,
                        "default": self.default_top_k
                    },
                    "filter_accession": {
                        "type": "string",
                        "description": "Optional: restrict results to one filing accession number"
                    },
                    "filter_content_type": {
                        "type": "string",
                        "description": format!("Optional: restrict results to one section ({})", content_types.join(", ")),
                        "enum": content_types
                    }
                }),
                &["query"],
            ),
        }
    }

    async fn execute(&self, context: &ToolContext<'_>, arguments: Value) -> ToolOutput {
        let arguments: SearchArguments = match serde_json::from_value(arguments) {
            Ok(arguments) => arguments,
            Err(error) => {
                return ToolOutput::failure(format!("Invalid arguments: {error}"), empty_results(""))
            }
        };

        let query = arguments.query.trim();
        if query.is_empty() {
            return ToolOutput::failure("Query cannot be empty", empty_results(query));
        }

        let content_type = match arguments.filter_content_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match ContentType::parse(raw) {
                Some(kind) => Some(kind),
                None => {
                    let expected: Vec<&str> = ContentType::ALL.iter().map(|kind| kind.as_str()).collect();
                    return ToolOutput::failure(
                        format!(
                            "Invalid filter_content_type '{raw}'. Expected one of: {}",
                            expected.join(", ")
                        ),
                        empty_results(query),
                    );
                }
            },
        };
        let filters = SearchFilters {
            accession: arguments
                .filter_accession
                .map(|accession| accession.trim().to_string())
                .filter(|accession| !accession.is_empty()),
            content_type,
        };
        let top_k = self.top_k(arguments.top_k);

        let searched = tokio::time::timeout(self.timeout, self.index.search(query, top_k, &filters))
            .await
            .unwrap_or(Err(IndexError::Timeout));

        match searched {
            Ok(snippets) => {
                info!(
                    event_name = "tool.search.completed",
                    correlation_id = %context.correlation_id,
                    top_k,
                    results_count = snippets.len(),
                    "filing text search completed"
                );
                let results: Vec<Value> = snippets
                    .iter()
                    .take(top_k)
                    .map(|snippet| {
                        json!({
                            "text": snippet.text,
                            "accession_number": snippet.source_id,
                            "content_type": snippet.section_tag,
                            "relevance_score": round3(snippet.score),
                        })
                    })
                    .collect();

                let mut payload = json!({
                    "success": true,
                    "query": query,
                    "results_count": results.len(),
                    "results": results,
                });
                if !filters.is_empty() {
                    payload["filters_applied"] = json!(filters);
                }
                ToolOutput::success(payload)
            }
            Err(error) => {
                warn!(
                    event_name = "tool.search.failed",
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "filing text search failed"
                );
                ToolOutput::failure(format!("Search Error: {error}"), empty_results(query))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use holdwise_core::ports::{ContentType, IndexError, SearchFilters, Snippet, SnippetIndex};
    use serde_json::json;

    use super::SearchFilingTextTool;
    use crate::tools::{Tool, ToolContext};

    #[derive(Default)]
    struct FakeIndex {
        calls: Mutex<Vec<(String, usize, SearchFilters)>>,
        stall: bool,
    }

    #[async_trait]
    impl SnippetIndex for FakeIndex {
        async fn search(
            &self,
            query: &str,
            top_k: usize,
            filters: &SearchFilters,
        ) -> Result<Vec<Snippet>, IndexError> {
            self.calls.lock().expect("lock").push((query.to_string(), top_k, filters.clone()));
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(vec![Snippet {
                text: "Report for the calendar year or quarter ended 12-31-2024".into(),
                source_id: "0000950123-25-002701".into(),
                section_tag: "cover_page_info".into(),
                score: 0.876_54,
            }])
        }
    }

    fn context() -> ToolContext<'static> {
        ToolContext { identity: None, correlation_id: "req-test" }
    }

    #[tokio::test]
    async fn results_are_reshaped_and_top_k_clamped() {
        let index = Arc::new(FakeIndex::default());
        let tool = SearchFilingTextTool::new(index.clone(), 5, Duration::from_secs(1));

        let output = tool
            .execute(
                &context(),
                json!({ "query": " contact address ", "top_k": 50, "filter_content_type": "cover_page_info" }),
            )
            .await;

        assert!(output.success);
        assert_eq!(output.payload["results_count"], 1);
        assert_eq!(output.payload["results"][0]["accession_number"], "0000950123-25-002701");
        assert_eq!(output.payload["results"][0]["relevance_score"], 0.877);
        assert_eq!(output.payload["filters_applied"]["content_type"], "cover_page_info");

        let calls = index.calls.lock().expect("lock");
        assert_eq!(calls[0].0, "contact address");
        assert_eq!(calls[0].1, 10);
        assert_eq!(calls[0].2.content_type, Some(ContentType::CoverPageInfo));
    }

    #[tokio::test]
    async fn zero_top_k_becomes_one_and_default_applies() {
        let index = Arc::new(FakeIndex::default());
        let tool = SearchFilingTextTool::new(index.clone(), 5, Duration::from_secs(1));

        tool.execute(&context(), json!({ "query": "amendment", "top_k": 0 })).await;
        tool.execute(&context(), json!({ "query": "amendment" })).await;

        let calls = index.calls.lock().expect("lock");
        assert_eq!(calls[0].1, 1);
        assert_eq!(calls[1].1, 5);
    }

    #[tokio::test]
    async fn empty_query_never_calls_the_index() {
        let index = Arc::new(FakeIndex::default());
        let tool = SearchFilingTextTool::new(index.clone(), 5, Duration::from_secs(1));

        let output = tool.execute(&context(), json!({ "query": "   " })).await;
        assert!(!output.success);
        assert_eq!(output.error.as_deref(), Some("Query cannot be empty"));
        assert!(index.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn unknown_content_type_is_rejected() {
        let tool = SearchFilingTextTool::new(Arc::new(FakeIndex::default()), 5, Duration::from_secs(1));
        let output =
            tool.execute(&context(), json!({ "query": "notes", "filter_content_type": "strategy" })).await;
        assert!(output.error.as_deref().unwrap_or_default().contains("Expected one of"));
    }

    #[tokio::test]
    async fn stalled_index_times_out() {
        let index = Arc::new(FakeIndex { stall: true, ..FakeIndex::default() });
        let tool = SearchFilingTextTool::new(index, 5, Duration::from_millis(20));

        let output = tool.execute(&context(), json!({ "query": "notes" })).await;
        assert_eq!(output.error.as_deref(), Some("Search Error: search timed out"));
    }
}
