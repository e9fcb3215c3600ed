use std::time::Duration;

use async_trait::async_trait;
use holdwise_core::config::RetrievalConfig;
use holdwise_core::ports::{IndexError, SearchFilters, Snippet, SnippetIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Client for the external embedding + vector search service.
pub struct HttpSnippetIndex {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    filters: &'a SearchFilters,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RemoteSnippet>,
}

#[derive(Deserialize)]
struct RemoteSnippet {
    text: String,
    #[serde(default)]
    accession_number: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    score: f64,
}

impl From<RemoteSnippet> for Snippet {
    fn from(remote: RemoteSnippet) -> Self {
        Self {
            text: remote.text,
            source_id: remote.accession_number,
            section_tag: remote.content_type,
            score: remote.score,
        }
    }
}

impl HttpSnippetIndex {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .map_err(|error| IndexError::Service(error.to_string()))?;
        Ok(Self { http, endpoint: endpoint.into() })
    }

    /// `None` when retrieval is disabled.
    pub fn from_config(config: &RetrievalConfig) -> Result<Option<Self>, IndexError> {
        match (config.enabled, &config.endpoint) {
            (true, Some(endpoint)) => {
                Self::new(endpoint.clone(), Duration::from_secs(config.timeout_secs)).map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl SnippetIndex for HttpSnippetIndex {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<Snippet>, IndexError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&SearchRequest { query, top_k, filters })
            .send()
            .await
            .map_err(index_error)?
            .error_for_status()
            .map_err(index_error)?;

        let decoded: SearchResponse = response.json().await.map_err(index_error)?;
        debug!(
            event_name = "retrieval.search.received",
            results_count = decoded.results.len(),
            "snippet search returned"
        );
        Ok(decoded.results.into_iter().map(Snippet::from).collect())
    }
}

fn index_error(error: reqwest::Error) -> IndexError {
    if error.is_timeout() {
        IndexError::Timeout
    } else {
        IndexError::Service(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use holdwise_core::config::RetrievalConfig;
    use holdwise_core::ports::{ContentType, SearchFilters, Snippet};
    use serde_json::json;

    use super::{HttpSnippetIndex, SearchRequest, SearchResponse};

    #[test]
    fn request_omits_empty_filters() {
        let filters = SearchFilters::default();
        let encoded = serde_json::to_value(SearchRequest { query: "q", top_k: 3, filters: &filters })
            .unwrap_or_default();
        assert_eq!(encoded, json!({ "query": "q", "top_k": 3, "filters": {} }));

        let filters = SearchFilters { accession: None, content_type: Some(ContentType::AmendmentInfo) };
        let encoded = serde_json::to_value(SearchRequest { query: "q", top_k: 3, filters: &filters })
            .unwrap_or_default();
        assert_eq!(encoded["filters"], json!({ "content_type": "amendment_info" }));
    }

    #[test]
    fn response_maps_to_snippets() {
        let response: SearchResponse = serde_json::from_value(json!({
            "results": [{ "text": "t", "accession_number": "a-1", "content_type": "explanatory_notes", "score": 0.5 }]
        }))
        .expect("response");
        let snippets: Vec<Snippet> = response.results.into_iter().map(Snippet::from).collect();
        assert_eq!(snippets[0].source_id, "a-1");
        assert_eq!(snippets[0].section_tag, "explanatory_notes");
    }

    #[test]
    fn disabled_retrieval_builds_no_index() {
        let config = RetrievalConfig {
            enabled: false,
            endpoint: Some("http://localhost:9000/search".into()),
            timeout_secs: 10,
        };
        assert!(HttpSnippetIndex::from_config(&config).expect("config").is_none());

        let enabled = RetrievalConfig { enabled: true, ..config };
        assert!(HttpSnippetIndex::from_config(&enabled).expect("config").is_some());
    }
}
