use async_trait::async_trait;

use crate::error::{Result, VecDbError};
use crate::types::{Embedding, Embeddings};

/// Embedding generation abstraction to allow custom models.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    /// Embed every text, one vector per input in input order.
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings>;

    /// Embed a single text; defined as `embed_documents([text])[0]`.
    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.embed_documents(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| {
            VecDbError::Embedding("embedding function returned no vectors".into())
        })
    }

    fn dimension(&self) -> usize;
}

/// Convenience impl so that `Box<dyn EmbeddingFunction>` can be passed
/// wherever an `EmbeddingFunction` is expected.
#[async_trait]
impl EmbeddingFunction for Box<dyn EmbeddingFunction> {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings> {
        (**self).embed_documents(docs).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        (**self).embed_query(text).await
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

#[cfg(feature = "ollama")]
pub use ollama::{KeepAlive, OllamaEmbedding};

#[cfg(feature = "ollama")]
mod ollama {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use tracing::debug;

    use super::EmbeddingFunction;
    use crate::config::{DEFAULT_EMBEDDING_BASE_URL, DEFAULT_EMBEDDING_MODEL};
    use crate::error::{Result, VecDbError};
    use crate::types::Embeddings;

    /// Output size of `nomic-embed-text`, the default model.
    const DEFAULT_DIMENSION: usize = 768;

    /// How long the service keeps the model loaded after a request.
    #[derive(Clone, Debug, PartialEq, Serialize)]
    #[serde(untagged)]
    pub enum KeepAlive {
        Seconds(f64),
        /// Duration string such as `"5m"`.
        Duration(String),
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct EmbedRequest<'a> {
        pub(crate) model: &'a str,
        pub(crate) input: &'a [String],
        pub(crate) truncate: bool,
        pub(crate) options: &'a serde_json::Map<String, serde_json::Value>,
        pub(crate) keep_alive: Option<&'a KeepAlive>,
    }

    #[derive(Debug, Deserialize)]
    struct EmbedResponse {
        embeddings: Embeddings,
    }

    /// Embeddings from an Ollama-compatible `/api/embed` endpoint.
    #[derive(Clone, Debug)]
    pub struct OllamaEmbedding {
        http: reqwest::Client,
        base_url: String,
        model: String,
        truncate: bool,
        options: serde_json::Map<String, serde_json::Value>,
        keep_alive: Option<KeepAlive>,
        dimension: usize,
        timeout: Option<Duration>,
    }

    impl OllamaEmbedding {
        pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
            Self {
                http: reqwest::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                model: model.into(),
                truncate: true,
                options: serde_json::Map::new(),
                keep_alive: None,
                dimension: DEFAULT_DIMENSION,
                timeout: None,
            }
        }

        /// `nomic-embed-text` on `localhost:11434`.
        pub fn local_default() -> Self {
            Self::new(DEFAULT_EMBEDDING_BASE_URL, DEFAULT_EMBEDDING_MODEL)
        }

        pub fn with_truncate(mut self, truncate: bool) -> Self {
            self.truncate = truncate;
            self
        }

        pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
            self.options.insert(key.into(), value);
            self
        }

        pub fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
            self.keep_alive = Some(keep_alive);
            self
        }

        /// Declared output size; the service itself never reports it.
        pub fn with_dimension(mut self, dimension: usize) -> Self {
            self.dimension = dimension;
            self
        }

        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = Some(timeout);
            self
        }

        pub fn model(&self) -> &str {
            &self.model
        }

        pub(crate) fn request<'a>(&'a self, input: &'a [String]) -> Result<EmbedRequest<'a>> {
            if self.model.trim().is_empty() {
                return Err(VecDbError::Config(
                    "embedding model must be provided".into(),
                ));
            }
            Ok(EmbedRequest {
                model: &self.model,
                input,
                truncate: self.truncate,
                options: &self.options,
                keep_alive: self.keep_alive.as_ref(),
            })
        }
    }

    #[async_trait]
    impl EmbeddingFunction for OllamaEmbedding {
        async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings> {
            let body = self.request(docs)?;
            if docs.is_empty() {
                return Ok(Vec::new());
            }

            let mut req = self
                .http
                .post(format!("{}/api/embed", self.base_url))
                .json(&body);
            if let Some(timeout) = self.timeout {
                req = req.timeout(timeout);
            }
            let resp = req.send().await?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(VecDbError::Embedding(format!(
                    "embedding service returned {status}: {text}"
                )));
            }

            let parsed: EmbedResponse = resp.json().await?;
            if parsed.embeddings.len() != docs.len() {
                return Err(VecDbError::Embedding(format!(
                    "embedding service returned {} vectors for {} inputs",
                    parsed.embeddings.len(),
                    docs.len()
                )));
            }
            debug!(model = %self.model, count = docs.len(), "embedded documents");
            Ok(parsed.embeddings)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn request_carries_all_service_fields() {
            let ef = OllamaEmbedding::new("http://localhost:11434/", "nomic-embed-text")
                .with_option("num_ctx", json!(2048))
                .with_keep_alive(KeepAlive::Duration("5m".into()));
            let input = vec!["hello".to_string(), "world".to_string()];
            let body = serde_json::to_value(ef.request(&input).unwrap()).unwrap();
            assert_eq!(
                body,
                json!({
                    "model": "nomic-embed-text",
                    "input": ["hello", "world"],
                    "truncate": true,
                    "options": { "num_ctx": 2048 },
                    "keep_alive": "5m"
                })
            );
            assert_eq!(ef.base_url, "http://localhost:11434");
        }

        #[test]
        fn numeric_keep_alive_serializes_as_number() {
            let ef = OllamaEmbedding::local_default().with_keep_alive(KeepAlive::Seconds(30.0));
            let input = vec!["x".to_string()];
            let body = serde_json::to_value(ef.request(&input).unwrap()).unwrap();
            assert_eq!(body["keep_alive"], json!(30.0));
            assert_eq!(body["options"], json!({}));
        }

        #[tokio::test]
        async fn missing_model_fails_before_any_request() {
            // Port 9 (discard) would fail to connect; the config error must win.
            let ef = OllamaEmbedding::new("http://127.0.0.1:9", "");
            let err = ef.embed_documents(&["x".to_string()]).await.unwrap_err();
            assert!(matches!(err, VecDbError::Config(_)));
        }
    }
}
