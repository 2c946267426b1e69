#![allow(dead_code)]

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use vecdb::{
    Client, ClientConfig, EmbeddingFunction, Embeddings, LocalConfig, QdrantConfig, VecDbError,
};

/// Fresh in-memory local client; reset is allowed.
pub async fn local_client() -> anyhow::Result<Client> {
    let config = LocalConfig::in_memory().allow_reset(true);
    Ok(Client::from_config(ClientConfig::Local(config)).await?)
}

/// Load QdrantConfig from environment when `VECDB_QDRANT_INTEGRATION=1` is set.
/// Returns None and prints a SKIP message otherwise.
pub fn load_qdrant_config_for_integration() -> Option<QdrantConfig> {
    if std::env::var("VECDB_QDRANT_INTEGRATION").ok().as_deref() != Some("1") {
        eprintln!("SKIP: set VECDB_QDRANT_INTEGRATION=1 and VECDB_QDRANT_* env vars to run");
        return None;
    }
    QdrantConfig::from_env().ok()
}

/// Millisecond timestamp string used to make collection names unique.
pub fn ts_suffix() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    ts.to_string()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Embedding function that must never be reached.
pub struct DummyEmbedding;

#[async_trait::async_trait]
impl EmbeddingFunction for DummyEmbedding {
    async fn embed_documents(&self, _docs: &[String]) -> Result<Embeddings, VecDbError> {
        Err(VecDbError::Embedding(
            "DummyEmbedding should not be called".into(),
        ))
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Simple embedding function that returns a constant vector of the given dimension.
pub struct ConstantEmbedding {
    pub value: f32,
    pub dim: usize,
}

#[async_trait::async_trait]
impl EmbeddingFunction for ConstantEmbedding {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings, VecDbError> {
        let mut out = Vec::with_capacity(docs.len());
        for _ in docs {
            out.push(vec![self.value; self.dim]);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Looks texts up in a fixed table; unknown texts are an embedding error.
pub struct FixedEmbedding {
    table: HashMap<String, Vec<f32>>,
    dim: usize,
}

impl FixedEmbedding {
    pub fn new(entries: &[(&str, [f32; 3])]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.to_vec()))
                .collect(),
            dim: 3,
        }
    }

    /// `apple`/`apricot` point along x, `banana` along y.
    pub fn fruit() -> Self {
        Self::new(&[
            ("apple", [1.0, 0.0, 0.0]),
            ("apricot", [0.9, 0.1, 0.0]),
            ("banana", [0.0, 1.0, 0.0]),
            ("red fruit", [0.95, 0.05, 0.0]),
        ])
    }
}

#[async_trait::async_trait]
impl EmbeddingFunction for FixedEmbedding {
    async fn embed_documents(&self, docs: &[String]) -> Result<Embeddings, VecDbError> {
        docs.iter()
            .map(|doc| {
                self.table
                    .get(doc)
                    .cloned()
                    .ok_or_else(|| VecDbError::Embedding(format!("no vector for {doc:?}")))
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
