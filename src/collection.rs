use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::VectorBackend;
use crate::batch::{RecordBatch, create_batches};
use crate::config::DistanceMetric;
use crate::embedding::EmbeddingFunction;
use crate::error::{Result, VecDbError};
use crate::types::{CollectionInfo, Embedding, GetResult, Metadata, QueryResult};

/// Handle to one collection of one backend.
///
/// Cheap to clone; clones share the backend connection.
#[derive(Clone)]
pub struct Collection {
    backend: Arc<dyn VectorBackend>,
    info: CollectionInfo,
    embedding_function: Option<Arc<dyn EmbeddingFunction>>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("mode", &self.backend.mode())
            .field("info", &self.info)
            .field("has_embedding_function", &self.embedding_function.is_some())
            .finish()
    }
}

impl Collection {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        info: CollectionInfo,
        embedding_function: Option<Arc<dyn EmbeddingFunction>>,
    ) -> Self {
        Self {
            backend,
            info,
            embedding_function,
        }
    }

    /// Replace the embedding function used when `add`/`query_texts` need vectors.
    pub fn with_embedding_function(mut self, ef: Arc<dyn EmbeddingFunction>) -> Self {
        self.embedding_function = Some(ef);
        self
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn id(&self) -> Option<&str> {
        self.info.id.as_deref()
    }

    pub fn dimension(&self) -> Option<u32> {
        self.info.dimension
    }

    pub fn distance(&self) -> DistanceMetric {
        self.info.distance
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    // DML
    /// Store records, overwriting any with the same id.
    ///
    /// When `embeddings` is `None` they are computed from `documents` with the
    /// collection's embedding function. Missing `metadatas` default to empty
    /// maps. Large requests are split into sub-requests and submitted in order;
    /// if a later one fails, [`VecDbError::PartialWrite`] reports what was
    /// committed.
    pub async fn add(
        &self,
        documents: &[String],
        ids: &[String],
        embeddings: Option<&[Embedding]>,
        metadatas: Option<&[Metadata]>,
    ) -> Result<()> {
        validate_inputs(documents, ids, metadatas)?;

        let embeddings: Vec<Embedding> = match embeddings {
            Some(embs) => {
                validate_embeddings(embs, ids.len(), self.info.dimension)?;
                embs.to_vec()
            }
            None => {
                let ef = self.require_embedding_function("documents without embeddings")?;
                let generated = ef.embed_documents(documents).await?;
                validate_embeddings(&generated, ids.len(), self.info.dimension)?;
                generated
            }
        };

        let batch = RecordBatch {
            ids: ids.to_vec(),
            documents: documents.to_vec(),
            embeddings,
            metadatas: metadatas
                .map(<[Metadata]>::to_vec)
                .unwrap_or_else(|| vec![Metadata::new(); ids.len()]),
        };

        let batches = create_batches(batch, &self.backend.batch_limits())?;
        let total_batches = batches.len();
        let mut committed_records = 0usize;
        for (index, batch) in batches.into_iter().enumerate() {
            let records = batch.len();
            debug!(
                collection = %self.info.name,
                mode = self.backend.mode(),
                batch = index + 1,
                total_batches,
                records,
                "submitting batch"
            );
            if let Err(source) = self.backend.upsert(&self.info, batch).await {
                if index == 0 {
                    return Err(source);
                }
                warn!(
                    collection = %self.info.name,
                    committed_batches = index,
                    total_batches,
                    error = %source,
                    "batched add aborted after partial commit"
                );
                return Err(VecDbError::PartialWrite {
                    committed_batches: index,
                    committed_records,
                    total_batches,
                    source: Box::new(source),
                });
            }
            committed_records += records;
        }

        Ok(())
    }

    // DQL
    /// Every record of the collection, in backend order.
    pub async fn get(&self) -> Result<GetResult> {
        self.backend.get(&self.info).await
    }

    /// Up to `n_results` nearest records per query embedding, nearest first.
    pub async fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<QueryResult> {
        if query_embeddings.is_empty() {
            return Err(VecDbError::InvalidArgument(
                "query_embeddings cannot be empty".into(),
            ));
        }
        if n_results == 0 {
            return Err(VecDbError::InvalidArgument(
                "n_results must be positive".into(),
            ));
        }
        validate_embeddings(query_embeddings, query_embeddings.len(), self.info.dimension)?;

        self.backend
            .query(&self.info, query_embeddings, n_results)
            .await
    }

    /// Embed `texts` with the collection's embedding function, then [`query`](Self::query).
    pub async fn query_texts(&self, texts: &[String], n_results: usize) -> Result<QueryResult> {
        if texts.is_empty() {
            return Err(VecDbError::InvalidArgument(
                "texts must not be empty".into(),
            ));
        }
        if n_results == 0 {
            return Err(VecDbError::InvalidArgument(
                "n_results must be positive".into(),
            ));
        }
        let ef = self.require_embedding_function("query_texts")?;
        let embeddings = ef.embed_documents(texts).await?;
        self.query(&embeddings, n_results).await
    }

    pub async fn count(&self) -> Result<usize> {
        self.backend.count(&self.info).await
    }

    fn require_embedding_function(&self, what: &str) -> Result<&Arc<dyn EmbeddingFunction>> {
        self.embedding_function.as_ref().ok_or_else(|| {
            VecDbError::Config(format!(
                "{what} requires an embedding function; provide embeddings or set one on the client or collection"
            ))
        })
    }
}

fn validate_inputs(
    documents: &[String],
    ids: &[String],
    metadatas: Option<&[Metadata]>,
) -> Result<()> {
    if ids.is_empty() {
        return Err(VecDbError::InvalidArgument("ids must not be empty".into()));
    }
    if documents.len() != ids.len() {
        return Err(VecDbError::InvalidArgument(format!(
            "documents length {} does not match ids length {}",
            documents.len(),
            ids.len()
        )));
    }
    if let Some(metas) = metadatas {
        if metas.len() != ids.len() {
            return Err(VecDbError::InvalidArgument(format!(
                "metadatas length {} does not match ids length {}",
                metas.len(),
                ids.len()
            )));
        }
    }
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if id.is_empty() {
            return Err(VecDbError::InvalidArgument("ids must not be empty strings".into()));
        }
        if !seen.insert(id.as_str()) {
            return Err(VecDbError::InvalidArgument(format!(
                "duplicate id in request: {id}"
            )));
        }
    }
    Ok(())
}

fn validate_embeddings(
    embeddings: &[Embedding],
    expected: usize,
    dimension: Option<u32>,
) -> Result<()> {
    if embeddings.len() != expected {
        return Err(VecDbError::InvalidArgument(format!(
            "embeddings length {} does not match ids length {}",
            embeddings.len(),
            expected
        )));
    }
    // Without a known collection dimension the request must at least agree with itself.
    let dimension = dimension.map(|d| d as usize).or(embeddings.first().map(Vec::len));
    for emb in embeddings {
        if emb.is_empty() || Some(emb.len()) != dimension {
            return Err(VecDbError::InvalidArgument(format!(
                "embedding dimension {} does not match collection dimension {}",
                emb.len(),
                dimension.unwrap_or_default()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_inputs_length_mismatch() {
        let err = validate_inputs(&strings(&["a"]), &strings(&["1", "2"]), None).unwrap_err();
        assert!(matches!(err, VecDbError::InvalidArgument(_)));

        let metas = vec![Metadata::new()];
        let err = validate_inputs(&strings(&["a", "b"]), &strings(&["1", "2"]), Some(&metas))
            .unwrap_err();
        assert!(matches!(err, VecDbError::InvalidArgument(msg) if msg.contains("metadatas")));
    }

    #[test]
    fn test_validate_inputs_rejects_duplicate_ids() {
        let err = validate_inputs(&strings(&["a", "b"]), &strings(&["x", "x"]), None).unwrap_err();
        assert!(matches!(err, VecDbError::InvalidArgument(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_validate_embeddings_dimension_mismatch() {
        let embeddings = vec![vec![0.1_f32, 0.2_f32]];
        let err = validate_embeddings(&embeddings, 1, Some(3)).unwrap_err();
        assert!(matches!(err, VecDbError::InvalidArgument(_)));
    }

    #[test]
    fn test_validate_embeddings_unknown_dimension_must_be_consistent() {
        let ok = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert!(validate_embeddings(&ok, 2, None).is_ok());
        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(validate_embeddings(&ragged, 2, None).is_err());
    }
}
