use std::sync::Arc;

use crate::client::Client;
use crate::collection::Collection;
use crate::config::{ClientConfig, CollectionConfig, DistanceMetric};
use crate::embedding::EmbeddingFunction;
use crate::error::{Result, VecDbError};
use crate::types::{Embedding, Embeddings, GetResult, Metadata, QueryResult};

fn new_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| VecDbError::Other(anyhow::Error::new(e)))
}

/// Shared inner state for synchronous wrappers.
///
/// Holds a Tokio runtime and the underlying async [`Client`].
struct Inner {
    rt: Arc<tokio::runtime::Runtime>,
    client: Client,
}

/// Blocking/synchronous wrapper around [`Client`].
///
/// This type is only available when the `sync` feature is enabled. It runs all
/// operations on an internal Tokio runtime using `block_on`.
///
/// Note: do not call these blocking APIs from within an existing Tokio runtime;
/// `block_on` panics there. In async contexts, use [`Client`] directly.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("client", &self.inner.client)
            .finish()
    }
}

impl SyncClient {
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let rt = new_runtime()?;
        let client = rt.block_on(Client::from_config(config))?;
        Ok(Self::from_parts(rt, client))
    }

    pub fn from_env() -> Result<Self> {
        let rt = new_runtime()?;
        let client = rt.block_on(Client::from_env())?;
        Ok(Self::from_parts(rt, client))
    }

    fn from_parts(rt: tokio::runtime::Runtime, client: Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                rt: Arc::new(rt),
                client,
            }),
        }
    }

    /// Default embedding function for collections opened after this call.
    pub fn with_embedding_function(self, ef: Arc<dyn EmbeddingFunction>) -> Self {
        let inner = Inner {
            rt: Arc::clone(&self.inner.rt),
            client: self.inner.client.clone().with_embedding_function(ef),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn mode(&self) -> &'static str {
        self.inner.client.mode()
    }

    pub fn heartbeat(&self) -> Result<()> {
        self.inner.rt.block_on(self.inner.client.heartbeat())
    }

    // Collection management

    pub fn create_collection(
        &self,
        name: &str,
        config: Option<CollectionConfig>,
    ) -> Result<SyncCollection> {
        let collection = self
            .inner
            .rt
            .block_on(self.inner.client.create_collection(name, config))?;
        Ok(self.wrap(collection))
    }

    pub fn get_collection(&self, name: &str) -> Result<SyncCollection> {
        let collection = self
            .inner
            .rt
            .block_on(self.inner.client.get_collection(name))?;
        Ok(self.wrap(collection))
    }

    pub fn get_or_create_collection(
        &self,
        name: &str,
        config: Option<CollectionConfig>,
    ) -> Result<SyncCollection> {
        let collection = self
            .inner
            .rt
            .block_on(self.inner.client.get_or_create_collection(name, config))?;
        Ok(self.wrap(collection))
    }

    pub fn list_collections(&self) -> Result<Vec<SyncCollection>> {
        let collections = self
            .inner
            .rt
            .block_on(self.inner.client.list_collections())?;
        Ok(collections.into_iter().map(|c| self.wrap(c)).collect())
    }

    pub fn has_collection(&self, name: &str) -> Result<bool> {
        self.inner
            .rt
            .block_on(self.inner.client.has_collection(name))
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner
            .rt
            .block_on(self.inner.client.delete_collection(name))
    }

    pub fn reset(&self) -> Result<()> {
        self.inner.rt.block_on(self.inner.client.reset())
    }

    pub fn count_collection(&self) -> Result<usize> {
        self.inner.rt.block_on(self.inner.client.count_collection())
    }

    fn wrap(&self, collection: Collection) -> SyncCollection {
        SyncCollection {
            inner: Arc::clone(&self.inner),
            collection,
        }
    }
}

/// Blocking/synchronous wrapper around [`Collection`].
#[derive(Clone)]
pub struct SyncCollection {
    inner: Arc<Inner>,
    collection: Collection,
}

impl std::fmt::Debug for SyncCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCollection")
            .field("collection", &self.collection)
            .finish()
    }
}

impl SyncCollection {
    pub fn name(&self) -> &str {
        self.collection.name()
    }

    pub fn id(&self) -> Option<&str> {
        self.collection.id()
    }

    pub fn dimension(&self) -> Option<u32> {
        self.collection.dimension()
    }

    pub fn distance(&self) -> DistanceMetric {
        self.collection.distance()
    }

    /// The async handle, for callers mixing both styles.
    pub fn as_async(&self) -> &Collection {
        &self.collection
    }

    pub fn add(
        &self,
        documents: &[String],
        ids: &[String],
        embeddings: Option<&[Embedding]>,
        metadatas: Option<&[Metadata]>,
    ) -> Result<()> {
        self.inner
            .rt
            .block_on(self.collection.add(documents, ids, embeddings, metadatas))
    }

    pub fn get(&self) -> Result<GetResult> {
        self.inner.rt.block_on(self.collection.get())
    }

    pub fn query(&self, query_embeddings: &[Embedding], n_results: usize) -> Result<QueryResult> {
        self.inner
            .rt
            .block_on(self.collection.query(query_embeddings, n_results))
    }

    pub fn query_texts(&self, texts: &[String], n_results: usize) -> Result<QueryResult> {
        self.inner
            .rt
            .block_on(self.collection.query_texts(texts, n_results))
    }

    pub fn count(&self) -> Result<usize> {
        self.inner.rt.block_on(self.collection.count())
    }
}

/// Blocking front for any [`EmbeddingFunction`].
///
/// Runs the same futures as the async calls, so results are identical.
pub struct SyncEmbedding {
    rt: tokio::runtime::Runtime,
    inner: Arc<dyn EmbeddingFunction>,
}

impl SyncEmbedding {
    pub fn new(inner: Arc<dyn EmbeddingFunction>) -> Result<Self> {
        Ok(Self {
            rt: new_runtime()?,
            inner,
        })
    }

    pub fn embed_documents(&self, docs: &[String]) -> Result<Embeddings> {
        self.rt.block_on(self.inner.embed_documents(docs))
    }

    pub fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.rt.block_on(self.inner.embed_query(text))
    }

    pub fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
