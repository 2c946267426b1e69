use async_trait::async_trait;

use crate::batch::{BatchLimits, RecordBatch};
use crate::config::CollectionConfig;
use crate::error::{Result, VecDbError};
use crate::types::{CollectionInfo, Embedding, GetResult, QueryResult};

/// Capability set every vector-store driver provides.
///
/// Drivers only translate: input validation, embedding and batching happen
/// once in [`crate::Collection`] and [`crate::Client`], so every backend sees
/// well-formed requests and behaves the same from the caller's side.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create a collection; `AlreadyExists` if the name is taken.
    async fn create_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo>;

    /// Look up a collection; `NotFound` if absent.
    async fn get_collection(&self, name: &str) -> Result<CollectionInfo>;

    /// Return the existing collection, or create it with `config`.
    async fn get_or_create_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo> {
        match self.get_collection(name).await {
            Ok(info) => Ok(info),
            Err(VecDbError::NotFound(_)) => match self.create_collection(name, config).await {
                // Lost a creation race; the winner's collection is what we want.
                Err(VecDbError::AlreadyExists(_)) => self.get_collection(name).await,
                other => other,
            },
            Err(e) => Err(e),
        }
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Drop a collection; `NotFound` if absent.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Destroy every collection in this backend's namespace.
    async fn reset(&self) -> Result<()>;

    /// Liveness check against the backend.
    async fn heartbeat(&self) -> Result<()>;

    /// Write one sub-request. Existing ids are overwritten.
    async fn upsert(&self, collection: &CollectionInfo, batch: RecordBatch) -> Result<()>;

    /// Every record of the collection.
    async fn get(&self, collection: &CollectionInfo) -> Result<GetResult>;

    /// Ranked nearest neighbours for each query embedding.
    async fn query(
        &self,
        collection: &CollectionInfo,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<QueryResult>;

    /// Number of records; drivers with a native count should override this.
    async fn count(&self, collection: &CollectionInfo) -> Result<usize> {
        Ok(self.get(collection).await?.len())
    }

    /// Payload limits `upsert` must stay within.
    fn batch_limits(&self) -> BatchLimits;

    /// Short mode string (e.g. "local", "remote", "qdrant") for logging.
    fn mode(&self) -> &'static str;
}

/// Minimal row abstraction used by the SQL-backed driver.
///
/// Keeps sqlx types out of the row-to-record normalization code.
pub trait BackendRow {
    /// Get a string value from a column (ids, documents, JSON).
    fn get_string(&self, column: &str) -> Result<Option<String>>;

    /// Get a 64-bit integer value from a column (dimensions, counts).
    fn get_i64(&self, column: &str) -> Result<Option<i64>>;
}

#[cfg(feature = "local")]
impl BackendRow for sqlx::sqlite::SqliteRow {
    fn get_string(&self, column: &str) -> Result<Option<String>> {
        use sqlx::Row;
        let v = self.try_get::<Option<String>, _>(column);
        v.map_err(Into::into)
    }

    fn get_i64(&self, column: &str) -> Result<Option<i64>> {
        use sqlx::Row;
        let v = self.try_get::<Option<i64>, _>(column);
        v.map_err(Into::into)
    }
}
