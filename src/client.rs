use std::sync::Arc;

use tracing::info;

use crate::backend::VectorBackend;
use crate::collection::Collection;
use crate::config::{ClientConfig, CollectionConfig};
use crate::embedding::EmbeddingFunction;
use crate::error::{Result, VecDbError};
use crate::meta::CollectionNames;
use crate::types::CollectionInfo;

/// Registry of collections on one backend.
///
/// A client owns its backend connection; clones share it.
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn VectorBackend>,
    embedding_function: Option<Arc<dyn EmbeddingFunction>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("mode", &self.backend.mode())
            .field("has_embedding_function", &self.embedding_function.is_some())
            .finish()
    }
}

impl Client {
    /// Wrap an already-constructed driver.
    pub fn new(backend: Arc<dyn VectorBackend>) -> Self {
        Self {
            backend,
            embedding_function: None,
        }
    }

    /// Connect to the backend selected by `config`.
    ///
    /// For Qdrant the embedding service named in the config becomes the
    /// client's default embedding function.
    pub async fn from_config(config: ClientConfig) -> Result<Self> {
        let client: Self = match config {
            #[cfg(feature = "local")]
            ClientConfig::Local(cfg) => {
                Self::new(Arc::new(crate::local::LocalBackend::connect(cfg).await?))
            }
            #[cfg(feature = "remote")]
            ClientConfig::Remote(cfg) => {
                Self::new(Arc::new(crate::remote::HttpBackend::connect(cfg).await?))
            }
            #[cfg(feature = "qdrant")]
            ClientConfig::Qdrant(cfg) => {
                let backend = crate::qdrant::QdrantBackend::connect(&cfg)?;
                let client = Self::new(Arc::new(backend));
                #[cfg(feature = "ollama")]
                let client = client.with_embedding_function(Arc::new(
                    crate::embedding::OllamaEmbedding::new(
                        cfg.embedding_service_base_url.clone(),
                        cfg.embedding_model.clone(),
                    ),
                ));
                client
            }
            #[allow(unreachable_patterns)]
            other => {
                return Err(VecDbError::Config(format!(
                    "backend not compiled in: {other:?}"
                )));
            }
        };
        info!(mode = client.mode(), "vector store client ready");
        Ok(client)
    }

    pub async fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env()?;
        Self::from_config(config).await
    }

    /// Default embedding function handed to every collection from this client.
    pub fn with_embedding_function(mut self, ef: Arc<dyn EmbeddingFunction>) -> Self {
        self.embedding_function = Some(ef);
        self
    }

    pub fn mode(&self) -> &'static str {
        self.backend.mode()
    }

    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    pub async fn heartbeat(&self) -> Result<()> {
        self.backend.heartbeat().await
    }

    /// Create a collection; `None` uses [`CollectionConfig::default`] (768, cosine).
    pub async fn create_collection(
        &self,
        name: &str,
        config: Option<CollectionConfig>,
    ) -> Result<Collection> {
        CollectionNames::validate(name)?;
        let cfg = config.unwrap_or_default();
        validate_config(&cfg)?;
        let info = self.backend.create_collection(name, &cfg).await?;
        Ok(self.wrap(info))
    }

    pub async fn get_collection(&self, name: &str) -> Result<Collection> {
        CollectionNames::validate(name)?;
        let info = self.backend.get_collection(name).await?;
        Ok(self.wrap(info))
    }

    /// Convenience: get if exists, else create.
    ///
    /// An explicit `config` must match an existing collection's known
    /// dimension and metric; `None` accepts whatever exists.
    pub async fn get_or_create_collection(
        &self,
        name: &str,
        config: Option<CollectionConfig>,
    ) -> Result<Collection> {
        CollectionNames::validate(name)?;
        let cfg = config.unwrap_or_default();
        validate_config(&cfg)?;
        let info = self.backend.get_or_create_collection(name, &cfg).await?;
        if let Some(requested) = config {
            check_settings(&info, &requested)?;
        }
        Ok(self.wrap(info))
    }

    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let infos = self.backend.list_collections().await?;
        Ok(infos.into_iter().map(|info| self.wrap(info)).collect())
    }

    pub async fn has_collection(&self, name: &str) -> Result<bool> {
        match self.backend.get_collection(name).await {
            Ok(_) => Ok(true),
            Err(VecDbError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        CollectionNames::validate(name)?;
        self.backend.delete_collection(name).await
    }

    /// Destroy every collection owned by this client. Irreversible.
    pub async fn reset(&self) -> Result<()> {
        self.backend.reset().await
    }

    pub async fn count_collection(&self) -> Result<usize> {
        Ok(self.backend.list_collections().await?.len())
    }

    fn wrap(&self, info: CollectionInfo) -> Collection {
        Collection::new(
            Arc::clone(&self.backend),
            info,
            self.embedding_function.clone(),
        )
    }
}

fn validate_config(config: &CollectionConfig) -> Result<()> {
    if config.dimension == 0 {
        return Err(VecDbError::InvalidArgument(
            "collection dimension must be positive".into(),
        ));
    }
    Ok(())
}

fn check_settings(info: &CollectionInfo, requested: &CollectionConfig) -> Result<()> {
    if let Some(existing) = info.dimension {
        if existing != requested.dimension {
            return Err(VecDbError::InvalidArgument(format!(
                "collection {} exists with dimension {existing}, requested {}",
                info.name, requested.dimension
            )));
        }
    }
    if info.distance != requested.distance {
        return Err(VecDbError::InvalidArgument(format!(
            "collection {} exists with distance {}, requested {}",
            info.name,
            info.distance.as_str(),
            requested.distance.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceMetric;

    fn info(dimension: Option<u32>, distance: DistanceMetric) -> CollectionInfo {
        CollectionInfo {
            name: "docs".into(),
            id: None,
            dimension,
            distance,
        }
    }

    #[test]
    fn test_check_settings() {
        let requested = CollectionConfig::new(3, DistanceMetric::Cosine);
        assert!(check_settings(&info(Some(3), DistanceMetric::Cosine), &requested).is_ok());
        assert!(check_settings(&info(None, DistanceMetric::Cosine), &requested).is_ok());
        assert!(matches!(
            check_settings(&info(Some(4), DistanceMetric::Cosine), &requested),
            Err(VecDbError::InvalidArgument(_))
        ));
        assert!(matches!(
            check_settings(&info(Some(3), DistanceMetric::L2), &requested),
            Err(VecDbError::InvalidArgument(_))
        ));
    }

    #[cfg(not(any(feature = "local", feature = "remote", feature = "qdrant")))]
    #[tokio::test]
    async fn test_backend_not_compiled_in() {
        let config = ClientConfig::Local(crate::config::LocalConfig::in_memory());
        let err = Client::from_config(config).await.unwrap_err();
        assert!(matches!(err, VecDbError::Config(msg) if msg.contains("not compiled in")));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = validate_config(&CollectionConfig::new(0, DistanceMetric::Cosine)).unwrap_err();
        assert!(matches!(err, VecDbError::InvalidArgument(_)));
    }
}
