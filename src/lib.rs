//! Backend-agnostic vector store client.
//!
//! One [`Client`]/[`Collection`] API over an embedded SQLite store, a
//! Chroma-compatible HTTP server and a Qdrant search engine.

pub mod backend;
pub mod batch;
pub mod client;
pub mod collection;
pub mod config;
pub mod embedding;
pub mod error;
pub mod meta;
pub mod types;

#[cfg(feature = "local")]
pub mod local;
#[cfg(feature = "qdrant")]
pub mod qdrant;
#[cfg(feature = "remote")]
pub mod remote;
#[cfg(feature = "sync")]
pub mod sync;

pub use crate::backend::VectorBackend;
pub use crate::batch::{BatchLimits, RecordBatch, create_batches};
pub use crate::client::Client;
pub use crate::collection::Collection;
pub use crate::config::{
    ClientConfig, CollectionConfig, DistanceMetric, LocalConfig, QdrantConfig, RemoteConfig,
};
pub use crate::embedding::EmbeddingFunction;
pub use crate::error::{Result, VecDbError};
pub use crate::meta::{CollectionFieldNames, CollectionNames};
pub use crate::types::{
    CollectionInfo, Document, Documents, Embedding, Embeddings, GetResult, Metadata, QueryResult,
    Record,
};

#[cfg(feature = "ollama")]
pub use crate::embedding::{KeepAlive, OllamaEmbedding};
#[cfg(feature = "local")]
pub use crate::local::LocalBackend;
#[cfg(feature = "qdrant")]
pub use crate::qdrant::QdrantBackend;
#[cfg(feature = "remote")]
pub use crate::remote::HttpBackend;
#[cfg(feature = "sync")]
pub use crate::sync::{SyncClient, SyncCollection, SyncEmbedding};
