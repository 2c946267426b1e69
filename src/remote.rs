//! Chroma-compatible server over its v2 REST API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::backend::VectorBackend;
use crate::batch::{BatchLimits, RecordBatch};
use crate::config::{CollectionConfig, DistanceMetric, RemoteConfig};
use crate::error::{Result, VecDbError};
use crate::meta::CollectionFieldNames;
use crate::types::{CollectionInfo, Embedding, GetResult, Metadata, QueryResult};

/// Used when the server does not advertise `max_batch_size`.
const DEFAULT_MAX_BATCH_RECORDS: usize = 5461;
const REMOTE_MAX_BATCH_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub(crate) struct ChromaCollection {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) metadata: Option<Metadata>,
    #[serde(default)]
    pub(crate) dimension: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: Metadata,
    get_or_create: bool,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    ids: Vec<String>,
    embeddings: Vec<Embedding>,
    documents: Vec<String>,
    /// Chroma rejects `{}`; records without metadata are sent as `null`.
    metadatas: Vec<Option<Metadata>>,
}

impl From<RecordBatch> for UpsertRequest {
    fn from(batch: RecordBatch) -> Self {
        Self {
            ids: batch.ids,
            embeddings: batch.embeddings,
            documents: batch.documents,
            metadatas: batch
                .metadatas
                .into_iter()
                .map(|m| (!m.is_empty()).then_some(m))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: &'a [Embedding],
    n_results: usize,
    include: [&'static str; 3],
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChromaGetResponse {
    pub(crate) ids: Vec<String>,
    #[serde(default)]
    pub(crate) documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub(crate) metadatas: Option<Vec<Option<Metadata>>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ChromaQueryResponse {
    pub(crate) ids: Vec<Vec<String>>,
    #[serde(default)]
    pub(crate) documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub(crate) metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    pub(crate) distances: Option<Vec<Vec<Option<f32>>>>,
}

#[derive(Debug, Deserialize)]
struct PreflightChecks {
    #[serde(default)]
    max_batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ChromaErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Remote HTTP engine.
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
    tenant: String,
    database: String,
    allow_reset: bool,
    max_batch_records: usize,
}

impl HttpBackend {
    /// Build the HTTP client and read the server's batch limit.
    pub async fn connect(config: RemoteConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|e| VecDbError::Config(format!("invalid remote address: {e}")))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| VecDbError::Config(format!("invalid header name {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| VecDbError::Config(format!("invalid header value for {key}: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| VecDbError::Config(format!("failed to build http client: {e}")))?;

        let mut backend = Self {
            http,
            base_url,
            tenant: config.tenant,
            database: config.database,
            allow_reset: config.allow_reset,
            max_batch_records: DEFAULT_MAX_BATCH_RECORDS,
        };

        let checks: PreflightChecks = backend
            .send_json(Method::GET, &["pre-flight-checks"], None::<&()>)
            .await?;
        if let Some(max) = checks.max_batch_size {
            backend.max_batch_records = max;
        }

        info!(
            url = %backend.base_url,
            tenant = %backend.tenant,
            database = %backend.database,
            max_batch_records = backend.max_batch_records,
            "connected to remote vector store"
        );
        Ok(backend)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| VecDbError::Config(format!("base url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(segments);
        Ok(url)
    }

    fn collections_path<'a>(&'a self, rest: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec![
            "tenants",
            self.tenant.as_str(),
            "databases",
            self.database.as_str(),
            "collections",
        ];
        segments.extend_from_slice(rest);
        segments
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<reqwest::Response> {
        let url = self.endpoint(segments)?;
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(error_from_response(status, &text))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<T> {
        let resp = self.send(method, segments, body).await?;
        Ok(resp.json::<T>().await?)
    }

    fn collection_key<'a>(&self, collection: &'a CollectionInfo) -> Result<&'a str> {
        collection.id.as_deref().ok_or_else(|| {
            VecDbError::InvalidArgument(format!(
                "collection {} has no remote id; obtain it from this client",
                collection.name
            ))
        })
    }
}

#[async_trait]
impl VectorBackend for HttpBackend {
    async fn create_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo> {
        let body = CreateCollectionRequest {
            name,
            metadata: collection_metadata(config),
            get_or_create: false,
        };
        let created: ChromaCollection = self
            .send_json(Method::POST, &self.collections_path(&[]), Some(&body))
            .await?;
        debug!(collection = name, dimension = config.dimension, "created remote collection");
        Ok(collection_info(created))
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo> {
        let found: ChromaCollection = self
            .send_json(Method::GET, &self.collections_path(&[name]), None::<&()>)
            .await?;
        Ok(collection_info(found))
    }

    async fn get_or_create_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo> {
        let body = CreateCollectionRequest {
            name,
            metadata: collection_metadata(config),
            get_or_create: true,
        };
        let collection: ChromaCollection = self
            .send_json(Method::POST, &self.collections_path(&[]), Some(&body))
            .await?;
        Ok(collection_info(collection))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections: Vec<ChromaCollection> = self
            .send_json(Method::GET, &self.collections_path(&[]), None::<&()>)
            .await?;
        Ok(collections.into_iter().map(collection_info).collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.send(Method::DELETE, &self.collections_path(&[name]), None::<&()>)
            .await?;
        debug!(collection = name, "deleted remote collection");
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        if !self.allow_reset {
            return Err(VecDbError::Config(
                "reset is disabled for this client (allow_reset = false)".into(),
            ));
        }
        self.send(Method::POST, &["reset"], None::<&()>).await?;
        info!(url = %self.base_url, "reset remote vector store");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<()> {
        self.send(Method::GET, &["heartbeat"], None::<&()>).await?;
        Ok(())
    }

    async fn upsert(&self, collection: &CollectionInfo, batch: RecordBatch) -> Result<()> {
        let key = self.collection_key(collection)?;
        let body = UpsertRequest::from(batch);
        self.send(Method::POST, &self.collections_path(&[key, "upsert"]), Some(&body))
            .await?;
        Ok(())
    }

    async fn get(&self, collection: &CollectionInfo) -> Result<GetResult> {
        let key = self.collection_key(collection)?;
        let body = json!({ "include": ["documents", "metadatas"] });
        let resp: ChromaGetResponse = self
            .send_json(Method::POST, &self.collections_path(&[key, "get"]), Some(&body))
            .await?;
        normalize_get(resp)
    }

    async fn query(
        &self,
        collection: &CollectionInfo,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<QueryResult> {
        let key = self.collection_key(collection)?;
        let body = QueryRequest {
            query_embeddings,
            n_results,
            include: ["documents", "metadatas", "distances"],
        };
        let resp: ChromaQueryResponse = self
            .send_json(Method::POST, &self.collections_path(&[key, "query"]), Some(&body))
            .await?;
        normalize_query(resp)
    }

    async fn count(&self, collection: &CollectionInfo) -> Result<usize> {
        let key = self.collection_key(collection)?;
        self.send_json(Method::GET, &self.collections_path(&[key, "count"]), None::<&()>)
            .await
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits::new(self.max_batch_records, REMOTE_MAX_BATCH_BYTES)
    }

    fn mode(&self) -> &'static str {
        "remote"
    }
}

fn collection_metadata(config: &CollectionConfig) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(
        CollectionFieldNames::SPACE.to_string(),
        Value::from(config.distance.as_str()),
    );
    metadata.insert(
        CollectionFieldNames::DIMENSION.to_string(),
        Value::from(config.dimension),
    );
    metadata
}

/// Chroma's own default space is `l2`; the dimension comes from the server
/// once data exists, else from our creation metadata.
pub(crate) fn collection_info(collection: ChromaCollection) -> CollectionInfo {
    let metadata = collection.metadata.unwrap_or_default();
    let distance = metadata
        .get(CollectionFieldNames::SPACE)
        .and_then(Value::as_str)
        .and_then(DistanceMetric::parse)
        .unwrap_or(DistanceMetric::L2);
    let dimension = collection.dimension.or_else(|| {
        metadata
            .get(CollectionFieldNames::DIMENSION)
            .and_then(Value::as_u64)
            .map(|d| d as u32)
    });
    CollectionInfo {
        name: collection.name,
        id: Some(collection.id),
        dimension,
        distance,
    }
}

pub(crate) fn normalize_get(resp: ChromaGetResponse) -> Result<GetResult> {
    let n = resp.ids.len();
    let documents = column(resp.documents, n, "documents")?;
    let metadatas = column(resp.metadatas, n, "metadatas")?;
    Ok(GetResult {
        ids: resp.ids,
        documents,
        metadatas,
    })
}

pub(crate) fn normalize_query(resp: ChromaQueryResponse) -> Result<QueryResult> {
    let queries = resp.ids.len();
    let mut documents = resp.documents.unwrap_or_default().into_iter();
    let mut metadatas = resp.metadatas.unwrap_or_default().into_iter();
    let mut distances = resp.distances.map(|d| d.into_iter());

    let mut result = QueryResult {
        ids: Vec::with_capacity(queries),
        documents: Vec::with_capacity(queries),
        metadatas: Vec::with_capacity(queries),
        distances: distances.as_ref().map(|_| Vec::with_capacity(queries)),
    };
    for ids in resp.ids {
        let n = ids.len();
        result.documents.push(column(documents.next(), n, "documents")?);
        result.metadatas.push(column(metadatas.next(), n, "metadatas")?);
        if let (Some(iter), Some(out)) = (distances.as_mut(), result.distances.as_mut()) {
            let row: Vec<f32> = iter
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect();
            if row.len() != n {
                return Err(misaligned("distances", row.len(), n));
            }
            out.push(row);
        }
        result.ids.push(ids);
    }
    Ok(result)
}

/// Fill `null` entries with defaults and check alignment with the ids.
fn column<T: Default>(values: Option<Vec<Option<T>>>, n: usize, field: &str) -> Result<Vec<T>> {
    let Some(values) = values else {
        return Ok((0..n).map(|_| T::default()).collect());
    };
    if values.len() != n {
        return Err(misaligned(field, values.len(), n));
    }
    Ok(values.into_iter().map(Option::unwrap_or_default).collect())
}

fn misaligned(field: &str, got: usize, expected: usize) -> VecDbError {
    VecDbError::Backend(format!(
        "server returned {got} {field} for {expected} ids"
    ))
}

pub(crate) fn error_from_response(status: StatusCode, text: &str) -> VecDbError {
    let body: ChromaErrorBody = serde_json::from_str(text).unwrap_or_default();
    let kind = body.error.unwrap_or_default();
    let message = body.message.unwrap_or_else(|| text.to_string());
    let detail = if kind.is_empty() {
        format!("{status}: {message}")
    } else {
        format!("{status} {kind}: {message}")
    };

    match (status, kind.as_str()) {
        (StatusCode::NOT_FOUND, _) | (_, "NotFoundError" | "InvalidCollection") => {
            VecDbError::NotFound(detail)
        }
        (StatusCode::CONFLICT, _) | (_, "UniqueConstraintError" | "AlreadyExistsError") => {
            VecDbError::AlreadyExists(detail)
        }
        (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
            VecDbError::InvalidArgument(detail)
        }
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => VecDbError::Config(detail),
        (
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT,
            _,
        ) => VecDbError::BackendUnavailable(detail),
        _ => VecDbError::Backend(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_sends_null_for_missing_metadata() {
        let mut batch = RecordBatch::default();
        for (id, meta) in [("a", json!({})), ("b", json!({ "lang": "en" }))] {
            batch.ids.push(id.into());
            batch.documents.push(format!("doc {id}"));
            batch.embeddings.push(vec![1.0, 0.0]);
            batch.metadatas.push(meta.as_object().cloned().unwrap());
        }
        let body = serde_json::to_value(UpsertRequest::from(batch)).unwrap();
        assert_eq!(body["metadatas"], json!([null, { "lang": "en" }]));
        assert_eq!(body["ids"], json!(["a", "b"]));
    }

    #[test]
    fn test_collection_info_reads_space_and_dimension() {
        let raw: ChromaCollection = serde_json::from_value(json!({
            "id": "6f1c",
            "name": "docs",
            "metadata": { "hnsw:space": "cosine", "dimension": 3 },
            "dimension": null,
            "tenant": "default_tenant"
        }))
        .unwrap();
        let info = collection_info(raw);
        assert_eq!(info.id.as_deref(), Some("6f1c"));
        assert_eq!(info.dimension, Some(3));
        assert_eq!(info.distance, DistanceMetric::Cosine);
    }

    #[test]
    fn test_collection_info_defaults_for_foreign_collections() {
        let raw: ChromaCollection =
            serde_json::from_value(json!({ "id": "x", "name": "legacy", "metadata": null }))
                .unwrap();
        let info = collection_info(raw);
        assert_eq!(info.dimension, None);
        assert_eq!(info.distance, DistanceMetric::L2);
    }

    #[test]
    fn test_normalize_get_fills_nulls() {
        let resp: ChromaGetResponse = serde_json::from_value(json!({
            "ids": ["a", "b"],
            "documents": ["doc a", null],
            "metadatas": [{ "k": 1 }, null],
            "embeddings": null
        }))
        .unwrap();
        let got = normalize_get(resp).unwrap();
        assert_eq!(got.ids, vec!["a", "b"]);
        assert_eq!(got.documents, vec!["doc a".to_string(), String::new()]);
        assert_eq!(got.metadatas[0]["k"], 1);
        assert!(got.metadatas[1].is_empty());
    }

    #[test]
    fn test_normalize_query_shapes() {
        let resp: ChromaQueryResponse = serde_json::from_value(json!({
            "ids": [["a", "c"]],
            "documents": [["doc a", "doc c"]],
            "metadatas": [[null, { "k": "v" }]],
            "distances": [[0.0, 0.29]]
        }))
        .unwrap();
        let got = normalize_query(resp).unwrap();
        assert_eq!(got.ids, vec![vec!["a".to_string(), "c".to_string()]]);
        assert_eq!(got.documents[0][1], "doc c");
        assert_eq!(got.metadatas[0][1]["k"], "v");
        assert_eq!(got.distances.unwrap()[0], vec![0.0, 0.29]);
    }

    #[test]
    fn test_normalize_query_rejects_misaligned_columns() {
        let resp: ChromaQueryResponse = serde_json::from_value(json!({
            "ids": [["a", "c"]],
            "documents": [["doc a"]],
        }))
        .unwrap();
        assert!(matches!(normalize_query(resp), Err(VecDbError::Backend(_))));
    }

    #[test]
    fn test_error_mapping() {
        let nf = error_from_response(
            StatusCode::NOT_FOUND,
            r#"{"error":"NotFoundError","message":"Collection [docs] does not exist"}"#,
        );
        assert!(matches!(nf, VecDbError::NotFound(msg) if msg.contains("docs")));

        let legacy = error_from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"UniqueConstraintError","message":"exists"}"#,
        );
        assert!(matches!(legacy, VecDbError::AlreadyExists(_)));

        let bad = error_from_response(StatusCode::UNPROCESSABLE_ENTITY, "not json");
        assert!(matches!(bad, VecDbError::InvalidArgument(msg) if msg.contains("not json")));

        let down = error_from_response(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(down, VecDbError::BackendUnavailable(_)));
    }
}
