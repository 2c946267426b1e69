//! Qdrant search engine over gRPC.
//!
//! Points are keyed by a UUIDv5 derived from the caller's id, which is kept
//! verbatim in the payload next to the document text and metadata.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, GetCollectionInfoResponse, PointId,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::VectorBackend;
use crate::batch::{BatchLimits, RecordBatch};
use crate::config::{CollectionConfig, DistanceMetric, QdrantConfig};
use crate::error::{Result, VecDbError};
use crate::meta::CollectionFieldNames;
use crate::types::{CollectionInfo, Embedding, GetResult, Metadata, QueryResult, Record};

const QDRANT_MAX_BATCH_RECORDS: usize = 256;
const QDRANT_MAX_BATCH_BYTES: usize = 32 * 1024 * 1024;
const SCROLL_PAGE_SIZE: u32 = 256;

/// Search engine driver.
pub struct QdrantBackend {
    client: Qdrant,
    endpoint: String,
}

impl QdrantBackend {
    /// The gRPC channel is established lazily on the first call.
    pub fn connect(config: &QdrantConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let client = Qdrant::from_url(&endpoint)
            .build()
            .map_err(|e| VecDbError::Config(format!("invalid qdrant endpoint {endpoint}: {e}")))?;
        info!(endpoint = %endpoint, "configured qdrant client");
        Ok(Self { client, endpoint })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self {
            client,
            endpoint: String::from("<external>"),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        if self.client.collection_exists(name).await? {
            Ok(())
        } else {
            Err(VecDbError::NotFound(format!("collection not found: {name}")))
        }
    }

    async fn describe(&self, name: &str) -> Result<CollectionInfo> {
        let response = self.client.collection_info(name).await?;
        Ok(collection_info(name, &response))
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn create_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> Result<CollectionInfo> {
        if self.client.collection_exists(name).await? {
            return Err(VecDbError::AlreadyExists(format!(
                "collection already exists: {name}"
            )));
        }
        self.client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(
                VectorParamsBuilder::new(config.dimension as u64, to_qdrant_distance(config.distance)),
            ))
            .await?;
        debug!(collection = name, dimension = config.dimension, "created qdrant collection");
        Ok(CollectionInfo {
            name: name.to_string(),
            id: None,
            dimension: Some(config.dimension),
            distance: config.distance,
        })
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo> {
        self.ensure_exists(name).await?;
        self.describe(name).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let response = self.client.list_collections().await?;
        let mut infos = Vec::with_capacity(response.collections.len());
        for description in response.collections {
            infos.push(self.describe(&description.name).await?);
        }
        Ok(infos)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.ensure_exists(name).await?;
        self.client.delete_collection(name).await?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        warn!(endpoint = %self.endpoint, "reset is not supported by the qdrant backend; ignoring");
        Ok(())
    }

    async fn heartbeat(&self) -> Result<()> {
        self.client.health_check().await?;
        Ok(())
    }

    async fn upsert(&self, collection: &CollectionInfo, batch: RecordBatch) -> Result<()> {
        let count = batch.len();
        let points = batch
            .into_records()
            .into_iter()
            .map(point_from_record)
            .collect::<Result<Vec<_>>>()?;
        self.client
            .upsert_points(UpsertPointsBuilder::new(&collection.name, points).wait(true))
            .await?;
        debug!(collection = %collection.name, count, "upserted points to qdrant");
        Ok(())
    }

    async fn get(&self, collection: &CollectionInfo) -> Result<GetResult> {
        let points = scroll_all(|offset| async move {
            let mut request = ScrollPointsBuilder::new(&collection.name)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true);
            if let Some(offset) = offset {
                request = request.offset(offset);
            }
            let page = self.client.scroll(request).await?;
            Ok::<_, VecDbError>((page.result, page.next_page_offset))
        })
        .await?;

        let mut result = GetResult::default();
        for point in points {
            let record = record_from_payload(point.id.as_ref(), point.payload);
            result.push(record.id, record.document, record.metadata);
        }
        Ok(result)
    }

    async fn query(
        &self,
        collection: &CollectionInfo,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<QueryResult> {
        let mut result = QueryResult::default();
        for embedding in query_embeddings {
            let response = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&collection.name, embedding.clone(), n_results as u64)
                        .with_payload(true),
                )
                .await?;
            let hits = response
                .result
                .into_iter()
                .map(|scored| {
                    let distance = score_to_distance(collection.distance, scored.score);
                    (record_from_payload(scored.id.as_ref(), scored.payload), distance)
                })
                .collect();
            result.push_query(hits);
        }
        Ok(result)
    }

    async fn count(&self, collection: &CollectionInfo) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&collection.name).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or_default())
    }

    fn batch_limits(&self) -> BatchLimits {
        BatchLimits::new(QDRANT_MAX_BATCH_RECORDS, QDRANT_MAX_BATCH_BYTES)
    }

    fn mode(&self) -> &'static str {
        "qdrant"
    }
}

/// Stable point id for a caller id.
pub(crate) fn point_uuid(id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()).to_string()
}

pub(crate) fn to_qdrant_distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::L2 => Distance::Euclid,
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::InnerProduct => Distance::Dot,
    }
}

fn from_qdrant_distance(distance: Distance) -> DistanceMetric {
    match distance {
        Distance::Euclid | Distance::Manhattan => DistanceMetric::L2,
        Distance::Dot => DistanceMetric::InnerProduct,
        _ => DistanceMetric::Cosine,
    }
}

/// Qdrant scores similarity for cosine and dot, distance for euclid.
pub(crate) fn score_to_distance(metric: DistanceMetric, score: f32) -> f32 {
    match metric {
        DistanceMetric::L2 => score,
        DistanceMetric::Cosine | DistanceMetric::InnerProduct => 1.0 - score,
    }
}

fn collection_info(name: &str, response: &GetCollectionInfoResponse) -> CollectionInfo {
    let params = response
        .result
        .as_ref()
        .and_then(|info| info.config.as_ref())
        .and_then(|config| config.params.as_ref())
        .and_then(|params| params.vectors_config.as_ref())
        .and_then(|vectors| vectors.config.as_ref());
    let (dimension, distance) = match params {
        Some(VectorsConfigKind::Params(p)) => (
            u32::try_from(p.size).ok(),
            Distance::try_from(p.distance)
                .map(from_qdrant_distance)
                .unwrap_or_default(),
        ),
        _ => (None, DistanceMetric::default()),
    };
    CollectionInfo {
        name: name.to_string(),
        id: None,
        dimension,
        distance,
    }
}

pub(crate) fn point_from_record(record: Record) -> Result<PointStruct> {
    let mut payload = serde_json::Map::new();
    payload.insert(
        CollectionFieldNames::RECORD_ID.to_string(),
        Value::String(record.id.clone()),
    );
    payload.insert(
        CollectionFieldNames::DOCUMENT.to_string(),
        Value::String(record.document),
    );
    payload.insert(
        CollectionFieldNames::METADATA.to_string(),
        Value::Object(record.metadata),
    );
    let payload = Payload::try_from(Value::Object(payload))?;
    Ok(PointStruct::new(point_uuid(&record.id), record.embedding, payload))
}

/// Points written by other tools may lack our payload keys; fall back to the
/// point id and empty fields.
pub(crate) fn record_from_payload(
    id: Option<&PointId>,
    mut payload: HashMap<String, QdrantValue>,
) -> Record {
    let record_id = payload
        .remove(CollectionFieldNames::RECORD_ID)
        .and_then(|v| match v.kind {
            Some(Kind::StringValue(s)) => Some(s),
            _ => None,
        })
        .or_else(|| {
            id.and_then(|pid| match &pid.point_id_options {
                Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
                Some(PointIdOptions::Num(n)) => Some(n.to_string()),
                None => None,
            })
        })
        .unwrap_or_default();
    let document = payload
        .remove(CollectionFieldNames::DOCUMENT)
        .and_then(|v| match v.kind {
            Some(Kind::StringValue(s)) => Some(s),
            _ => None,
        })
        .unwrap_or_default();
    let metadata = match payload.remove(CollectionFieldNames::METADATA).map(value_to_json) {
        Some(Value::Object(map)) => map,
        _ => Metadata::new(),
    };
    Record {
        id: record_id,
        document,
        embedding: Vec::new(),
        metadata,
    }
}

pub(crate) fn value_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(st)) => Value::Object(
            st.fields
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
    }
}

/// Follow `next_page_offset` until the server reports the last page.
async fn scroll_all<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<PointId>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<PointId>)>>,
{
    let mut items = Vec::new();
    let mut offset = None;
    loop {
        let (page, next) = fetch_page(offset.take()).await?;
        items.extend(page);
        match next {
            Some(next) => offset = Some(next),
            None => return Ok(items),
        }
    }
}
