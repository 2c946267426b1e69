use serde::{Deserialize, Serialize};

use crate::config::DistanceMetric;

pub type Document = String;
pub type Documents = Vec<Document>;
pub type Embedding = Vec<f32>;
pub type Embeddings = Vec<Embedding>;
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A single stored entry of a collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub document: Document,
    pub embedding: Embedding,
    pub metadata: Metadata,
}

/// Backend-neutral description of an existing collection.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    /// Backend-assigned identifier, when the backend has one separate from the name.
    pub id: Option<String>,
    /// `None` only for remote collections created elsewhere that never received data.
    pub dimension: Option<u32>,
    pub distance: DistanceMetric,
}

/// Result shape for similarity queries.
///
/// The outer sequence is indexed by query embedding, the inner one by rank
/// (nearest first). Distances are normalized so that smaller is nearer on
/// every backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<Document>>,
    pub metadatas: Vec<Vec<Metadata>>,
    pub distances: Option<Vec<Vec<f32>>>,
}

impl QueryResult {
    /// Append the ranked hits of one query.
    pub(crate) fn push_query(&mut self, hits: Vec<(Record, f32)>) {
        let mut ids = Vec::with_capacity(hits.len());
        let mut docs = Vec::with_capacity(hits.len());
        let mut metas = Vec::with_capacity(hits.len());
        let mut dists = Vec::with_capacity(hits.len());
        for (record, distance) in hits {
            ids.push(record.id);
            docs.push(record.document);
            metas.push(record.metadata);
            dists.push(distance);
        }
        self.ids.push(ids);
        self.documents.push(docs);
        self.metadatas.push(metas);
        self.distances.get_or_insert_with(Vec::new).push(dists);
    }
}

/// Result shape for `get` calls: flat sequences, no query dimension.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub documents: Vec<Document>,
    pub metadatas: Vec<Metadata>,
}

impl GetResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn push(&mut self, id: String, document: Document, metadata: Metadata) {
        self.ids.push(id);
        self.documents.push(document);
        self.metadatas.push(metadata);
    }
}
