//! Splitting of ingestion requests into backend-size-safe sub-requests.

use crate::error::{Result, VecDbError};
use crate::types::{Documents, Embeddings, Metadata, Record};

/// Estimated wire bytes per embedding component (JSON float plus separator).
const BYTES_PER_COMPONENT: usize = 16;

/// Per-request limits of a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_records: usize,
    pub max_bytes: usize,
}

impl BatchLimits {
    pub const fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            max_records,
            max_bytes,
        }
    }
}

/// Columnar set of records, index-aligned across the four sequences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordBatch {
    pub ids: Vec<String>,
    pub documents: Documents,
    pub embeddings: Embeddings,
    pub metadatas: Vec<Metadata>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut batch = RecordBatch::default();
        for record in records {
            batch.ids.push(record.id);
            batch.documents.push(record.document);
            batch.embeddings.push(record.embedding);
            batch.metadatas.push(record.metadata);
        }
        batch
    }

    pub fn into_records(self) -> Vec<Record> {
        self.ids
            .into_iter()
            .zip(self.documents)
            .zip(self.embeddings)
            .zip(self.metadatas)
            .map(|(((id, document), embedding), metadata)| Record {
                id,
                document,
                embedding,
                metadata,
            })
            .collect()
    }

    /// Keep the first `at` records, return the rest.
    fn split_off(&mut self, at: usize) -> RecordBatch {
        RecordBatch {
            ids: self.ids.split_off(at),
            documents: self.documents.split_off(at),
            embeddings: self.embeddings.split_off(at),
            metadatas: self.metadatas.split_off(at),
        }
    }

    fn estimated_size(&self, index: usize) -> Result<usize> {
        let metadata = serde_json::to_vec(&self.metadatas[index])?.len();
        Ok(self.ids[index].len()
            + self.documents[index].len()
            + self.embeddings[index].len() * BYTES_PER_COMPONENT
            + metadata)
    }
}

/// Partition `batch` into ordered sub-batches within `limits`.
///
/// Records are never split, and concatenating the output reproduces the input.
pub fn create_batches(mut batch: RecordBatch, limits: &BatchLimits) -> Result<Vec<RecordBatch>> {
    let max_records = limits.max_records.max(1);

    let mut counts = Vec::new();
    let mut count = 0usize;
    let mut bytes = 0usize;
    for i in 0..batch.len() {
        let size = batch.estimated_size(i)?;
        if size > limits.max_bytes {
            return Err(VecDbError::InvalidArgument(format!(
                "record {} is ~{size} bytes, above the backend payload limit of {} bytes",
                batch.ids[i], limits.max_bytes
            )));
        }
        if count > 0 && (count == max_records || bytes + size > limits.max_bytes) {
            counts.push(count);
            count = 0;
            bytes = 0;
        }
        count += 1;
        bytes += size;
    }
    if count > 0 {
        counts.push(count);
    }

    let mut batches = Vec::with_capacity(counts.len());
    for count in counts {
        let rest = batch.split_off(count);
        batches.push(batch);
        batch = rest;
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(n: usize, dim: usize) -> RecordBatch {
        RecordBatch::from_records((0..n).map(|i| Record {
            id: format!("id{i}"),
            document: format!("doc {i}"),
            embedding: vec![i as f32; dim],
            metadata: json!({ "i": i }).as_object().cloned().unwrap_or_default(),
        }))
    }

    #[test]
    fn splits_by_record_count() {
        let batches = create_batches(sample(10, 2), &BatchLimits::new(4, usize::MAX)).unwrap();
        let sizes: Vec<_> = batches.iter().map(RecordBatch::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(batches[1].ids, vec!["id4", "id5", "id6", "id7"]);
        assert_eq!(batches[2].embeddings, vec![vec![8.0, 8.0], vec![9.0, 9.0]]);
    }

    #[test]
    fn splits_by_byte_budget() {
        let input = sample(6, 8);
        let one = input.estimated_size(0).unwrap();
        let batches =
            create_batches(input.clone(), &BatchLimits::new(100, one * 2 + 1)).unwrap();
        assert_eq!(batches.len(), 3);
        let merged = RecordBatch::from_records(batches.into_iter().flat_map(|b| b.into_records()));
        assert_eq!(merged, input);
    }

    #[test]
    fn small_request_is_a_single_batch() {
        let input = sample(3, 4);
        let batches = create_batches(input.clone(), &BatchLimits::new(5461, 1 << 20)).unwrap();
        assert_eq!(batches, vec![input]);
    }

    #[test]
    fn empty_request_yields_no_batches() {
        let batches = create_batches(RecordBatch::default(), &BatchLimits::new(10, 10)).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn oversized_record_is_rejected() {
        let err = create_batches(sample(2, 64), &BatchLimits::new(10, 32)).unwrap_err();
        assert!(matches!(err, VecDbError::InvalidArgument(msg) if msg.contains("id0")));
    }

    #[test]
    fn zero_record_limit_is_treated_as_one() {
        let batches = create_batches(sample(3, 1), &BatchLimits::new(0, usize::MAX)).unwrap();
        assert_eq!(batches.len(), 3);
    }
}
