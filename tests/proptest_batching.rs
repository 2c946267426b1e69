//! Property tests for request batching and local query ordering.

#![cfg(feature = "local")]

use proptest::prelude::*;
use vecdb::{
    BatchLimits, Client, ClientConfig, CollectionConfig, DistanceMetric, LocalConfig, Metadata,
    RecordBatch, create_batches,
};

fn arb_batch() -> impl Strategy<Value = RecordBatch> {
    proptest::collection::vec(("[a-z ]{0,40}", proptest::collection::vec(-1.0f32..1.0, 4)), 0..60)
        .prop_map(|rows| {
            let mut batch = RecordBatch::default();
            for (i, (document, embedding)) in rows.into_iter().enumerate() {
                batch.ids.push(format!("id-{i}"));
                batch.documents.push(document);
                batch.embeddings.push(embedding);
                batch.metadatas.push(Metadata::new());
            }
            batch
        })
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

mod prop_create_batches {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Concatenating the sub-batches reproduces the input, and every
        /// sub-batch stays within the record limit.
        #[test]
        fn concatenation_reproduces_input(
            batch in arb_batch(),
            max_records in 1usize..12,
        ) {
            let limits = BatchLimits::new(max_records, 1 << 20);
            let batches = create_batches(batch.clone(), &limits).unwrap();

            let mut joined = RecordBatch::default();
            for b in &batches {
                prop_assert!(!b.is_empty());
                prop_assert!(b.len() <= max_records);
                joined.ids.extend(b.ids.iter().cloned());
                joined.documents.extend(b.documents.iter().cloned());
                joined.embeddings.extend(b.embeddings.iter().cloned());
                joined.metadatas.extend(b.metadatas.iter().cloned());
            }
            prop_assert_eq!(joined, batch);
        }

        /// Byte limits only ever shrink batches; order is still preserved.
        #[test]
        fn byte_limit_preserves_order(batch in arb_batch(), max_bytes in 200usize..2000) {
            let limits = BatchLimits::new(1000, max_bytes);
            let batches = create_batches(batch.clone(), &limits).unwrap();
            let ids: Vec<String> = batches.into_iter().flat_map(|b| b.ids).collect();
            prop_assert_eq!(ids, batch.ids);
        }
    }
}

mod prop_local_query_ordering {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Results are ordered by ascending distance and bounded by both
        /// `n_results` and the number of stored records.
        #[test]
        fn results_ascend_and_are_bounded(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            n_results in 1usize..25,
            metric in prop_oneof![
                Just(DistanceMetric::Cosine),
                Just(DistanceMetric::L2),
                Just(DistanceMetric::InnerProduct),
            ],
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result = rt.block_on(async {
                let client = Client::from_config(ClientConfig::Local(LocalConfig::in_memory()))
                    .await
                    .unwrap();
                let coll = client
                    .create_collection("prop", Some(CollectionConfig::new(DIM as u32, metric)))
                    .await
                    .unwrap();
                let ids: Vec<String> = (0..embeddings.len()).map(|i| format!("r{i}")).collect();
                let docs = ids.clone();
                coll.add(&docs, &ids, Some(&embeddings), None).await.unwrap();
                coll.query(&[query.clone()], n_results).await.unwrap()
            });

            let hits = &result.ids[0];
            prop_assert_eq!(hits.len(), n_results.min(embeddings.len()));
            let distances = &result.distances.as_ref().unwrap()[0];
            for pair in distances.windows(2) {
                prop_assert!(pair[0] <= pair[1], "distances not ascending: {:?}", distances);
            }
        }
    }
}
