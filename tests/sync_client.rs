//! Blocking wrappers over the embedded store.

#![cfg(all(feature = "sync", feature = "local"))]

use std::sync::Arc;

use anyhow::Result;
use vecdb::{ClientConfig, CollectionConfig, DistanceMetric, LocalConfig, SyncClient, VecDbError};

mod common;
use common::{FixedEmbedding, strings};

fn sync_client() -> Result<SyncClient> {
    Ok(SyncClient::from_config(ClientConfig::Local(
        LocalConfig::in_memory(),
    ))?)
}

#[test]
fn sync_collection_roundtrip() -> Result<()> {
    let client = sync_client()?;
    assert_eq!(client.mode(), "local");
    client.heartbeat()?;

    let coll = client.create_collection(
        "sync_docs",
        Some(CollectionConfig::new(3, DistanceMetric::Cosine)),
    )?;
    coll.add(
        &strings(&["doc a", "doc b", "doc c"]),
        &strings(&["a", "b", "c"]),
        Some(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
        ]),
        None,
    )?;
    assert_eq!(coll.count()?, 3);
    assert_eq!(coll.get()?.len(), 3);

    let res = coll.query(&[vec![1.0, 0.0, 0.0]], 2)?;
    assert_eq!(res.ids, vec![strings(&["a", "c"])]);

    assert!(client.has_collection("sync_docs")?);
    assert_eq!(client.count_collection()?, 1);
    client.delete_collection("sync_docs")?;
    assert!(client.list_collections()?.is_empty());
    Ok(())
}

#[test]
fn sync_query_texts_with_embedding_function() -> Result<()> {
    let client = sync_client()?.with_embedding_function(Arc::new(FixedEmbedding::fruit()));
    let coll = client.get_or_create_collection(
        "sync_fruit",
        Some(CollectionConfig::new(3, DistanceMetric::Cosine)),
    )?;
    coll.add(
        &strings(&["apple", "banana"]),
        &strings(&["f1", "f2"]),
        None,
        None,
    )?;
    let res = coll.query_texts(&strings(&["red fruit"]), 1)?;
    assert_eq!(res.ids, vec![strings(&["f1"])]);
    Ok(())
}

#[test]
fn sync_errors_match_async_ones() -> Result<()> {
    let client = sync_client()?;
    let err = client.get_collection("ghost").unwrap_err();
    assert!(matches!(err, VecDbError::NotFound(_)), "got {err:?}");
    Ok(())
}
