use thiserror::Error;

/// Common result type used across the crate.
pub type Result<T> = std::result::Result<T, VecDbError>;

/// Unified error enum surfaced by all public APIs.
#[derive(Error, Debug)]
pub enum VecDbError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A batched write failed after some sub-requests were already committed.
    /// Committed batches are not rolled back.
    #[error(
        "partial write: {committed_batches}/{total_batches} batches ({committed_records} records) committed before failure: {source}"
    )]
    PartialWrite {
        committed_batches: usize,
        committed_records: usize,
        total_batches: usize,
        #[source]
        source: Box<VecDbError>,
    },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VecDbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, VecDbError::NotFound(_))
    }
}

#[cfg(feature = "local")]
impl From<sqlx::Error> for VecDbError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => VecDbError::NotFound("row not found".into()),
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => VecDbError::BackendUnavailable(value.to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                VecDbError::AlreadyExists(db.message().to_string())
            }
            _ => VecDbError::Backend(value.to_string()),
        }
    }
}

#[cfg(any(feature = "remote", feature = "ollama"))]
impl From<reqwest::Error> for VecDbError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_connect() || value.is_timeout() {
            VecDbError::BackendUnavailable(value.to_string())
        } else if value.is_decode() {
            VecDbError::Backend(format!("failed to decode response: {value}"))
        } else {
            VecDbError::Backend(value.to_string())
        }
    }
}

#[cfg(feature = "qdrant")]
impl From<qdrant_client::QdrantError> for VecDbError {
    fn from(value: qdrant_client::QdrantError) -> Self {
        match &value {
            qdrant_client::QdrantError::ResponseError { status } => {
                from_grpc_code(status.code() as i32, value.to_string())
            }
            _ => VecDbError::Backend(value.to_string()),
        }
    }
}

/// Classify a gRPC status code reported by the Qdrant service.
#[cfg(feature = "qdrant")]
fn from_grpc_code(code: i32, message: String) -> VecDbError {
    match code {
        3 => VecDbError::InvalidArgument(message),
        5 => VecDbError::NotFound(message),
        6 => VecDbError::AlreadyExists(message),
        // DeadlineExceeded, Unavailable
        4 | 14 => VecDbError::BackendUnavailable(message),
        _ => VecDbError::Backend(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_write_reports_committed_prefix() {
        let err = VecDbError::PartialWrite {
            committed_batches: 2,
            committed_records: 200,
            total_batches: 3,
            source: Box::new(VecDbError::BackendUnavailable("connection reset".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("2/3 batches"));
        assert!(msg.contains("200 records"));
        assert!(msg.contains("connection reset"));
    }

    #[cfg(feature = "qdrant")]
    #[test]
    fn grpc_codes_map_onto_error_classes() {
        let msg = || "Collection `ghost` doesn't exist!".to_string();
        assert!(from_grpc_code(5, msg()).is_not_found());
        assert!(matches!(from_grpc_code(6, msg()), VecDbError::AlreadyExists(_)));
        assert!(matches!(from_grpc_code(3, msg()), VecDbError::InvalidArgument(_)));
        assert!(matches!(from_grpc_code(4, msg()), VecDbError::BackendUnavailable(_)));
        assert!(matches!(from_grpc_code(14, msg()), VecDbError::BackendUnavailable(_)));
        assert!(matches!(from_grpc_code(13, msg()), VecDbError::Backend(_)));
    }
}
