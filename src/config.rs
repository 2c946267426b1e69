use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::{Result, VecDbError};

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "http://localhost:11434";

/// Supported vector distance metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Euclidean distance.
    L2,
    #[default]
    Cosine,
    /// Dot product.
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::InnerProduct => "ip",
        }
    }

    /// Parse the names used by the supported backends.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "l2" | "euclid" | "euclidean" => Some(DistanceMetric::L2),
            "cosine" => Some(DistanceMetric::Cosine),
            "ip" | "dot" | "inner_product" => Some(DistanceMetric::InnerProduct),
            _ => None,
        }
    }
}

/// Settings fixed at collection creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionConfig {
    pub dimension: u32,
    pub distance: DistanceMetric,
}

impl CollectionConfig {
    pub fn new(dimension: u32, distance: DistanceMetric) -> Self {
        Self {
            dimension,
            distance,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            dimension: 768,
            distance: DistanceMetric::Cosine,
        }
    }
}

/// Embedded, file-backed engine.
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// Directory holding the database file, or `:memory:` for a private in-memory store.
    pub storage_path: String,
    pub tenant: String,
    pub database: String,
    pub allow_reset: bool,
    pub max_connections: u32,
}

impl LocalConfig {
    pub fn new(storage_path: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            allow_reset: true,
            max_connections: 5,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// `VECDB_LOCAL_PATH` (required), `VECDB_TENANT`, `VECDB_DATABASE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(require_env("VECDB_LOCAL_PATH")?);
        if let Ok(tenant) = env::var("VECDB_TENANT") {
            config.tenant = tenant;
        }
        if let Ok(database) = env::var("VECDB_DATABASE") {
            config.database = database;
        }
        if let Some(allow) = parse_env::<bool>("VECDB_ALLOW_RESET") {
            config.allow_reset = allow;
        }
        Ok(config)
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn allow_reset(mut self, allow_reset: bool) -> Self {
        self.allow_reset = allow_reset;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.storage_path == ":memory:"
    }
}

/// Chroma-compatible server reached over HTTP.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub headers: HashMap<String, String>,
    pub use_tls: bool,
    pub tenant: String,
    pub database: String,
    pub allow_reset: bool,
    pub timeout: Option<Duration>,
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            headers: HashMap::new(),
            use_tls: false,
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            allow_reset: true,
            timeout: None,
        }
    }

    /// `VECDB_REMOTE_HOST` (required), `VECDB_REMOTE_PORT` (default 8000),
    /// `VECDB_REMOTE_TLS`, `VECDB_REMOTE_HEADERS` (`k=v,k=v`), `VECDB_TENANT`,
    /// `VECDB_DATABASE`.
    pub fn from_env() -> Result<Self> {
        let host = require_env("VECDB_REMOTE_HOST")?;
        let port = parse_env("VECDB_REMOTE_PORT").unwrap_or(8000);
        let mut config = Self::new(host, port);
        config.use_tls = parse_env("VECDB_REMOTE_TLS").unwrap_or(false);
        if let Ok(raw) = env::var("VECDB_REMOTE_HEADERS") {
            config.headers = parse_headers(&raw)?;
        }
        if let Ok(tenant) = env::var("VECDB_TENANT") {
            config.tenant = tenant;
        }
        if let Ok(database) = env::var("VECDB_DATABASE") {
            config.database = database;
        }
        if let Some(allow) = parse_env::<bool>("VECDB_ALLOW_RESET") {
            config.allow_reset = allow;
        }
        config.timeout = parse_env::<u64>("VECDB_REMOTE_TIMEOUT_SECS").map(Duration::from_secs);
        Ok(config)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn allow_reset(mut self, allow_reset: bool) -> Self {
        self.allow_reset = allow_reset;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Qdrant reached over gRPC, plus the embedding service its collections use.
#[derive(Clone, Debug)]
pub struct QdrantConfig {
    pub url: String,
    pub port: u16,
    pub embedding_model: String,
    pub embedding_service_base_url: String,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>, port: u16) -> Self {
        Self {
            url: url.into(),
            port,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_service_base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
        }
    }

    /// `VECDB_QDRANT_URL` (required), `VECDB_QDRANT_PORT` (default 6334),
    /// `VECDB_EMBEDDING_MODEL`, `VECDB_EMBEDDING_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let url = require_env("VECDB_QDRANT_URL")?;
        let port = parse_env("VECDB_QDRANT_PORT").unwrap_or(6334);
        let mut config = Self::new(url, port);
        if let Ok(model) = env::var("VECDB_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(base_url) = env::var("VECDB_EMBEDDING_BASE_URL") {
            config.embedding_service_base_url = base_url;
        }
        Ok(config)
    }

    /// gRPC endpoint, `url` with `port` applied unless `url` already names one.
    pub fn endpoint(&self) -> String {
        let url = self.url.trim_end_matches('/');
        let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        if without_scheme.contains(':') {
            url.to_string()
        } else {
            format!("{url}:{}", self.port)
        }
    }
}

/// Which backend a client talks to.
#[derive(Clone, Debug)]
pub enum ClientConfig {
    Local(LocalConfig),
    Remote(RemoteConfig),
    Qdrant(QdrantConfig),
}

impl ClientConfig {
    /// Select the backend with `VECDB_BACKEND` (`local`, `remote` or `qdrant`)
    /// and read the matching variables.
    pub fn from_env() -> Result<Self> {
        let backend = require_env("VECDB_BACKEND")?;
        match backend.to_ascii_lowercase().as_str() {
            "local" => Ok(ClientConfig::Local(LocalConfig::from_env()?)),
            "remote" | "http" => Ok(ClientConfig::Remote(RemoteConfig::from_env()?)),
            "qdrant" => Ok(ClientConfig::Qdrant(QdrantConfig::from_env()?)),
            other => Err(VecDbError::Config(format!(
                "unknown VECDB_BACKEND: {other} (expected local, remote or qdrant)"
            ))),
        }
    }
}

fn parse_headers(raw: &str) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            VecDbError::Config(format!("malformed header entry (expected key=value): {pair}"))
        })?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(headers)
}

fn require_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| VecDbError::Config(format!("missing env: {key}")))
}

fn parse_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_names_roundtrip() {
        for metric in [
            DistanceMetric::L2,
            DistanceMetric::Cosine,
            DistanceMetric::InnerProduct,
        ] {
            assert_eq!(DistanceMetric::parse(metric.as_str()), Some(metric));
        }
        assert_eq!(DistanceMetric::parse("Euclid"), Some(DistanceMetric::L2));
        assert_eq!(DistanceMetric::parse("Dot"), Some(DistanceMetric::InnerProduct));
        assert_eq!(DistanceMetric::parse("manhattan"), None);
    }

    #[test]
    fn collection_config_defaults_to_768_cosine() {
        let cfg = CollectionConfig::default();
        assert_eq!(cfg.dimension, 768);
        assert_eq!(cfg.distance, DistanceMetric::Cosine);
    }

    #[test]
    fn headers_parse_key_value_pairs() {
        let headers = parse_headers("Authorization=Bearer abc, X-Chroma-Token = t1").unwrap();
        assert_eq!(headers["Authorization"], "Bearer abc");
        assert_eq!(headers["X-Chroma-Token"], "t1");
        assert!(matches!(
            parse_headers("broken"),
            Err(VecDbError::Config(_))
        ));
    }

    #[test]
    fn remote_base_url_honours_tls() {
        let cfg = RemoteConfig::new("chroma.internal", 8443);
        assert_eq!(cfg.base_url(), "http://chroma.internal:8443");
        assert_eq!(cfg.use_tls(true).base_url(), "https://chroma.internal:8443");
    }

    #[test]
    fn qdrant_endpoint_appends_port_once() {
        assert_eq!(
            QdrantConfig::new("http://localhost", 6334).endpoint(),
            "http://localhost:6334"
        );
        assert_eq!(
            QdrantConfig::new("http://localhost:7000/", 6334).endpoint(),
            "http://localhost:7000"
        );
    }
}
