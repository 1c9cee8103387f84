//! Repository construction and configuration validation.

use std::time::Duration;

use elasticsearch::Elasticsearch;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};

use bingo_model::{IndigoRecord, RecordKind};

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::ElasticRepository;
use crate::version::{EngineVersion, VersionProfile};

/// Validated configuration a repository runs against.
#[derive(Debug, Clone)]
pub(crate) struct RepositoryConfig {
    pub index_name: String,
    pub host_name: String,
    pub port: u16,
    pub scheme: String,
    pub refresh_interval: Option<String>,
    pub request_timeout: Duration,
    pub shards: u32,
    pub replicas: u32,
    pub max_result_window: u32,
    pub basic_auth: Option<(String, String)>,
    pub insecure_tls: bool,
}

/// Builder for [`ElasticRepository`].
///
/// `indexName`, `hostName`, `port`, `scheme`, and `version` are
/// required; everything else has engine-sensible defaults. Building
/// performs no network I/O: the repository comes back unconnected and
/// creates its index lazily on first use (or explicitly through
/// [`ElasticRepository::ensure_index`]).
///
/// ```no_run
/// use bingo_elastic::RepositoryBuilder;
/// use bingo_model::{IndigoRecordMolecule, naming};
///
/// # fn main() -> Result<(), bingo_elastic::RepositoryError> {
/// let repository = RepositoryBuilder::new()
///     .with_index_name(naming::BINGO_MOLECULES)
///     .with_host_name("localhost")
///     .with_port(9200)
///     .with_scheme("http")
///     .with_version("8")
///     .with_refresh_interval("1s")
///     .build::<IndigoRecordMolecule>()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RepositoryBuilder {
    index_name: Option<String>,
    host_name: Option<String>,
    port: Option<u16>,
    scheme: Option<String>,
    version: Option<String>,
    refresh_interval: Option<String>,
    request_timeout: Duration,
    shards: u32,
    replicas: u32,
    max_result_window: u32,
    basic_auth: Option<(String, String)>,
    insecure_tls: bool,
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        RepositoryBuilder {
            index_name: None,
            host_name: None,
            port: None,
            scheme: None,
            version: None,
            refresh_interval: None,
            request_timeout: Duration::from_millis(30_000),
            shards: 1,
            replicas: 1,
            max_result_window: 10_000,
            basic_auth: None,
            insecure_tls: false,
        }
    }
}

impl RepositoryBuilder {
    /// A builder with nothing configured yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target index name. Required.
    pub fn with_index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Engine host. Required.
    pub fn with_host_name(mut self, host: impl Into<String>) -> Self {
        self.host_name = Some(host.into());
        self
    }

    /// Engine port. Required.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Endpoint scheme, `http` or `https`. Required.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Engine version tag, e.g. `"8"` or `"7.10.2"`. Required.
    pub fn with_version(mut self, tag: impl Into<String>) -> Self {
        self.version = Some(tag.into());
        self
    }

    /// Index refresh interval as an engine duration string such as
    /// `"1s"`, or `"-1"` to disable periodic refresh. The engine
    /// default applies when omitted.
    pub fn with_refresh_interval(mut self, interval: impl Into<String>) -> Self {
        self.refresh_interval = Some(interval.into());
        self
    }

    /// Deadline applied to every engine round trip. Defaults to 30s.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Number of primary shards for a newly created index.
    pub fn with_shards(mut self, shards: u32) -> Self {
        self.shards = shards;
        self
    }

    /// Number of replica shards for a newly created index.
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Upper bound on `from + size` the engine will page through.
    pub fn with_max_result_window(mut self, window: u32) -> Self {
        self.max_result_window = window;
        self
    }

    /// Basic authentication for the engine endpoint.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    /// Disables TLS certificate validation. Development and testing
    /// only.
    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    /// Validates the configuration and assembles a repository bound to
    /// the record kind `R`.
    pub fn build<R: IndigoRecord>(self) -> RepositoryResult<ElasticRepository<R>> {
        let index_name = require(self.index_name, "indexName")?;
        let host_name = require(self.host_name, "hostName")?;
        let port = require(self.port, "port")?;
        let scheme = require(self.scheme, "scheme")?;
        let version = require(self.version, "version")?;

        if port == 0 {
            return Err(config_error("port", "must be between 1 and 65535"));
        }
        if !matches!(scheme.as_str(), "http" | "https") {
            return Err(config_error(
                "scheme",
                format!("must be http or https, got '{scheme}'"),
            ));
        }
        validate_index_name(&index_name)?;
        if let Some(ref interval) = self.refresh_interval {
            // "-1" is the engine's value for disabling periodic refresh
            if interval != "-1" {
                humantime::parse_duration(interval).map_err(|e| {
                    config_error("refreshInterval", format!("not a valid duration: {e}"))
                })?;
            }
        }
        if self.request_timeout.is_zero() {
            return Err(config_error("requestTimeout", "must be greater than zero"));
        }
        if self.max_result_window == 0 {
            return Err(config_error("maxResultWindow", "must be greater than zero"));
        }

        let version = EngineVersion::parse(&version)?;
        let kind = RecordKind::from_name(R::kind_name())?;

        let config = RepositoryConfig {
            index_name,
            host_name,
            port,
            scheme,
            refresh_interval: self.refresh_interval,
            request_timeout: self.request_timeout,
            shards: self.shards,
            replicas: self.replicas,
            max_result_window: self.max_result_window,
            basic_auth: self.basic_auth,
            insecure_tls: self.insecure_tls,
        };
        let client = build_client(&config)?;

        tracing::debug!(
            "built {} repository for index '{}' against {}://{}:{} (engine v{})",
            kind,
            config.index_name,
            config.scheme,
            config.host_name,
            config.port,
            version,
        );
        Ok(ElasticRepository::new(
            client,
            config,
            VersionProfile::new(version),
            kind,
        ))
    }
}

fn require<T>(value: Option<T>, option: &str) -> RepositoryResult<T> {
    value.ok_or_else(|| config_error(option, "required option is missing"))
}

fn config_error(option: &str, message: impl Into<String>) -> RepositoryError {
    RepositoryError::Config {
        option: option.to_string(),
        message: message.into(),
    }
}

/// Checks the engine's index-naming rules up front so a bad name fails
/// at build time instead of on first use.
fn validate_index_name(name: &str) -> RepositoryResult<()> {
    if name.is_empty() {
        return Err(config_error("indexName", "must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(config_error("indexName", "must not be '.' or '..'"));
    }
    if name.len() > 255 {
        return Err(config_error("indexName", "must be at most 255 bytes"));
    }
    if name.starts_with(['-', '_', '+']) {
        return Err(config_error(
            "indexName",
            "must not start with '-', '_' or '+'",
        ));
    }
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(config_error("indexName", "must be lowercase"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | ',' | '#' | ':'))
    {
        return Err(config_error(
            "indexName",
            format!("contains forbidden character {bad:?}"),
        ));
    }
    Ok(())
}

/// Builds the engine client from validated configuration.
fn build_client(config: &RepositoryConfig) -> RepositoryResult<Elasticsearch> {
    let url = format!(
        "{}://{}:{}",
        config.scheme, config.host_name, config.port
    );
    let parsed: elasticsearch::http::Url = url.parse().map_err(|e| {
        config_error("hostName", format!("invalid endpoint url '{url}': {e}"))
    })?;

    let conn_pool = SingleNodeConnectionPool::new(parsed);
    let mut builder = TransportBuilder::new(conn_pool).timeout(config.request_timeout);

    if config.insecure_tls {
        builder = builder.cert_validation(CertificateValidation::None);
    }
    if let Some((username, password)) = config.basic_auth.clone() {
        builder = builder.auth(Credentials::Basic(username, password));
    }

    let transport = builder.build().map_err(|e| {
        config_error("hostName", format!("failed to build transport: {e}"))
    })?;
    Ok(Elasticsearch::new(transport))
}
