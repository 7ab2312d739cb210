//! Loader configuration.
//!
//! Everything the pipeline needs to reach its sinks is collected once at
//! startup (environment variables with defaults, then CLI overrides) and is
//! read-only afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use obograph_obo::{IdentifierNormalizer, PrefixMap, OBO_PURL_BASE};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::dwc::DWC_INDEX;
use crate::retry::RetryPolicy;

pub const DEFAULT_SPARQL_UPDATE_URL: &str = "http://localhost:3030/biodb/update";
pub const DEFAULT_SEARCH_URL: &str = "http://localhost:7700";
pub const DEFAULT_GRAPH_BASE: &str = "http://my-db.org/ontology/";
pub const DEFAULT_INDEX: &str = "ontology";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {message}")]
    Invalid { var: String, message: String },
    #[error("{var}: invalid url `{value}`: {source}")]
    Url {
        var: String,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to read manifest {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    ManifestJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparqlConfig {
    pub update_url: Url,
    pub username: Option<String>,
    pub password: String,
    pub timeout: Duration,
}

impl SparqlConfig {
    /// Server root of the update endpoint, used for readiness probes.
    pub fn server_root(&self) -> Url {
        let mut root = self.update_url.clone();
        root.set_path("/");
        root.set_query(None);
        root
    }
}

impl Default for SparqlConfig {
    fn default() -> Self {
        Self {
            update_url: parse_url_const(DEFAULT_SPARQL_UPDATE_URL),
            username: None,
            password: String::new(),
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub url: Url,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: parse_url_const(DEFAULT_SEARCH_URL),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub sparql: SparqlConfig,
    pub search: SearchConfig,
    pub triple_batch_size: usize,
    pub document_batch_size: usize,
    pub clear_retry: RetryPolicy,
    pub reload_retry: RetryPolicy,
    pub base_namespace: String,
    pub graph_base: String,
    pub prefixes: PrefixMap,
    /// Japanese label file applied to Darwin Core schema documents.
    pub dwc_labels: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let delay = Duration::from_millis(1000);
        Self {
            sparql: SparqlConfig::default(),
            search: SearchConfig::default(),
            triple_batch_size: 500,
            document_batch_size: 2000,
            clear_retry: RetryPolicy::new(3, delay),
            reload_retry: RetryPolicy::new(2, delay),
            base_namespace: OBO_PURL_BASE.to_string(),
            graph_base: DEFAULT_GRAPH_BASE.to_string(),
            prefixes: PrefixMap::default(),
            dwc_labels: None,
        }
    }
}

impl LoaderConfig {
    /// Read `OBOGRAPH_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (unset keys keep defaults).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("OBOGRAPH_SPARQL_UPDATE_URL") {
            config.sparql.update_url = parse_url("OBOGRAPH_SPARQL_UPDATE_URL", &v)?;
        }
        config.sparql.username = get("OBOGRAPH_SPARQL_USER");
        if let Some(v) = lookup("OBOGRAPH_SPARQL_PASSWORD") {
            config.sparql.password = v;
        }
        if let Some(v) = get("OBOGRAPH_SPARQL_TIMEOUT_SECS") {
            config.sparql.timeout = Duration::from_secs(parse_number("OBOGRAPH_SPARQL_TIMEOUT_SECS", &v)?);
        }

        if let Some(v) = get("OBOGRAPH_SEARCH_URL") {
            config.search.url = parse_url("OBOGRAPH_SEARCH_URL", &v)?;
        }
        config.search.api_key = get("OBOGRAPH_SEARCH_API_KEY");
        if let Some(v) = get("OBOGRAPH_SEARCH_TIMEOUT_SECS") {
            config.search.timeout = Duration::from_secs(parse_number("OBOGRAPH_SEARCH_TIMEOUT_SECS", &v)?);
        }

        if let Some(v) = get("OBOGRAPH_TRIPLE_BATCH_SIZE") {
            config.triple_batch_size = parse_number("OBOGRAPH_TRIPLE_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("OBOGRAPH_DOCUMENT_BATCH_SIZE") {
            config.document_batch_size = parse_number("OBOGRAPH_DOCUMENT_BATCH_SIZE", &v)?;
        }

        if let Some(v) = get("OBOGRAPH_RETRY_DELAY_MS") {
            let delay = Duration::from_millis(parse_number("OBOGRAPH_RETRY_DELAY_MS", &v)?);
            config.clear_retry.delay = delay;
            config.reload_retry.delay = delay;
        }
        if let Some(v) = get("OBOGRAPH_CLEAR_ATTEMPTS") {
            config.clear_retry.attempts = parse_number("OBOGRAPH_CLEAR_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("OBOGRAPH_RELOAD_ATTEMPTS") {
            config.reload_retry.attempts = parse_number("OBOGRAPH_RELOAD_ATTEMPTS", &v)?;
        }

        if let Some(v) = get("OBOGRAPH_BASE_NAMESPACE") {
            parse_url("OBOGRAPH_BASE_NAMESPACE", &v)?;
            config.base_namespace = v;
        }
        if let Some(v) = get("OBOGRAPH_GRAPH_BASE") {
            parse_url("OBOGRAPH_GRAPH_BASE", &v)?;
            config.graph_base = v;
        }
        if let Some(v) = get("OBOGRAPH_PREFIX_ALIASES") {
            config.prefixes = parse_prefix_aliases(&v)?;
        }
        if let Some(v) = get("OBOGRAPH_KNOWN_PREFIXES") {
            for prefix in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                config.prefixes = config.prefixes.with_known_prefix(prefix);
            }
        }
        if let Some(v) = get("OBOGRAPH_DWC_LABELS") {
            config.dwc_labels = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, size) in [
            ("OBOGRAPH_TRIPLE_BATCH_SIZE", self.triple_batch_size),
            ("OBOGRAPH_DOCUMENT_BATCH_SIZE", self.document_batch_size),
        ] {
            if size == 0 {
                return Err(invalid(var, "batch size must be at least 1"));
            }
        }
        for (var, policy) in [
            ("OBOGRAPH_CLEAR_ATTEMPTS", self.clear_retry),
            ("OBOGRAPH_RELOAD_ATTEMPTS", self.reload_retry),
        ] {
            if policy.attempts == 0 {
                return Err(invalid(var, "attempt count must be at least 1"));
            }
        }
        Ok(())
    }

    pub fn normalizer(&self) -> IdentifierNormalizer {
        IdentifierNormalizer::new(&self.base_namespace, self.prefixes.clone())
    }

    /// Named graph for an ontology file: `graph_base` + file stem.
    pub fn graph_for(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}{}", self.graph_base, stem)
    }
}

/// `display=canonical` pairs separated by commas, e.g. `ncbi=NCBITaxon`.
fn parse_prefix_aliases(value: &str) -> Result<PrefixMap, ConfigError> {
    let mut map = PrefixMap::empty();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((display, canonical)) = pair.split_once('=') else {
            return Err(invalid(
                "OBOGRAPH_PREFIX_ALIASES",
                &format!("expected display=canonical, got `{pair}`"),
            ));
        };
        let (display, canonical) = (display.trim(), canonical.trim());
        if display.is_empty() || canonical.is_empty() {
            return Err(invalid("OBOGRAPH_PREFIX_ALIASES", &format!("empty prefix in `{pair}`")));
        }
        map = map.with_alias(display, canonical);
    }
    Ok(map)
}

fn parse_url(var: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::Url {
        var: var.to_string(),
        value: value.to_string(),
        source,
    })
}

fn parse_url_const(value: &str) -> Url {
    Url::parse(value).unwrap()
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| invalid(var, &format!("`{value}`: {e}")))
}

fn invalid(var: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        message: message.to_string(),
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// JSON list of ontology files to load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyManifest {
    pub ontologies: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

/// One resolved run: source file plus its destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    pub path: PathBuf,
    pub graph: String,
    pub index: String,
}

impl LoadTarget {
    /// Destinations derived from the file name alone. Darwin Core schemas
    /// (`*.xsd`) go to their own index.
    pub fn for_file(path: impl Into<PathBuf>, config: &LoaderConfig) -> Self {
        let path = path.into();
        let index = if is_schema_path(&path) { DWC_INDEX } else { DEFAULT_INDEX };
        Self {
            graph: config.graph_for(&path),
            index: index.to_string(),
            path,
        }
    }

    pub fn is_schema(&self) -> bool {
        is_schema_path(&self.path)
    }
}

fn is_schema_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xsd"))
}

impl OntologyManifest {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::ManifestJson {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve entries against `base_dir`, filling in default destinations.
    pub fn targets(&self, base_dir: &Path, config: &LoaderConfig) -> Vec<LoadTarget> {
        self.ontologies
            .iter()
            .map(|entry| {
                let path = if entry.file.is_absolute() {
                    entry.file.clone()
                } else {
                    base_dir.join(&entry.file)
                };
                let mut target = LoadTarget::for_file(path, config);
                if let Some(graph) = &entry.graph {
                    target.graph = graph.clone();
                }
                if let Some(index) = &entry.index {
                    target.index = index.clone();
                }
                target
            })
            .collect()
    }
}
