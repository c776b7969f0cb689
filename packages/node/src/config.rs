//! Node configuration, populated from environment variables.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use oaipmh::validation::validate_admin_email;
use oaipmh::{Datestamp, Granularity};

/// Errors raised while reading configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("OAI_QUERY_PATH is required when a graph or SPARQL endpoint is configured")]
    MissingQueryPath,

    #[error("cannot read {path}: {reason}")]
    EnvFile { path: PathBuf, reason: String },
}

/// Env files read from the working directory, later files overriding earlier.
pub const ENV_FILES: [&str; 2] = ["default.env", "custom.env"];

/// Where records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSource {
    /// The built-in sample records.
    Sample,
    /// An RDF file loaded into an in-process graph.
    GraphFile { graph: PathBuf, queries: PathBuf },
    /// A remote SPARQL 1.1 protocol endpoint.
    SparqlEndpoint { endpoint: String, queries: PathBuf },
}

/// Runtime configuration for an OAI-PMH node.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `OAI_BIND` | `0.0.0.0:8000` | TCP socket address to listen on |
/// | `OAI_BASE_URL` | derived from OAI_BIND | Base URL advertised in Identify and `<request>` |
/// | `OAI_REPOSITORY_NAME` | `Webarchive OAI-PMH Endpoint` | Identify `repositoryName` |
/// | `OAI_DESCRIPTION` | `This is the OAI-PMH endpoint of the Webarchive.` | Identify description |
/// | `OAI_ADMIN_EMAILS` | `admin@example.org` | Comma-separated admin addresses |
/// | `OAI_EARLIEST_DATESTAMP` | `1970-01-01T00:00:00Z` | Identify `earliestDatestamp` |
/// | `OAI_GRANULARITY` | `YYYY-MM-DDThh:mm:ssZ` | Finest datestamp granularity |
/// | `OAI_SPARQL_ENDPOINT` | (absent) | Remote SPARQL endpoint URL |
/// | `OAI_GRAPH_PATH` | (absent) | Local RDF file (used when no endpoint is set) |
/// | `OAI_QUERY_PATH` | (absent) | Directory of query templates; required with either store above |
/// | `OAI_NAMESPACES` | (absent) | Extra `prefix=iri` pairs, comma-separated |
/// | `OAI_BACKEND_TIMEOUT_SECS` | `30` | Deadline for each store call |
/// | `OAI_BACKEND_RETRIES` | `2` | Retries for transient endpoint failures |
///
/// With neither `OAI_SPARQL_ENDPOINT` nor `OAI_GRAPH_PATH` the node serves
/// the built-in sample records.
///
/// Variables may also be set in `default.env` and `custom.env`; the process
/// environment wins over both, and `custom.env` over `default.env`.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Socket address the server binds to.
    pub bind_addr: SocketAddr,

    /// Base URL of the endpoint, e.g. `"https://oai.example.org/"`.
    pub base_url: String,

    pub repository_name: String,
    pub description: String,
    pub admin_emails: Vec<String>,
    pub earliest_datestamp: String,
    pub granularity: Granularity,

    pub source: StoreSource,

    /// Additional namespace bindings for the store's namespace table.
    pub namespaces: Vec<(String, String)>,

    pub backend_timeout: Duration,
    pub backend_retries: u32,
}

impl NodeConfig {
    /// Populate config from environment variables and [`ENV_FILES`],
    /// applying defaults where absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_files(&ENV_FILES)
    }

    /// Like [`from_env`](Self::from_env) with an explicit list of env files.
    /// Missing files are skipped.
    pub fn from_env_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let file_vars = read_env_files(paths)?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file_vars.get(key).cloned()))
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr: SocketAddr = var("OAI_BIND")
            .unwrap_or_else(|| "0.0.0.0:8000".into())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "OAI_BIND",
                reason: e.to_string(),
            })?;

        let base_url = var("OAI_BASE_URL").unwrap_or_else(|| format!("http://{bind_addr}/"));

        let admin_emails: Vec<String> = var("OAI_ADMIN_EMAILS")
            .unwrap_or_else(|| "admin@example.org".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if admin_emails.is_empty() {
            return Err(ConfigError::Invalid {
                var: "OAI_ADMIN_EMAILS",
                reason: "at least one address is required".into(),
            });
        }
        for email in &admin_emails {
            validate_admin_email(email).map_err(|e| ConfigError::Invalid {
                var: "OAI_ADMIN_EMAILS",
                reason: e.to_string(),
            })?;
        }

        let granularity: Granularity = match var("OAI_GRANULARITY") {
            Some(g) => g.parse().map_err(|reason| ConfigError::Invalid {
                var: "OAI_GRANULARITY",
                reason,
            })?,
            None => Granularity::Second,
        };

        let earliest_datestamp =
            var("OAI_EARLIEST_DATESTAMP").unwrap_or_else(|| "1970-01-01T00:00:00Z".into());
        let earliest = Datestamp::parse(&earliest_datestamp).map_err(|e| ConfigError::Invalid {
            var: "OAI_EARLIEST_DATESTAMP",
            reason: e.to_string(),
        })?;
        let earliest_datestamp = earliest.to_wire(granularity);

        let queries = var("OAI_QUERY_PATH").map(PathBuf::from);
        let source = match (var("OAI_SPARQL_ENDPOINT"), var("OAI_GRAPH_PATH")) {
            (Some(endpoint), _) => StoreSource::SparqlEndpoint {
                endpoint,
                queries: queries.ok_or(ConfigError::MissingQueryPath)?,
            },
            (None, Some(graph)) => StoreSource::GraphFile {
                graph: PathBuf::from(graph),
                queries: queries.ok_or(ConfigError::MissingQueryPath)?,
            },
            (None, None) => StoreSource::Sample,
        };

        let namespaces = match var("OAI_NAMESPACES") {
            Some(raw) => parse_namespaces(&raw)?,
            None => Vec::new(),
        };

        let backend_timeout = Duration::from_secs(
            var("OAI_BACKEND_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
        );
        let backend_retries = var("OAI_BACKEND_RETRIES")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2);

        Ok(Self {
            bind_addr,
            base_url,
            repository_name: var("OAI_REPOSITORY_NAME")
                .unwrap_or_else(|| "Webarchive OAI-PMH Endpoint".into()),
            description: var("OAI_DESCRIPTION")
                .unwrap_or_else(|| "This is the OAI-PMH endpoint of the Webarchive.".into()),
            admin_emails,
            earliest_datestamp,
            granularity,
            source,
            namespaces,
            backend_timeout,
            backend_retries,
        })
    }
}

/// `dc=http://purl.org/dc/elements/1.1/,lv=http://purl.org/lobid/lv#`
fn parse_namespaces(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(p, iri)| (p.trim().to_string(), iri.trim().to_string()))
                .ok_or_else(|| ConfigError::Invalid {
                    var: "OAI_NAMESPACES",
                    reason: format!("expected prefix=iri, got {pair:?}"),
                })
        })
        .collect()
}

fn read_env_files<P: AsRef<Path>>(paths: &[P]) -> Result<HashMap<String, String>, ConfigError> {
    let mut vars = HashMap::new();
    for path in paths {
        let path = path.as_ref();
        let env_file_err = |e: dotenvy::Error| ConfigError::EnvFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let entries = match dotenvy::from_path_iter(path) {
            Ok(entries) => entries,
            Err(e) if e.not_found() => continue,
            Err(e) => return Err(env_file_err(e)),
        };
        for entry in entries {
            let (key, value) = entry.map_err(env_file_err)?;
            vars.insert(key, value);
        }
        tracing::debug!(path = %path.display(), "read env file");
    }
    Ok(vars)
}
