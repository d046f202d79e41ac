//! Runtime configuration for `parksync`.
//!
//! Loaded once at startup from an optional TOML file. Every section and key
//! is optional; anything missing falls back to the built-in parking tables.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8080
//! max_body_bytes = 10485760
//! max_capture_bytes = 4194304
//!
//! [outbox]
//! path = "outbox.jsonl"
//!
//! [intercept]
//! local_only_param = "localOnly"
//! local_only_header = "x-local-only"
//! exclusions = ["/api/auth", "/api/tickets/imprimir"]
//!
//! [intercept.routes]
//! "/api/vehiculos" = "vehiculos"
//! "/api/cocheras" = "cocheras"
//! "/api/cocheras/asignar" = "cocherasasignaciones"
//!
//! [reconstruct]
//! actor_repair_collections = ["cierresdecajas"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parksync_core::{LocalOnlySignal, ReconstructPolicy, RouteTable};
use serde::{Deserialize, Serialize};

/// Default request body limit: 10 MB.
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default response capture limit: 4 MB.
const DEFAULT_MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;

const DEFAULT_ROUTES: &[(&str, &str)] = &[
    ("/api/abonos", "abonos"),
    ("/api/alertas", "alertas"),
    ("/api/cierresdecaja", "cierresdecajas"),
    ("/api/cierresdecaja/parcial", "cierreparcials"),
    ("/api/clientes", "clientes"),
    ("/api/cocheras", "cocheras"),
    ("/api/cocheras/asignar", "cocherasasignaciones"),
    ("/api/incidentes", "incidentes"),
    ("/api/movimientos", "movimientos"),
    ("/api/movimientoclientes", "movimientoclientes"),
    ("/api/parametros", "parametros"),
    ("/api/precios", "precios"),
    ("/api/promos", "promos"),
    ("/api/tarifas", "tarifas"),
    ("/api/tickets", "tickets"),
    ("/api/tipos-vehiculo", "tipovehiculos"),
    ("/api/turnos", "turnos"),
    ("/api/users", "users"),
    ("/api/vehiculos", "vehiculos"),
];

const DEFAULT_EXCLUSIONS: &[&str] = &[
    "/api/auth",
    "/api/tickets/imprimir",
    "/api/impresoras",
    "/api/sync",
    "/api/camara",
    "/api/fotos/cleanup",
];

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub outbox: OutboxSettings,
    pub intercept: InterceptSettings,
    pub reconstruct: ReconstructSettings,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    /// Largest request body the interceptor will buffer.
    pub max_body_bytes: usize,
    /// Largest response body the interceptor will capture.
    pub max_capture_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }
}

/// `[outbox]` section. Without a path the outbox lives in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    pub path: Option<PathBuf>,
}

/// `[intercept]` section: routing table, exclusions, local-only signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptSettings {
    pub local_only_param: String,
    pub local_only_header: String,
    pub exclusions: Vec<String>,
    /// Path prefix → collection name.
    pub routes: BTreeMap<String, String>,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        let signal = LocalOnlySignal::default();
        Self {
            local_only_param: signal.query_param,
            local_only_header: signal.header,
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
            routes: DEFAULT_ROUTES
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        }
    }
}

/// `[reconstruct]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructSettings {
    /// Overrides the collections that receive actor repair.
    pub actor_repair_collections: Option<Vec<String>>,
    /// Overrides the field holding the acting operator.
    pub actor_field: Option<String>,
}

impl Config {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => read_config(p)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject tables the classifier could not use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (prefix, collection) in &self.intercept.routes {
            if !prefix.starts_with('/') {
                errors.push(format!("route prefix '{prefix}' must start with '/'"));
            }
            if collection.trim().is_empty() {
                errors.push(format!("route '{prefix}' maps to an empty collection"));
            }
        }
        for exclusion in &self.intercept.exclusions {
            if !exclusion.starts_with('/') {
                errors.push(format!("exclusion '{exclusion}' must start with '/'"));
            }
        }
        if self.intercept.local_only_param.is_empty() {
            errors.push("local_only_param must not be empty".to_string());
        }
        if self.intercept.local_only_header.is_empty() {
            errors.push("local_only_header must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }

    /// Build the immutable routing table.
    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(
            self.intercept.routes.clone(),
            self.intercept.exclusions.clone(),
            LocalOnlySignal {
                query_param: self.intercept.local_only_param.clone(),
                header: self.intercept.local_only_header.to_ascii_lowercase(),
            },
        )
    }

    /// Build the reconstruction policy, applying any overrides.
    pub fn reconstruct_policy(&self) -> ReconstructPolicy {
        let mut policy = ReconstructPolicy::default();
        if let Some(collections) = &self.reconstruct.actor_repair_collections {
            policy.actor_repair_collections = collections.iter().cloned().collect();
        }
        if let Some(field) = &self.reconstruct.actor_field {
            policy.actor_field = field.clone();
        }
        policy
    }
}

/// Read and parse a config TOML file from `path`.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parksync_core::Classification;

    #[test]
    fn defaults_cover_parking_collections() {
        let config = Config::load(None).unwrap();
        let table = config.route_table();
        let m = table.classify("/api/cocheras/asignar/1", false);
        assert_eq!(m.route().unwrap().collection, "cocherasasignaciones");
        assert_eq!(
            table.classify("/api/tickets/imprimir", false),
            Classification::Excluded
        );
        assert_eq!(config.server.port, 8080);
        assert!(config.outbox.path.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9090

            [outbox]
            path = "/tmp/outbox.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.intercept.routes.len(), DEFAULT_ROUTES.len());
        assert_eq!(
            config.outbox.path.as_deref(),
            Some(Path::new("/tmp/outbox.jsonl"))
        );
    }

    #[test]
    fn routes_section_replaces_default_table() {
        let config: Config = toml::from_str(
            r#"
            [intercept]
            exclusions = []

            [intercept.routes]
            "/v2/autos" = "vehiculos"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        let table = config.route_table();
        assert_eq!(table.entries().len(), 1);
        assert_eq!(
            table.classify("/api/vehiculos", false),
            Classification::Unmapped
        );
        assert!(table.has_collection("vehiculos"));
    }

    #[test]
    fn invalid_prefix_rejected() {
        let config: Config = toml::from_str(
            r#"
            [intercept.routes]
            "api/vehiculos" = "vehiculos"
            "/api/clientes" = " "
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("must start with '/'"));
        assert!(err.contains("empty collection"));
    }

    #[test]
    fn reconstruct_overrides() {
        let config: Config = toml::from_str(
            r#"
            [reconstruct]
            actor_repair_collections = ["cierresdecajas", "cierreparcials"]
            actor_field = "usuario"
            "#,
        )
        .unwrap();
        let policy = config.reconstruct_policy();
        assert!(policy.actor_repair_collections.contains("cierreparcials"));
        assert_eq!(policy.actor_field, "usuario");
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load(Some(Path::new("/nonexistent/parksync.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
