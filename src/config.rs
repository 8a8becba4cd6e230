use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use serde::{Deserialize, Serialize};

use crate::calendar::{parse_time, BusinessHours};
use crate::engine::EngineSettings;

/// Server configuration, read once at startup from `SLOTWISE_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub admin_user: String,
    pub admin_password: String,
    pub client_password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub hours: BusinessHours,
    pub lock_timeout: Duration,
    pub archive_after_days: u32,
    pub sweep_interval: Duration,
    pub services: ServiceCatalog,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults; set but
    /// unparsable keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let defaults = BusinessHours::default();
        let hours = BusinessHours::new(
            time_var(&lookup, "SLOTWISE_OPEN", defaults.start)?,
            time_var(&lookup, "SLOTWISE_CLOSE", defaults.end)?,
            time_var(&lookup, "SLOTWISE_BREAK_START", defaults.break_start)?,
            time_var(&lookup, "SLOTWISE_BREAK_END", defaults.break_end)?,
        )
        .map_err(|e| ConfigError::Invalid {
            key: "SLOTWISE_OPEN/CLOSE/BREAK_*",
            reason: e.to_string(),
        })?;

        let services = match lookup("SLOTWISE_SERVICES") {
            Some(json) => ServiceCatalog::from_json(&json)?,
            None => ServiceCatalog::default(),
        };

        let tls_cert = lookup("SLOTWISE_TLS_CERT");
        let tls_key = lookup("SLOTWISE_TLS_KEY");
        if tls_cert.is_some() != tls_key.is_some() {
            return Err(ConfigError::Tls(
                "both SLOTWISE_TLS_CERT and SLOTWISE_TLS_KEY must be set, or neither".into(),
            ));
        }

        let max_connections: usize = parsed(&lookup, "SLOTWISE_MAX_CONNECTIONS", 256)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "SLOTWISE_MAX_CONNECTIONS",
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            port: parsed(&lookup, "SLOTWISE_PORT", 5433)?,
            bind: text("SLOTWISE_BIND", "0.0.0.0"),
            data_dir: PathBuf::from(text("SLOTWISE_DATA_DIR", "./data")),
            admin_user: text("SLOTWISE_ADMIN_USER", "admin"),
            admin_password: text("SLOTWISE_ADMIN_PASSWORD", "slotwise"),
            client_password: text("SLOTWISE_CLIENT_PASSWORD", "slotwise"),
            max_connections,
            compact_threshold: parsed(&lookup, "SLOTWISE_COMPACT_THRESHOLD", 1000)?,
            metrics_port: optional(&lookup, "SLOTWISE_METRICS_PORT")?,
            tls_cert,
            tls_key,
            hours,
            lock_timeout: Duration::from_millis(parsed(&lookup, "SLOTWISE_LOCK_TIMEOUT_MS", 2000)?),
            archive_after_days: parsed(&lookup, "SLOTWISE_ARCHIVE_AFTER_DAYS", 30)?,
            sweep_interval: Duration::from_secs(parsed::<u64>(&lookup, "SLOTWISE_SWEEP_INTERVAL_SECS", 3600)?.max(1)),
            services,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("appointments.wal")
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            hours: self.hours,
            lock_timeout: self.lock_timeout,
        }
    }

    /// Load the PEM pair into an acceptor. `None` when TLS is not configured.
    pub fn tls_acceptor(&self) -> Result<Option<TlsAcceptor>, ConfigError> {
        let (Some(cert_path), Some(key_path)) = (&self.tls_cert, &self.tls_key) else {
            return Ok(None);
        };
        let tls_err = |what: &str, e: &dyn std::fmt::Display| ConfigError::Tls(format!("{what}: {e}"));

        let cert_file = File::open(cert_path).map_err(|e| tls_err(cert_path.as_str(), &e))?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<Result<_, _>>()
            .map_err(|e| tls_err(cert_path.as_str(), &e))?;

        let key_file = File::open(key_path).map_err(|e| tls_err(key_path.as_str(), &e))?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .map_err(|e| tls_err(key_path.as_str(), &e))?
            .ok_or_else(|| ConfigError::Tls(format!("{key_path}: no private key found")))?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| tls_err("certificate", &e))?;
        config.alpn_protocols = vec![b"postgresql".to_vec()];

        Ok(Some(TlsAcceptor::from(Arc::new(config))))
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(optional(lookup, key)?.unwrap_or(default))
}

fn optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim().parse().map(Some).map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("cannot parse '{raw}'"),
    })
}

fn time_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: chrono::NaiveTime,
) -> Result<chrono::NaiveTime, ConfigError> {
    match lookup(key) {
        Some(raw) => parse_time(&raw).map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

// ── Service catalog ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Informational. Conflicts are per slot regardless of duration.
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: Vec<Service>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        let service = |name: &str, duration_minutes| Service {
            name: name.to_string(),
            duration_minutes,
        };
        Self {
            services: vec![
                service("Haircut", 60),
                service("Coloring", 120),
                service("Manicure", 60),
                service("Massage", 60),
                service("Cosmetology", 90),
            ],
        }
    }
}

impl ServiceCatalog {
    /// Parse `[{"name": "...", "duration_minutes": N}, ...]`.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            key: "SLOTWISE_SERVICES",
            reason,
        };
        let services: Vec<Service> = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        if services.is_empty() {
            return Err(invalid("catalog is empty".into()));
        }
        for (i, s) in services.iter().enumerate() {
            if s.name.trim().chars().count() < crate::limits::MIN_SERVICE_LEN {
                return Err(invalid(format!("service #{i} has no usable name")));
            }
            if s.duration_minutes == 0 {
                return Err(invalid(format!("service '{}' has zero duration", s.name)));
            }
            if services[..i].iter().any(|o| o.name.eq_ignore_ascii_case(&s.name)) {
                return Err(invalid(format!("service '{}' listed twice", s.name)));
            }
        }
        Ok(Self { services })
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn find(&self, name: &str) -> Option<&Service> {
        let name = name.trim();
        self.services.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

// ── Errors ────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Invalid { key: &'static str, reason: String },
    Tls(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, reason } => write!(f, "invalid {key}: {reason}"),
            ConfigError::Tls(msg) => write!(f, "TLS configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.admin_user, "admin");
        assert_eq!(config.max_connections, 256);
        assert_eq!(config.hours, BusinessHours::default());
        assert_eq!(config.lock_timeout, Duration::from_millis(2000));
        assert_eq!(config.archive_after_days, 30);
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.services.services().len(), 5);
        assert_eq!(config.wal_path(), PathBuf::from("./data/appointments.wal"));
        assert!(config.tls_acceptor().unwrap().is_none());
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("SLOTWISE_PORT", "6000"),
            ("SLOTWISE_ADMIN_USER", "owner"),
            ("SLOTWISE_OPEN", "10:00"),
            ("SLOTWISE_CLOSE", "16:00"),
            ("SLOTWISE_BREAK_START", "12:00"),
            ("SLOTWISE_BREAK_END", "12:30"),
            ("SLOTWISE_METRICS_PORT", "9100"),
            ("SLOTWISE_ARCHIVE_AFTER_DAYS", "90"),
        ])
        .unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.admin_user, "owner");
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.archive_after_days, 90);
        let slots = config
            .hours
            .enumerate_slots(chrono::NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(slots.len(), 11);
    }

    #[test]
    fn unparsable_values_are_errors() {
        let err = config_from(&[("SLOTWISE_PORT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("SLOTWISE_PORT"));
        assert!(config_from(&[("SLOTWISE_OPEN", "9am")]).is_err());
        assert!(config_from(&[("SLOTWISE_OPEN", "19:00")]).is_err());
        assert!(config_from(&[("SLOTWISE_MAX_CONNECTIONS", "0")]).is_err());
    }

    #[test]
    fn tls_needs_both_files() {
        let err = config_from(&[("SLOTWISE_TLS_CERT", "cert.pem")]).unwrap_err();
        assert!(matches!(err, ConfigError::Tls(_)));
    }

    #[test]
    fn services_from_json() {
        let catalog = ServiceCatalog::from_json(
            r#"[{"name": "Beard trim", "duration_minutes": 30}, {"name": "Shave", "duration_minutes": 30}]"#,
        )
        .unwrap();
        assert_eq!(catalog.services().len(), 2);
        assert_eq!(catalog.find("beard TRIM").map(|s| s.duration_minutes), Some(30));
        assert!(catalog.find("Haircut").is_none());
    }

    #[test]
    fn bad_service_catalogs() {
        assert!(ServiceCatalog::from_json("not json").is_err());
        assert!(ServiceCatalog::from_json("[]").is_err());
        assert!(ServiceCatalog::from_json(r#"[{"name": "Cut", "duration_minutes": 0}]"#).is_err());
        assert!(ServiceCatalog::from_json(
            r#"[{"name": "Cut", "duration_minutes": 30}, {"name": "cut", "duration_minutes": 60}]"#
        )
        .is_err());
    }

    #[test]
    fn default_catalog_durations() {
        let catalog = ServiceCatalog::default();
        assert_eq!(catalog.find("Coloring").map(|s| s.duration_minutes), Some(120));
        assert_eq!(catalog.find("Cosmetology").map(|s| s.duration_minutes), Some(90));
    }
}
