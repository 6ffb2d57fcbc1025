use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Postgres,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "memory" | "inmem" => Ok(StorageKind::Memory),
            "postgres" | "pg" => Ok(StorageKind::Postgres),
            other => Err(ConfigError::UnknownStorage(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown STORAGE '{0}' (expected 'memory' or 'postgres')")]
    UnknownStorage(String),
    #[error("{name} must be a number, got '{value}'")]
    NotANumber { name: &'static str, value: String },
    #[error("DATABASE_URL must be set when STORAGE=postgres")]
    MissingDatabaseUrl,
}

/// Process settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub storage: StorageKind,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    /// Extra CORS origin for a separately served frontend.
    pub frontend_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn number<T: FromStr>(
            name: &'static str,
            raw: Option<String>,
            default: T,
        ) -> Result<T, ConfigError> {
            match raw {
                None => Ok(default),
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::NotANumber { name, value: v.clone() }),
            }
        }
        fn flag(raw: Option<String>, default: bool) -> bool {
            raw.map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(default)
        }

        let storage: StorageKind = get("STORAGE").unwrap_or_default().parse()?;
        let database_url = get("DATABASE_URL").filter(|v| !v.is_empty());
        if storage == StorageKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: number("PORT", get("PORT"), 8080)?,
            storage,
            database_url,
            db_max_connections: number("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 5)?,
            run_migrations: flag(get("RUN_MIGRATIONS"), true),
            frontend_url: get("FRONTEND_URL").filter(|v| !v.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_to_memory_on_8080() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.storage, StorageKind::Memory);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bind_addr, "0.0.0.0");
        assert_eq!(cfg.db_max_connections, 5);
        assert!(cfg.run_migrations);
        assert!(cfg.frontend_url.is_none());
    }

    #[test]
    fn postgres_requires_database_url() {
        assert_eq!(load(&[("STORAGE", "postgres")]).unwrap_err(), ConfigError::MissingDatabaseUrl);
        let cfg = load(&[("STORAGE", "Postgres"), ("DATABASE_URL", "postgres://localhost/posts")])
            .unwrap();
        assert_eq!(cfg.storage, StorageKind::Postgres);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/posts"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(load(&[("STORAGE", "redis")]), Err(ConfigError::UnknownStorage(_))));
        assert!(matches!(
            load(&[("PORT", "eighty")]),
            Err(ConfigError::NotANumber { name: "PORT", .. })
        ));
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("PORT", "9000"),
            ("RUN_MIGRATIONS", "false"),
            ("FRONTEND_URL", "http://localhost:5173"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert!(!cfg.run_migrations);
        assert_eq!(cfg.frontend_url.as_deref(), Some("http://localhost:5173"));
    }
}
